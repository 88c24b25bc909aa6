//! HTTP-backed integration executor.
//!
//! Handles the integrations that are plain outbound HTTP: webhook triggers,
//! the generic API request tool and RDAP domain lookups. Web search and site
//! scraping need provider keys this executor does not hold, so they answer
//! with a configuration notice the model can relay. Anything else is
//! reported as unsupported so a host can layer its own executor in front.

use crate::error::ExecutionError;
use crate::executor::{ExecutionOutput, IntegrationExecutor};
use async_trait::async_trait;
use futures_util::future::join_all;
use gather_types::IntegrationInstance;
use reqwest::{Method, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Per-request timeout used by [`HttpIntegrationExecutor::default`].
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Public RDAP bootstrap service; `{base}{domain}` resolves a domain.
pub const DEFAULT_RDAP_BASE: &str = "https://rdap.org/domain/";

/// TLDs tried when the caller gives no variations.
const DEFAULT_TLDS: [&str; 5] = ["com", "net", "org", "io", "co"];

#[derive(Debug, Clone)]
pub struct HttpIntegrationExecutor {
    client: reqwest::Client,
    rdap_base: String,
}

impl Default for HttpIntegrationExecutor {
    fn default() -> Self {
        Self::new(REQUEST_TIMEOUT)
    }
}

impl HttpIntegrationExecutor {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent("GatherVoice/0.1 (integrations)")
            .build()
            .unwrap_or_default();
        Self {
            client,
            rdap_base: DEFAULT_RDAP_BASE.to_string(),
        }
    }

    /// Points domain lookups at another RDAP service.
    pub fn with_rdap_base(mut self, base: impl Into<String>) -> Self {
        let mut base = base.into();
        if !base.ends_with('/') {
            base.push('/');
        }
        self.rdap_base = base;
        self
    }

    async fn trigger_webhook(
        &self,
        instance: &IntegrationInstance,
        args: &Value,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let url = instance
            .config_str("webhookUrl")
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                ExecutionError::InvalidArguments("webhook URL is not configured".to_string())
            })?;
        let action = required_str(args, "action")?;
        let data = args
            .get("data")
            .filter(|d| d.is_object())
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));

        let payload = json!({
            "action": action,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "data": data,
        });

        info!(instance_id = %instance.id, action, "triggering webhook");
        let response = self.client.post(url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExecutionError::Remote(format!(
                "webhook failed: {}",
                status
            )));
        }
        let body = read_body(response).await?;

        Ok(ExecutionOutput::ok(
            json!({
                "status": status.as_u16(),
                "action": action,
                "response": body,
            }),
            format!("Triggered webhook for '{}'", action),
        ))
    }

    async fn api_request(&self, args: &Value) -> Result<ExecutionOutput, ExecutionError> {
        let url = required_str(args, "url")?;
        let method = parse_method(args.get("method").and_then(Value::as_str))?;

        let mut request = self.client.request(method.clone(), url);
        if let Some(headers) = args.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                match value.as_str() {
                    Some(value) => request = request.header(name.as_str(), value),
                    None => {
                        return Err(ExecutionError::InvalidArguments(format!(
                            "header '{}' must be a string",
                            name
                        )))
                    }
                }
            }
        }
        if method == Method::POST || method == Method::PUT {
            if let Some(body) = args.get("body").and_then(Value::as_str) {
                request = request.body(body.to_string());
            }
        }

        debug!(%method, url, "making API request");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExecutionError::Remote(format!(
                "HTTP request failed: {}",
                status
            )));
        }
        let body = read_body(response).await?;

        Ok(ExecutionOutput::ok(
            json!({ "status": status.as_u16(), "data": body }),
            format!("{} {} returned {}", method, url, status.as_u16()),
        ))
    }

    async fn check_domains(&self, args: &Value) -> Result<ExecutionOutput, ExecutionError> {
        let domain = required_str(args, "domain")?.to_ascii_lowercase();
        let candidates = domain_candidates(&domain, args.get("variations"));

        info!(domain = %domain, candidates = candidates.len(), "checking domain availability");
        let results: Vec<DomainStatus> =
            join_all(candidates.iter().map(|c| self.rdap_lookup(c))).await;

        let available: Vec<&str> = results
            .iter()
            .filter(|r| r.state == DomainState::Available)
            .map(|r| r.domain.as_str())
            .collect();
        let summary = if available.is_empty() {
            format!("None of the {} domains checked are available", results.len())
        } else {
            format!(
                "{} of {} domains available: {}",
                available.len(),
                results.len(),
                available.join(", ")
            )
        };

        Ok(ExecutionOutput::ok(
            json!({
                "domain": domain,
                "results": results.iter().map(DomainStatus::to_json).collect::<Vec<_>>(),
                "totalChecked": results.len(),
            }),
            summary,
        ))
    }

    /// RDAP answers 404 for unregistered names.
    async fn rdap_lookup(&self, domain: &str) -> DomainStatus {
        let url = format!("{}{}", self.rdap_base, domain);
        let state = match self.client.get(&url).send().await {
            Ok(response) if response.status() == StatusCode::NOT_FOUND => DomainState::Available,
            Ok(response) if response.status().is_success() => DomainState::Registered,
            Ok(response) => DomainState::Error(format!("HTTP {}", response.status().as_u16())),
            Err(e) => DomainState::Error(ExecutionError::from(e).to_string()),
        };
        debug!(domain, state = ?state, "rdap lookup finished");
        DomainStatus {
            domain: domain.to_string(),
            state,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DomainState {
    Available,
    Registered,
    Error(String),
}

#[derive(Debug, Clone)]
struct DomainStatus {
    domain: String,
    state: DomainState,
}

impl DomainStatus {
    fn to_json(&self) -> Value {
        match &self.state {
            DomainState::Available => {
                json!({ "domain": self.domain, "available": true, "status": "available" })
            }
            DomainState::Registered => {
                json!({ "domain": self.domain, "available": false, "status": "registered" })
            }
            DomainState::Error(error) => json!({
                "domain": self.domain,
                "available": false,
                "status": "error",
                "error": error,
            }),
        }
    }
}

/// Names to look up for `domain`.
///
/// The input itself comes first when it already has a TLD. Each variation
/// has `{domain}` replaced by the input. Without variations the part before
/// the first dot is tried against the default TLDs.
fn domain_candidates(domain: &str, variations: Option<&Value>) -> Vec<String> {
    let requested: Vec<String> = variations
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|v| v.replace("{domain}", domain).trim().to_ascii_lowercase())
                .filter(|v| !v.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let alternatives: Vec<String> = if requested.is_empty() {
        let base = domain.split('.').next().unwrap_or(domain);
        DEFAULT_TLDS
            .iter()
            .map(|tld| format!("{}.{}", base, tld))
            .collect()
    } else {
        requested
    };

    let own = domain.contains('.').then(|| domain.to_string());
    let mut unique = Vec::with_capacity(alternatives.len() + 1);
    for candidate in own.into_iter().chain(alternatives) {
        if !unique.contains(&candidate) {
            unique.push(candidate);
        }
    }
    unique
}

fn search_not_configured(args: &Value) -> Result<ExecutionOutput, ExecutionError> {
    let query = required_str(args, "query")?;
    Ok(ExecutionOutput::ok(
        json!({
            "query": query,
            "results": [],
            "answer": "Web search functionality requires Tavily API configuration in the backend.",
            "message": "Web search service needs to be configured with Tavily API key",
        }),
        "Web search is not configured yet",
    ))
}

fn scrape_not_configured(args: &Value) -> Result<ExecutionOutput, ExecutionError> {
    let url = required_str(args, "url")?;
    let extract_type = args
        .get("extractType")
        .and_then(Value::as_str)
        .unwrap_or("text");
    Ok(ExecutionOutput::ok(
        json!({
            "url": url,
            "pages": [{
                "url": url,
                "title": "Sample Page",
                "content": "Website scraping needs to be configured with API key.",
                "extractType": extract_type,
            }],
            "message": "Firecrawl service needs to be configured with API key",
        }),
        "Website scraping is not configured yet",
    ))
}

#[async_trait]
impl IntegrationExecutor for HttpIntegrationExecutor {
    async fn execute(
        &self,
        instance: &IntegrationInstance,
        args: Value,
    ) -> Result<ExecutionOutput, ExecutionError> {
        match instance.integration_id.as_str() {
            "webhook-trigger" => self.trigger_webhook(instance, &args).await,
            "api-request-tool" => self.api_request(&args).await,
            "domain-checker-tool" => self.check_domains(&args).await,
            "web-search" => search_not_configured(&args),
            "firecrawl" => scrape_not_configured(&args),
            other => Err(ExecutionError::Unsupported(other.to_string())),
        }
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ExecutionError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ExecutionError::InvalidArguments(format!("'{}' is required", key)))
}

fn parse_method(raw: Option<&str>) -> Result<Method, ExecutionError> {
    match raw.map(|m| m.trim().to_ascii_uppercase()).as_deref() {
        None | Some("") | Some("GET") => Ok(Method::GET),
        Some("POST") => Ok(Method::POST),
        Some("PUT") => Ok(Method::PUT),
        Some("DELETE") => Ok(Method::DELETE),
        Some(other) => Err(ExecutionError::InvalidArguments(format!(
            "unsupported HTTP method: {}",
            other
        ))),
    }
}

/// JSON bodies come back as JSON, anything else as a string.
async fn read_body(response: reqwest::Response) -> Result<Value, ExecutionError> {
    let text = response.text().await?;
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parsing_defaults_to_get() {
        assert_eq!(parse_method(None).unwrap(), Method::GET);
        assert_eq!(parse_method(Some("post")).unwrap(), Method::POST);
        assert_eq!(parse_method(Some(" delete ")).unwrap(), Method::DELETE);
        assert!(matches!(
            parse_method(Some("PATCH")),
            Err(ExecutionError::InvalidArguments(_))
        ));
    }

    #[test]
    fn required_arguments_must_be_non_empty() {
        let args = json!({ "action": "  ", "url": "http://x" });
        assert!(required_str(&args, "action").is_err());
        assert!(required_str(&args, "missing").is_err());
        assert_eq!(required_str(&args, "url").unwrap(), "http://x");
    }

    #[test]
    fn domain_candidates_default_to_common_tlds() {
        assert_eq!(
            domain_candidates("gather.app", None),
            ["gather.app", "gather.com", "gather.net", "gather.org", "gather.io", "gather.co"]
        );
        assert_eq!(domain_candidates("gather.com", None).len(), 5);
        let variations = json!(["{domain}.ai", "get{domain}.com", "{domain}.ai", "  ", 7]);
        assert_eq!(
            domain_candidates("gather", Some(&variations)),
            ["gather.ai", "getgather.com"]
        );
        assert_eq!(domain_candidates("gather", Some(&json!([]))).len(), 5);
    }
}
