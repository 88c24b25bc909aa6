//! Integrations that run once when a call connects.

use gather_tools::IntegrationExecutor;
use gather_types::Persona;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Action name sent to call-start integrations.
pub const CALL_STARTED_ACTION: &str = "call_started";

/// Fires every enabled `run_on_call_start` integration of `persona` on its
/// own task. Results are logged and otherwise ignored; nothing waits on them.
pub(crate) fn spawn_call_start_integrations(
    persona: &Persona,
    session_id: Uuid,
    executor: Arc<dyn IntegrationExecutor>,
    timeout: Duration,
) -> usize {
    let mut fired = 0;
    for instance in persona.call_start_integrations().cloned() {
        let executor = executor.clone();
        let args = json!({
            "action": CALL_STARTED_ACTION,
            "data": {
                "personaId": persona.id,
                "personaName": persona.name,
                "sessionId": session_id.to_string(),
            }
        });
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, executor.execute(&instance, args)).await {
                Ok(Ok(output)) if output.success => {
                    info!(instance_id = %instance.id, "call-start integration completed")
                }
                Ok(Ok(output)) => warn!(
                    instance_id = %instance.id,
                    error = output.error.as_deref().unwrap_or("unknown"),
                    "call-start integration reported failure"
                ),
                Ok(Err(e)) => {
                    warn!(instance_id = %instance.id, error = %e, "call-start integration failed")
                }
                Err(_) => warn!(instance_id = %instance.id, "call-start integration timed out"),
            }
        });
        fired += 1;
    }
    fired
}
