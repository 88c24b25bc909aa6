//! gather-call binary: places one voice call with a persona from the terminal.
//!
//! Usage: `gather-call <persona.json> [config.toml]`. Lines typed on stdin
//! are sent as text turns; `/end`, EOF or Ctrl+C hangs up.

use gather_audio::{CapturePipeline, MicrophoneSource, PlaybackQueue, SpeechOutput};
use gather_call::{load_config, load_persona, Config};
use gather_session::{SessionManager, WebSocketTransport};
use gather_tools::{BuiltinCatalog, HttpIntegrationExecutor};
use gather_types::{CallEvent, CallStatus};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(2)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("GATHER_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn resolve_persona_path() -> Option<String> {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("GATHER_PERSONA_PATH").ok())
        .filter(|value| !value.trim().is_empty())
}

/// Sound devices for the call. Without native audio the microphone is fed
/// nothing and speech is discarded, which leaves a text-only call.
struct Devices {
    microphone: Box<dyn MicrophoneSource>,
    speaker: Arc<dyn SpeechOutput>,
    feed: Option<gather_audio::MicrophoneFeed>,
}

#[cfg(feature = "native-audio")]
fn open_devices() -> Result<Devices, gather_audio::AudioError> {
    let speaker = gather_audio::native::RodioSpeaker::open()?;
    Ok(Devices {
        microphone: Box::new(gather_audio::native::CpalMicrophone::new()),
        speaker: Arc::new(speaker),
        feed: None,
    })
}

#[cfg(not(feature = "native-audio"))]
fn open_devices() -> Result<Devices, gather_audio::AudioError> {
    tracing::warn!("built without native-audio, running a text-only call");
    let (microphone, feed) = gather_audio::PushMicrophone::new();
    Ok(Devices {
        microphone: Box::new(microphone),
        speaker: Arc::new(gather_call::SilentSpeaker::new()),
        feed: Some(feed),
    })
}

fn build_manager(
    config: &Config,
    microphone: Box<dyn MicrophoneSource>,
    speaker: Arc<dyn SpeechOutput>,
) -> SessionManager {
    let capture = CapturePipeline::new(microphone)
        .with_frame_size(config.audio.frame_size)
        .with_constraints(config.capture_constraints());
    let transport = WebSocketTransport::new(config.endpoint_url());
    tracing::info!(
        endpoint = %transport.redacted_url(),
        model = %config.endpoint.model,
        "endpoint configured"
    );

    SessionManager::new(
        config.session_config(),
        Arc::new(transport),
        capture,
        PlaybackQueue::new(speaker),
        Arc::new(BuiltinCatalog),
        Arc::new(
            HttpIntegrationExecutor::new(config.tool_timeout())
                .with_rdap_base(config.tools.rdap_url.as_str()),
        ),
    )
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("gather.toml"));

    let config = load_config(selected_config_path)
        .expect("failed to load configuration; the client cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let persona_path = resolve_persona_path()
        .expect("no persona file given; pass it as the first argument or set GATHER_PERSONA_PATH");
    let persona = load_persona(&persona_path).expect("failed to load persona");

    let Devices {
        microphone,
        speaker,
        feed: _feed,
    } = open_devices().expect("failed to open audio devices");
    let manager = build_manager(&config, microphone, speaker);

    let mut events = manager.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event {
                CallEvent::CallElapsed { .. } => tracing::trace!(?event, "call event"),
                _ => tracing::info!(event_type = event.event_type(), ?event, "call event"),
            }
        }
    });

    if let Err(e) = manager.start(persona).await {
        tracing::error!(error = %e, "call could not be started");
        std::process::exit(1);
    }

    let mut status = manager.subscribe_status();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim() == "/end" => break,
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    if let Err(e) = manager.send_text(line.trim()).await {
                        tracing::warn!(error = %e, "text not sent");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin closed");
                    break;
                }
            },
            changed = status.wait_for(|s| s.is_terminal()) => {
                if let Ok(final_status) = changed.map(|s| *s) {
                    tracing::info!(status = %final_status, "call is over");
                }
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, hanging up");
                break;
            }
        }
    }

    manager.end().await;
    tracing::info!(
        duration_secs = manager.call_duration().as_secs(),
        status = %manager.status(),
        "gather-call shut down"
    );
    if manager.status() == CallStatus::Error {
        std::process::exit(1);
    }
}
