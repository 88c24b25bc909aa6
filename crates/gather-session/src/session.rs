//! Session lifecycle manager.
//!
//! Owns the capture pipeline, the playback queue and the transport for one
//! call at a time and drives the call status:
//!
//! ```text
//! idle -> connecting -> connected -> ended
//!             \             \
//!              +-> error <---+
//! ```
//!
//! Every session gets a fresh epoch. Background tasks carry the epoch they
//! were spawned under and drop their work once it is no longer current, which
//! is how late tool results and stray transport events from an ended call are
//! discarded.

use crate::call_start::spawn_call_start_integrations;
use crate::error::{SessionError, TransportError};
use crate::history::ToolCallRecord;
use crate::protocol::{ClientMessage, InboundSignal, SessionSetup};
use crate::transport::{Transport, TransportEvent};
use gather_audio::{AudioFrame, CapturePipeline, PlaybackQueue};
use gather_tools::{
    DocumentOrigin, IntegrationCatalog, IntegrationExecutor, ToolCall, ToolDispatcher,
    ToolRegistry, DEFAULT_TOOL_TIMEOUT,
};
use gather_types::{CallEvent, CallStatus, Persona};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Model requested when none is configured.
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-live-001";

/// Capacity of the telemetry broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub model: String,
    /// Upper bound on opening the transport and receiving the setup
    /// acknowledgement.
    pub connect_timeout: Duration,
    pub tool_timeout: Duration,
    /// Calls are ended once they have been connected this long.
    pub max_call_duration: Duration,
    /// Period of the elapsed-time ticker.
    pub tick_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            connect_timeout: Duration::from_secs(15),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            max_call_duration: Duration::from_secs(2 * 60 * 60),
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Spoken-conversation rules appended to every persona's instruction.
pub const VOICE_MODE_GUIDANCE: &str = "\
Voice mode:
- You are speaking with the caller in real time. Be natural, concise and warm.
- Never mention technical terms such as function names, APIs, JSON or URLs.
- Perform actions quietly and tell the caller the outcome in plain words.
- Keep replies under 100 words unless the caller asks for more detail.
- Use contractions and everyday phrasing.

Documents:
- When the caller asks you to write, draft or create a document, essay or report, \
call generate_document with the full text as well-formatted markdown.
- Meet any word count the caller gives.
- Do not read the document aloud or mention the tool. Say briefly that it is ready.
- If generation fails, explain the problem simply and offer to try again.";

/// System instruction for `persona`: its own instructions (or a name and
/// description fallback), then the tool list, then [`VOICE_MODE_GUIDANCE`].
pub fn build_system_instruction(persona: &Persona, registry: &ToolRegistry) -> String {
    let mut instruction = if persona.instructions.trim().is_empty() {
        format!("You are {}, {}.", persona.name, persona.description)
    } else {
        persona.instructions.clone()
    };
    if let Some(block) = registry.instruction_block() {
        instruction.push_str("\n\n");
        instruction.push_str(&block);
    }
    instruction.push_str("\n\n");
    instruction.push_str(VOICE_MODE_GUIDANCE);
    instruction
}

#[derive(Default)]
struct SessionState {
    epoch: u64,
    session_id: Option<Uuid>,
    persona_name: String,
    registry: Arc<ToolRegistry>,
    connected_at: Option<Instant>,
    last_duration: Option<Duration>,
    interrupted: bool,
    /// Fired by `end()` to abandon a connect in progress.
    connect_cancel: Option<oneshot::Sender<()>>,
    /// Calls dispatched and not yet answered.
    in_flight_calls: HashSet<String>,
    /// In-flight calls the endpoint has withdrawn.
    cancelled_calls: HashSet<String>,
    history: Vec<ToolCallRecord>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionState {
    fn clear_calls(&mut self) {
        self.in_flight_calls.clear();
        self.cancelled_calls.clear();
    }
}

struct SessionInner {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    catalog: Arc<dyn IntegrationCatalog>,
    executor: Arc<dyn IntegrationExecutor>,
    capture: Mutex<CapturePipeline>,
    playback: PlaybackQueue,
    /// Serializes `start` and `end`.
    lifecycle: tokio::sync::Mutex<()>,
    state: Mutex<SessionState>,
    status_tx: watch::Sender<CallStatus>,
    events_tx: broadcast::Sender<CallEvent>,
}

/// Drives one voice call at a time. Cheap to clone; clones share the call.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        capture: CapturePipeline,
        playback: PlaybackQueue,
        catalog: Arc<dyn IntegrationCatalog>,
        executor: Arc<dyn IntegrationExecutor>,
    ) -> Self {
        let (status_tx, _) = watch::channel(CallStatus::Idle);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(SessionInner {
                config,
                transport,
                catalog,
                executor,
                capture: Mutex::new(capture),
                playback,
                lifecycle: tokio::sync::Mutex::new(()),
                state: Mutex::new(SessionState::default()),
                status_tx,
                events_tx,
            }),
        }
    }

    /// Starts a call with `persona`, ending any live call first.
    ///
    /// # Errors
    ///
    /// [`SessionError::Device`] when the microphone cannot be acquired and
    /// [`SessionError::Transport`] when the endpoint cannot be reached or does
    /// not acknowledge the setup. Either leaves the status at `error`.
    /// [`SessionError::Cancelled`] when `end()` is called while connecting;
    /// the status is then `ended`.
    pub async fn start(&self, persona: Persona) -> Result<(), SessionError> {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;

        if inner.status().is_live() {
            info!("ending live call before starting a new one");
            inner.shutdown(CallStatus::Ended, None).await;
        }

        let registry = Arc::new(ToolRegistry::build(
            persona.tool_integrations(),
            &*inner.catalog,
        ));
        let instruction = build_system_instruction(&persona, &registry);
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let epoch = {
            let mut state = inner.lock_state();
            state.epoch += 1;
            state.session_id = None;
            state.persona_name = persona.name.clone();
            state.registry = registry.clone();
            state.connected_at = None;
            state.interrupted = false;
            state.connect_cancel = Some(cancel_tx);
            state.clear_calls();
            state.history.clear();
            state.epoch
        };

        info!(
            persona_id = %persona.id,
            voice = %persona.voice,
            tools = registry.len(),
            epoch,
            "starting call"
        );
        inner.set_status(CallStatus::Connecting, None);

        let acquired = inner.lock_capture().initialize();
        if let Err(e) = acquired {
            return Err(inner.fail_start(SessionError::Device(e)).await);
        }

        let setup = SessionSetup::new(
            inner.config.model.clone(),
            persona.voice.clone(),
            instruction,
            &registry,
        );
        let connecting =
            tokio::time::timeout(inner.config.connect_timeout, inner.open_transport(setup));
        let events = tokio::select! {
            biased;
            Ok(()) = &mut cancel_rx => {
                info!(epoch, "call ended while connecting");
                inner
                    .shutdown(CallStatus::Ended, Some("ended while connecting".to_string()))
                    .await;
                return Err(SessionError::Cancelled);
            }
            connected = connecting => match connected {
                Ok(Ok(events)) => events,
                Ok(Err(e)) => return Err(inner.fail_start(SessionError::Transport(e)).await),
                Err(_) => {
                    let e = TransportError::Handshake(format!(
                        "no acknowledgement within {}s",
                        inner.config.connect_timeout.as_secs_f64()
                    ));
                    return Err(inner.fail_start(SessionError::Transport(e)).await);
                }
            },
        };

        let session_id = Uuid::new_v4();
        {
            let mut state = inner.lock_state();
            state.session_id = Some(session_id);
            state.connected_at = Some(Instant::now());
            state.connect_cancel = None;
        }
        inner.set_status(CallStatus::Connected, None);
        info!(%session_id, "call connected");

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let capturing = inner.lock_capture().start_capture(frames_tx);
        if let Err(e) = capturing {
            return Err(inner.fail_start(SessionError::Device(e)).await);
        }

        let tasks = vec![
            tokio::spawn(run_uplink(inner.clone(), epoch, frames_rx)),
            tokio::spawn(run_inbound(inner.clone(), epoch, events)),
            tokio::spawn(run_ticker(inner.clone(), epoch)),
        ];
        inner.lock_state().tasks.extend(tasks);

        let fired = spawn_call_start_integrations(
            &persona,
            session_id,
            inner.executor.clone(),
            inner.config.tool_timeout,
        );
        if fired > 0 {
            info!(%session_id, fired, "call-start integrations fired");
        }

        Ok(())
    }

    /// Sends a user text turn.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] unless the call is connected.
    pub async fn send_text(&self, text: &str) -> Result<(), SessionError> {
        if self.inner.status() != CallStatus::Connected {
            return Err(SessionError::NotConnected);
        }
        self.inner
            .transport
            .send(ClientMessage::text(text))
            .await
            .map_err(SessionError::from)
    }

    /// Ends the call. A no-op unless a call is live.
    ///
    /// A call still connecting is abandoned right away; `start` returns
    /// [`SessionError::Cancelled`].
    pub async fn end(&self) {
        let connecting = self.inner.lock_state().connect_cancel.take();
        if let Some(cancel) = connecting {
            debug!("cancelling connect in progress");
            let _ = cancel.send(());
        }

        let _lifecycle = self.inner.lifecycle.lock().await;
        if !self.inner.status().is_live() {
            debug!(status = %self.inner.status(), "end ignored, no live call");
            return;
        }
        self.inner.shutdown(CallStatus::Ended, None).await;
    }

    pub fn status(&self) -> CallStatus {
        self.inner.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<CallStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CallEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Id of the connected session, if any.
    pub fn session_id(&self) -> Option<Uuid> {
        self.inner.lock_state().session_id
    }

    /// How long the current call has been connected, or how long the last
    /// call lasted once it ended.
    pub fn call_duration(&self) -> Duration {
        self.inner.call_duration()
    }

    /// Tools registered for the current (or last) session.
    pub fn registered_tools(&self) -> Arc<ToolRegistry> {
        self.inner.lock_state().registry.clone()
    }

    /// Tool calls answered in the current (or last) session, in the order
    /// their batches finished. Cleared when the next call starts.
    pub fn call_history(&self) -> Vec<ToolCallRecord> {
        self.inner.lock_state().history.clone()
    }

    pub fn playback(&self) -> &PlaybackQueue {
        &self.inner.playback
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("SessionManager")
            .field("status", &self.inner.status())
            .field("epoch", &state.epoch)
            .field("session_id", &state.session_id)
            .finish()
    }
}

impl SessionInner {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_capture(&self) -> MutexGuard<'_, CapturePipeline> {
        self.capture.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn status(&self) -> CallStatus {
        *self.status_tx.borrow()
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.lock_state().epoch == epoch
    }

    fn emit(&self, event: CallEvent) {
        // No listeners is fine.
        let _ = self.events_tx.send(event);
    }

    fn set_status(&self, status: CallStatus, detail: Option<String>) {
        self.status_tx.send_replace(status);
        match &detail {
            Some(detail) => info!(%status, detail = %detail, "call status changed"),
            None => info!(%status, "call status changed"),
        }
        self.emit(CallEvent::StatusChanged { status, detail });
    }

    fn call_duration(&self) -> Duration {
        let state = self.lock_state();
        match state.connected_at {
            Some(at) => at.elapsed(),
            None => state.last_duration.unwrap_or_default(),
        }
    }

    /// Opens the transport and waits for the setup acknowledgement.
    async fn open_transport(
        &self,
        setup: SessionSetup,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        let mut events = self.transport.open(setup).await?;
        loop {
            match events.recv().await {
                Some(TransportEvent::Message(message)) if message.is_setup_complete() => {
                    return Ok(events)
                }
                Some(TransportEvent::Message(_)) => {
                    debug!("ignoring message received before setup acknowledgement")
                }
                Some(TransportEvent::Closed { reason }) => {
                    return Err(TransportError::Handshake(format!(
                        "closed before setup completed: {}",
                        reason.as_deref().unwrap_or("no reason given")
                    )))
                }
                Some(TransportEvent::Error(e)) => return Err(e),
                None => return Err(TransportError::Closed),
            }
        }
    }

    async fn fail_start(&self, err: SessionError) -> SessionError {
        error!(error = %err, "call failed to start");
        self.shutdown(CallStatus::Error, Some(err.to_string())).await;
        err
    }

    /// Tears the current session down and moves to `final_status`.
    ///
    /// Order matters: the epoch is bumped first so in-flight work is
    /// discarded, capture and playback stop before the transport closes.
    async fn shutdown(&self, final_status: CallStatus, detail: Option<String>) {
        let (tasks, duration, session_id) = {
            let mut state = self.lock_state();
            state.epoch += 1;
            state.interrupted = false;
            state.connect_cancel = None;
            state.clear_calls();
            let duration = state.connected_at.take().map(|at| at.elapsed());
            if duration.is_some() {
                state.last_duration = duration;
            }
            (
                std::mem::take(&mut state.tasks),
                duration,
                state.session_id.take(),
            )
        };

        let frames_total = {
            let mut capture = self.lock_capture();
            capture.teardown();
            capture.frames_emitted()
        };
        let discarded = self.playback.flush();
        for task in &tasks {
            task.abort();
        }
        self.transport.close().await;

        self.set_status(final_status, detail);
        if let Some(duration) = duration {
            info!(
                session_id = ?session_id,
                duration_secs = duration.as_secs(),
                frames_total,
                discarded_chunks = discarded,
                aborted_tasks = tasks.len(),
                "call ended"
            );
            self.emit(CallEvent::CallEnded {
                duration_secs: duration.as_secs(),
            });
        }
    }

    /// Ends the session from one of its own tasks. The work runs on a fresh
    /// task so that aborting the session's tasks cannot cut it short.
    fn end_from_task(self: &Arc<Self>, epoch: u64, status: CallStatus, detail: Option<String>) {
        let inner = self.clone();
        tokio::spawn(async move {
            let _lifecycle = inner.lifecycle.lock().await;
            if !inner.is_current(epoch) || !inner.status().is_live() {
                return;
            }
            inner.shutdown(status, detail).await;
        });
    }

    fn handle_signal(self: &Arc<Self>, epoch: u64, signal: InboundSignal) {
        match signal {
            InboundSignal::SetupComplete => debug!("duplicate setup acknowledgement"),
            InboundSignal::ToolCalls(calls) => self.spawn_tool_batch(epoch, calls),
            InboundSignal::ToolCallsCancelled(ids) => {
                info!(ids = ?ids, "server cancelled tool calls");
                let mut state = self.lock_state();
                for id in ids {
                    if state.in_flight_calls.contains(&id) {
                        state.cancelled_calls.insert(id);
                    } else {
                        debug!(call_id = %id, "cancellation for a call not in flight");
                    }
                }
            }
            InboundSignal::Interrupted => {
                let first = {
                    let mut state = self.lock_state();
                    !std::mem::replace(&mut state.interrupted, true)
                };
                if first {
                    let discarded = self.playback.flush();
                    info!(discarded, "caller interrupted, playback flushed");
                    self.emit(CallEvent::Interrupted {
                        discarded_chunks: discarded,
                    });
                }
            }
            InboundSignal::Audio(chunk) => {
                self.lock_state().interrupted = false;
                self.playback.enqueue(chunk);
            }
            InboundSignal::Text(text) => debug!(text = %text, "model text"),
            InboundSignal::TurnComplete => {
                self.lock_state().interrupted = false;
                self.emit(CallEvent::TurnComplete);
            }
            InboundSignal::GenerationComplete => {
                self.lock_state().interrupted = false;
                debug!("generation complete");
            }
            InboundSignal::GoAway(time_left) => {
                warn!(time_left = ?time_left, "endpoint will disconnect soon");
                self.emit(CallEvent::GoAway { time_left });
            }
        }
    }

    fn spawn_tool_batch(self: &Arc<Self>, epoch: u64, calls: Vec<ToolCall>) {
        for call in &calls {
            self.emit(CallEvent::ToolInvoked {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
            });
        }

        let dispatcher = {
            let mut state = self.lock_state();
            state
                .in_flight_calls
                .extend(calls.iter().map(|c| c.id.clone()));
            let origin = DocumentOrigin {
                session_id: state.session_id.map(|id| id.to_string()),
                contact_name: Some(state.persona_name.clone()).filter(|n| !n.is_empty()),
            };
            ToolDispatcher::new(state.registry.clone(), self.executor.clone())
                .with_timeout(self.config.tool_timeout)
                .with_origin(origin)
        };
        let inner = self.clone();

        let task = tokio::spawn(async move {
            let responses = dispatcher.dispatch_batch(&calls).await;

            // Held through the send so the session cannot be replaced
            // between the epoch check and the transport write.
            let _lifecycle = inner.lifecycle.lock().await;
            let responses: Vec<_> = {
                let mut state = inner.lock_state();
                if state.epoch != epoch {
                    debug!(count = responses.len(), "discarding tool results from ended session");
                    return;
                }
                let mut kept = Vec::with_capacity(responses.len());
                for (call, response) in calls.iter().zip(responses) {
                    state.in_flight_calls.remove(&call.id);
                    let cancelled = state.cancelled_calls.remove(&call.id);
                    state
                        .history
                        .push(ToolCallRecord::new(call, &response, cancelled));
                    if cancelled {
                        debug!(call_id = %call.id, "dropping response to cancelled call");
                    } else {
                        kept.push(response);
                    }
                }
                kept
            };

            for response in &responses {
                inner.emit(CallEvent::ToolCompleted {
                    call_id: response.id.clone(),
                    tool_name: response.name.clone(),
                    success: response.is_success(),
                });
            }
            if responses.is_empty() {
                return;
            }
            if let Err(e) = inner
                .transport
                .send(ClientMessage::tool_responses(responses))
                .await
            {
                warn!(error = %e, "failed to send tool responses");
            }
        });

        let mut state = self.lock_state();
        if state.epoch == epoch {
            state.tasks.retain(|t| !t.is_finished());
            state.tasks.push(task);
        } else {
            task.abort();
        }
    }
}

/// Forwards captured frames to the transport in capture order.
async fn run_uplink(
    inner: Arc<SessionInner>,
    epoch: u64,
    mut frames: mpsc::UnboundedReceiver<AudioFrame>,
) {
    while let Some(frame) = frames.recv().await {
        if !inner.is_current(epoch) {
            return;
        }
        if let Err(e) = inner.transport.send(ClientMessage::audio(frame.data)).await {
            debug!(error = %e, sequence = frame.sequence, "uplink stopped");
            return;
        }
    }
}

async fn run_inbound(
    inner: Arc<SessionInner>,
    epoch: u64,
    mut events: mpsc::Receiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        if !inner.is_current(epoch) {
            return;
        }
        match event {
            TransportEvent::Message(message) => {
                for signal in message.into_signals() {
                    inner.handle_signal(epoch, signal);
                }
            }
            TransportEvent::Closed { reason } => {
                info!(reason = ?reason, "endpoint closed the session");
                inner.end_from_task(epoch, CallStatus::Ended, reason);
                return;
            }
            TransportEvent::Error(e) => {
                error!(error = %e, "transport failed mid-call");
                inner.end_from_task(epoch, CallStatus::Error, Some(e.to_string()));
                return;
            }
        }
    }
    inner.end_from_task(epoch, CallStatus::Ended, None);
}

async fn run_ticker(inner: Arc<SessionInner>, epoch: u64) {
    let mut interval = tokio::time::interval(inner.config.tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        interval.tick().await;
        if !inner.is_current(epoch) {
            return;
        }
        let elapsed = inner.call_duration();
        inner.emit(CallEvent::CallElapsed {
            seconds: elapsed.as_secs(),
        });
        if elapsed >= inner.config.max_call_duration {
            warn!(
                limit_secs = inner.config.max_call_duration.as_secs(),
                "maximum call duration reached"
            );
            inner.end_from_task(
                epoch,
                CallStatus::Ended,
                Some("maximum call duration reached".to_string()),
            );
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gather_tools::BuiltinCatalog;
    use gather_types::IntegrationInstance;

    #[test]
    fn instruction_falls_back_to_name_and_description() {
        let mut persona = Persona::new("p1", "Ava");
        persona.description = "a travel agent".to_string();
        let registry = ToolRegistry::default();
        assert_eq!(
            build_system_instruction(&persona, &registry),
            format!("You are Ava, a travel agent.\n\n{}", VOICE_MODE_GUIDANCE)
        );
    }

    #[test]
    fn instruction_lists_tools_then_voice_guidance() {
        let mut persona = Persona::new("p1", "Ava");
        persona.instructions = "Help book trips.".to_string();
        let registry = ToolRegistry::build(
            &[IntegrationInstance::action("w-1", "webhook-trigger")],
            &BuiltinCatalog,
        );
        let instruction = build_system_instruction(&persona, &registry);
        assert!(instruction.starts_with("Help book trips.\n\nAvailable tools:\n- generate_document: "));
        assert!(instruction.contains("\n- trigger_webhook: "));
        assert!(instruction.ends_with(VOICE_MODE_GUIDANCE));
        assert!(VOICE_MODE_GUIDANCE.contains("generate_document"));
    }

    #[test]
    fn default_config_limits() {
        let config = SessionConfig::default();
        assert_eq!(config.tool_timeout, Duration::from_secs(30));
        assert_eq!(config.max_call_duration, Duration::from_secs(7200));
    }
}
