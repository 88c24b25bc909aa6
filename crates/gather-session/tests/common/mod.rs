#![allow(dead_code)]

use async_trait::async_trait;
use gather_audio::{
    AudioError, CapturePipeline, MicrophoneFeed, PlaybackBuffer, PlaybackQueue, PushMicrophone,
    SpeechOutput,
};
use gather_session::{
    ClientMessage, ServerMessage, SessionConfig, SessionManager, SessionSetup, Transport,
    TransportError, TransportEvent,
};
use gather_tools::{BuiltinCatalog, ExecutionError, ExecutionOutput, IntegrationExecutor};
use gather_types::IntegrationInstance;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Acknowledge the setup right away.
    Ack,
    /// Fail to connect.
    Refuse,
    /// Connect but never acknowledge.
    Silent,
}

/// In-memory transport driven by the test.
pub struct ScriptedTransport {
    mode: Mutex<OpenMode>,
    setups: Mutex<Vec<SessionSetup>>,
    sent: Mutex<Vec<ClientMessage>>,
    server: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    closes: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(mode: OpenMode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            setups: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            server: Mutex::new(None),
            closes: AtomicUsize::new(0),
        })
    }

    pub fn setups(&self) -> Vec<SessionSetup> {
        self.setups.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Delivers a raw JSON server message.
    pub async fn push_json(&self, json: &str) {
        let message = ServerMessage::parse(json).unwrap();
        self.push(TransportEvent::Message(message)).await;
    }

    pub async fn push(&self, event: TransportEvent) {
        let server = self.server.lock().unwrap().clone();
        server
            .expect("transport is not open")
            .send(event)
            .await
            .unwrap();
    }

    pub fn tool_responses(&self) -> Vec<Vec<gather_tools::ToolResponse>> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                ClientMessage::ToolResponse(batch) => Some(batch.function_responses),
                _ => None,
            })
            .collect()
    }

    pub fn audio_frames(&self) -> usize {
        self.sent()
            .iter()
            .filter(|m| matches!(m, ClientMessage::RealtimeInput(_)))
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(
        &self,
        setup: SessionSetup,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        self.setups.lock().unwrap().push(setup);
        let mode = *self.mode.lock().unwrap();
        if mode == OpenMode::Refuse {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::channel(64);
        if mode == OpenMode::Ack {
            let ack = ServerMessage::parse(r#"{"setupComplete":{}}"#).unwrap();
            tx.try_send(TransportEvent::Message(ack)).unwrap();
        }
        *self.server.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        if self.server.lock().unwrap().is_none() {
            return Err(TransportError::Closed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn close(&self) {
        if self.server.lock().unwrap().take().is_some() {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Speaker that plays instantly unless gated.
pub struct TestSpeaker {
    pub gate: Semaphore,
    pub started: Mutex<Vec<usize>>,
    pub completed: Mutex<Vec<usize>>,
    pub stops: AtomicUsize,
}

impl TestSpeaker {
    pub fn open() -> Arc<Self> {
        Self::gated(usize::MAX >> 4)
    }

    pub fn gated(permits: usize) -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(permits),
            started: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
        })
    }

    pub fn started(&self) -> Vec<usize> {
        self.started.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<usize> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechOutput for TestSpeaker {
    async fn play(&self, buffer: PlaybackBuffer) -> Result<(), AudioError> {
        let id = buffer.samples.len();
        self.started.lock().unwrap().push(id);
        self.gate
            .acquire()
            .await
            .map_err(|e| AudioError::Stream(e.to_string()))?
            .forget();
        self.completed.lock().unwrap().push(id);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Executor that records calls and waits on a gate before answering.
pub struct TestExecutor {
    pub gate: Semaphore,
    pub calls: Mutex<Vec<(String, Value)>>,
}

impl TestExecutor {
    pub fn open() -> Arc<Self> {
        Self::gated(usize::MAX >> 4)
    }

    pub fn gated(permits: usize) -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(permits),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl IntegrationExecutor for TestExecutor {
    async fn execute(
        &self,
        instance: &IntegrationInstance,
        args: Value,
    ) -> Result<ExecutionOutput, ExecutionError> {
        self.calls
            .lock()
            .unwrap()
            .push((instance.id.clone(), args.clone()));
        self.gate
            .acquire()
            .await
            .map_err(|e| ExecutionError::Network(e.to_string()))?
            .forget();
        Ok(ExecutionOutput::ok(args, format!("ran {}", instance.id)))
    }
}

pub struct Harness {
    pub manager: SessionManager,
    pub transport: Arc<ScriptedTransport>,
    pub feed: MicrophoneFeed,
    pub speaker: Arc<TestSpeaker>,
    pub executor: Arc<TestExecutor>,
}

pub fn harness_with(
    config: SessionConfig,
    transport: Arc<ScriptedTransport>,
    mic: (PushMicrophone, MicrophoneFeed),
    speaker: Arc<TestSpeaker>,
    executor: Arc<TestExecutor>,
) -> Harness {
    let (mic, feed) = mic;
    let capture = CapturePipeline::new(Box::new(mic)).with_frame_size(4);
    let playback = PlaybackQueue::new(speaker.clone());
    let manager = SessionManager::new(
        config,
        transport.clone(),
        capture,
        playback,
        Arc::new(BuiltinCatalog),
        executor.clone(),
    );
    Harness {
        manager,
        transport,
        feed,
        speaker,
        executor,
    }
}

pub fn harness() -> Harness {
    harness_with(
        SessionConfig::default(),
        ScriptedTransport::new(OpenMode::Ack),
        PushMicrophone::new(),
        TestSpeaker::open(),
        TestExecutor::open(),
    )
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Base64 PCM16 chunk with `samples` samples.
pub fn audio_json(samples: usize) -> String {
    let data = gather_audio::encode_pcm16(&vec![0.1; samples]);
    format!(
        r#"{{"serverContent":{{"modelTurn":{{"parts":[{{"inlineData":{{"mimeType":"audio/pcm;rate=24000","data":"{}"}}}}]}}}}}}"#,
        data
    )
}
