//! Audio capture pipeline.
//!
//! Re-blocks whatever the microphone delivers into fixed-size frames,
//! converts them to PCM16 and hands base64 frames to the session in capture
//! order. All of this runs on a single spawned task so the device callback
//! never waits on the network.

use crate::device::{CaptureConstraints, MicrophoneSource};
use crate::error::AudioError;
use crate::pcm::{encode_pcm16, DEFAULT_FRAME_SIZE};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A fixed-size outbound frame.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Base64 PCM16 LE mono samples.
    pub data: String,
    /// Position of this frame in the capture stream, starting at 0.
    pub sequence: u64,
    /// When the frame was completed. Debugging only; ordering comes from the
    /// channel.
    pub captured_at: Instant,
}

/// Splits an arbitrary sample stream into frames of exactly `frame_size`.
pub(crate) struct FrameBlocker {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameBlocker {
    pub(crate) fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
        }
    }

    /// Appends `block` and returns every frame it completed.
    pub(crate) fn push(&mut self, block: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(block);
        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_size {
            let rest = self.pending.split_off(self.frame_size);
            frames.push(std::mem::replace(&mut self.pending, rest));
        }
        frames
    }
}

pub struct CapturePipeline {
    source: Box<dyn MicrophoneSource>,
    constraints: CaptureConstraints,
    frame_size: usize,
    acquired: bool,
    pump: Option<JoinHandle<()>>,
    frames_emitted: Arc<AtomicU64>,
}

impl CapturePipeline {
    pub fn new(source: Box<dyn MicrophoneSource>) -> Self {
        Self {
            source,
            constraints: CaptureConstraints::default(),
            frame_size: DEFAULT_FRAME_SIZE,
            acquired: false,
            pump: None,
            frames_emitted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Overrides the number of samples per frame.
    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size.max(1);
        self
    }

    pub fn with_constraints(mut self, constraints: CaptureConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Acquires the microphone. A no-op while the device is already held, so
    /// a quick reconnect does not prompt again.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::Device`] when access is denied or no device exists.
    pub fn initialize(&mut self) -> Result<(), AudioError> {
        if self.acquired {
            return Ok(());
        }
        self.source.acquire(&self.constraints)?;
        self.acquired = true;
        info!(
            sample_rate = self.constraints.sample_rate,
            frame_size = self.frame_size,
            "microphone acquired"
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.acquired
    }

    /// Starts delivering frames on `frames`. Restarts capture if it was
    /// already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_capture(
        &mut self,
        frames: mpsc::UnboundedSender<AudioFrame>,
    ) -> Result<(), AudioError> {
        if !self.acquired {
            return Err(AudioError::Device(
                "microphone has not been initialized".to_string(),
            ));
        }
        self.stop_capture();

        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Vec<f32>>();
        self.source.start(raw_tx)?;

        let mut blocker = FrameBlocker::new(self.frame_size);
        let counter = self.frames_emitted.clone();
        self.pump = Some(tokio::spawn(async move {
            while let Some(block) = raw_rx.recv().await {
                for samples in blocker.push(&block) {
                    let frame = AudioFrame {
                        data: encode_pcm16(&samples),
                        sequence: counter.fetch_add(1, Ordering::Relaxed),
                        captured_at: Instant::now(),
                    };
                    if frames.send(frame).is_err() {
                        debug!("frame receiver dropped, capture pump exiting");
                        return;
                    }
                }
            }
        }));

        info!("capture started");
        Ok(())
    }

    /// Stops frame delivery. Idempotent.
    pub fn stop_capture(&mut self) {
        if let Some(pump) = self.pump.take() {
            self.source.stop();
            pump.abort();
            info!(
                frames = self.frames_emitted.load(Ordering::Relaxed),
                "capture stopped"
            );
        }
    }

    /// Stops capture and releases the microphone.
    pub fn teardown(&mut self) {
        self.stop_capture();
        if self.acquired {
            self.source.release();
            self.acquired = false;
            info!("microphone released");
        }
    }

    /// Total frames emitted over the lifetime of this pipeline.
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted.load(Ordering::Relaxed)
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for CapturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePipeline")
            .field("frame_size", &self.frame_size)
            .field("acquired", &self.acquired)
            .field("capturing", &self.pump.is_some())
            .finish()
    }
}
