//! Device seams for capture and playback.
//!
//! The pipeline and queue never talk to hardware directly. A
//! [`MicrophoneSource`] pushes raw float blocks of whatever size the device
//! produces; a [`SpeechOutput`] renders one mono buffer at a time.

use crate::error::AudioError;
use crate::pcm::INPUT_SAMPLE_RATE;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Constraints requested when acquiring the microphone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub channels: u16,
    pub sample_rate: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            channels: 1,
            sample_rate: INPUT_SAMPLE_RATE,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// A microphone that delivers raw mono float samples.
pub trait MicrophoneSource: Send {
    /// Acquires the device. Fails with [`AudioError::Device`] when access is
    /// denied or no device exists.
    fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<(), AudioError>;

    /// Starts delivering sample blocks to `samples` until [`stop`](Self::stop).
    fn start(&mut self, samples: mpsc::UnboundedSender<Vec<f32>>) -> Result<(), AudioError>;

    /// Stops delivery. Must be idempotent.
    fn stop(&mut self);

    /// Releases the device.
    fn release(&mut self);
}

/// A decoded mono buffer ready for the speaker.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PlaybackBuffer {
    /// Playback length of the buffer.
    pub fn duration(&self) -> std::time::Duration {
        if self.sample_rate == 0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// A speaker that renders one buffer at a time.
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Plays `buffer` and resolves once it has finished (or was stopped).
    async fn play(&self, buffer: PlaybackBuffer) -> Result<(), AudioError>;

    /// Stops whatever is currently rendering. Partial truncation is fine.
    fn stop(&self);
}

/// Lifecycle counters of a [`PushMicrophone`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MicrophoneStats {
    pub acquisitions: u32,
    pub starts: u32,
    pub stops: u32,
    pub releases: u32,
}

#[derive(Default)]
struct PushShared {
    unavailable: Option<String>,
    sink: Option<mpsc::UnboundedSender<Vec<f32>>>,
    stats: MicrophoneStats,
}

/// A microphone fed programmatically through a [`MicrophoneFeed`].
///
/// Used for pre-recorded input and headless runs.
pub struct PushMicrophone {
    shared: Arc<Mutex<PushShared>>,
}

/// Producer side of a [`PushMicrophone`].
#[derive(Clone)]
pub struct MicrophoneFeed {
    shared: Arc<Mutex<PushShared>>,
}

impl PushMicrophone {
    /// Creates a microphone and the feed that drives it.
    pub fn new() -> (Self, MicrophoneFeed) {
        let shared = Arc::new(Mutex::new(PushShared::default()));
        (
            Self {
                shared: shared.clone(),
            },
            MicrophoneFeed { shared },
        )
    }

    /// Creates a microphone whose acquisition always fails with `reason`.
    pub fn unavailable(reason: impl Into<String>) -> (Self, MicrophoneFeed) {
        let (mic, feed) = Self::new();
        mic.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .unavailable = Some(reason.into());
        (mic, feed)
    }

    fn with_shared<R>(&self, f: impl FnOnce(&mut PushShared) -> R) -> R {
        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut shared)
    }
}

impl MicrophoneSource for PushMicrophone {
    fn acquire(&mut self, _constraints: &CaptureConstraints) -> Result<(), AudioError> {
        self.with_shared(|shared| {
            if let Some(reason) = &shared.unavailable {
                return Err(AudioError::Device(reason.clone()));
            }
            shared.stats.acquisitions += 1;
            Ok(())
        })
    }

    fn start(&mut self, samples: mpsc::UnboundedSender<Vec<f32>>) -> Result<(), AudioError> {
        self.with_shared(|shared| {
            shared.stats.starts += 1;
            shared.sink = Some(samples);
        });
        Ok(())
    }

    fn stop(&mut self) {
        self.with_shared(|shared| {
            if shared.sink.take().is_some() {
                shared.stats.stops += 1;
            }
        });
    }

    fn release(&mut self) {
        self.with_shared(|shared| {
            shared.sink = None;
            shared.stats.releases += 1;
        });
    }
}

impl MicrophoneFeed {
    /// Pushes a block of samples. Returns `false` when capture is not running.
    pub fn push(&self, samples: Vec<f32>) -> bool {
        let shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        match &shared.sink {
            Some(sink) => sink.send(samples).is_ok(),
            None => false,
        }
    }

    /// Whether the microphone is currently delivering samples.
    pub fn is_live(&self) -> bool {
        self.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sink
            .is_some()
    }

    pub fn stats(&self) -> MicrophoneStats {
        self.shared.lock().unwrap_or_else(|e| e.into_inner()).stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_microphone_fails_acquire() {
        let (mut mic, feed) = PushMicrophone::unavailable("permission denied");
        let err = mic.acquire(&CaptureConstraints::default()).unwrap_err();
        assert_eq!(err, AudioError::Device("permission denied".to_string()));
        assert_eq!(feed.stats().acquisitions, 0);
    }

    #[test]
    fn feed_only_delivers_while_started() {
        let (mut mic, feed) = PushMicrophone::new();
        mic.acquire(&CaptureConstraints::default()).unwrap();
        assert!(!feed.push(vec![0.1]));

        let (tx, mut rx) = mpsc::unbounded_channel();
        mic.start(tx).unwrap();
        assert!(feed.push(vec![0.1, 0.2]));
        assert_eq!(rx.try_recv().unwrap(), vec![0.1, 0.2]);

        mic.stop();
        mic.stop();
        assert!(!feed.push(vec![0.3]));
        assert_eq!(
            feed.stats(),
            MicrophoneStats {
                acquisitions: 1,
                starts: 1,
                stops: 1,
                releases: 0,
            }
        );
    }

    #[test]
    fn buffer_duration_uses_sample_rate() {
        let buffer = PlaybackBuffer {
            samples: vec![0.0; 12_000],
            sample_rate: 24_000,
        };
        assert_eq!(buffer.duration(), std::time::Duration::from_millis(500));
    }
}
