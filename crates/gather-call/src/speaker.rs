//! Output used when no sound device is compiled in.

use async_trait::async_trait;
use gather_audio::{AudioError, PlaybackBuffer, SpeechOutput};
use tokio::sync::Notify;

/// Discards speech but takes as long as playing it would, so the playback
/// queue paces the same way it does with a real device.
#[derive(Debug, Default)]
pub struct SilentSpeaker {
    stopped: Notify,
}

impl SilentSpeaker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SpeechOutput for SilentSpeaker {
    async fn play(&self, buffer: PlaybackBuffer) -> Result<(), AudioError> {
        tokio::select! {
            _ = tokio::time::sleep(buffer.duration()) => {}
            _ = self.stopped.notified() => {}
        }
        Ok(())
    }

    fn stop(&self) {
        self.stopped.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn play_takes_buffer_duration() {
        let speaker = SilentSpeaker::new();
        let started = tokio::time::Instant::now();
        speaker
            .play(PlaybackBuffer {
                samples: vec![0.0; 24_000],
                sample_rate: 24_000,
            })
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_secs(1));
    }
}
