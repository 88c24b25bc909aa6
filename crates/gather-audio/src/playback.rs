//! Audio playback queue.
//!
//! Inbound speech chunks are played strictly in arrival order by a single
//! consumer task. The consumer is spawned by the first `enqueue` after the
//! queue went idle and exits once the queue is empty again.
//!
//! Interruption is modelled with a flush epoch: `flush` clears the pending
//! chunks and bumps the epoch, and the consumer abandons any chunk it popped
//! under an older epoch, including the one currently rendering.

use crate::device::{PlaybackBuffer, SpeechOutput};
use crate::pcm::{decode_pcm16, OUTPUT_SAMPLE_RATE};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, warn};

/// An inbound chunk of synthesized speech.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechChunk {
    /// Base64 PCM16 LE mono samples.
    pub data: String,
    pub sample_rate: u32,
}

impl SpeechChunk {
    /// A chunk at the endpoint's default output rate.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            sample_rate: OUTPUT_SAMPLE_RATE,
        }
    }
}

/// Playback counters since the queue was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub enqueued: u64,
    /// Chunks rendered to completion.
    pub played: u64,
    /// Chunks skipped because they failed to decode or play.
    pub dropped: u64,
    /// Pending chunks discarded by `flush`.
    pub flushed: u64,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<SpeechChunk>,
    consumer_active: bool,
    epoch: u64,
    stats: PlaybackStats,
}

struct QueueShared {
    state: Mutex<QueueState>,
    output: Arc<dyn SpeechOutput>,
    epoch_tx: watch::Sender<u64>,
    active_tx: watch::Sender<bool>,
}

impl QueueShared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// FIFO of pending speech with a single playback consumer.
#[derive(Clone)]
pub struct PlaybackQueue {
    shared: Arc<QueueShared>,
}

impl PlaybackQueue {
    pub fn new(output: Arc<dyn SpeechOutput>) -> Self {
        let (epoch_tx, _) = watch::channel(0);
        let (active_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(QueueShared {
                state: Mutex::new(QueueState::default()),
                output,
                epoch_tx,
                active_tx,
            }),
        }
    }

    /// Appends a chunk and starts the consumer if it is idle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn enqueue(&self, chunk: SpeechChunk) {
        let spawn_consumer = {
            let mut state = self.shared.lock();
            state.pending.push_back(chunk);
            state.stats.enqueued += 1;
            if state.consumer_active {
                false
            } else {
                state.consumer_active = true;
                self.shared.active_tx.send_replace(true);
                true
            }
        };

        if spawn_consumer {
            tokio::spawn(consume(self.shared.clone()));
        }
    }

    /// Discards every pending chunk and stops the chunk currently playing.
    ///
    /// Returns the number of pending chunks discarded.
    pub fn flush(&self) -> usize {
        let mut state = self.shared.lock();
        let discarded = state.pending.len();
        state.pending.clear();
        state.epoch += 1;
        state.stats.flushed += discarded as u64;
        self.shared.epoch_tx.send_replace(state.epoch);
        // Stop under the lock so the consumer cannot start the next chunk
        // before the output has been told to stop.
        self.shared.output.stop();
        debug!(discarded, epoch = state.epoch, "playback flushed");
        discarded
    }

    /// Number of chunks waiting to be played.
    pub fn pending(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Whether the consumer is running.
    pub fn is_playing(&self) -> bool {
        self.shared.lock().consumer_active
    }

    pub fn stats(&self) -> PlaybackStats {
        self.shared.lock().stats
    }

    /// Resolves once the consumer has gone idle.
    pub async fn drained(&self) {
        let mut active = self.shared.active_tx.subscribe();
        let _ = active.wait_for(|playing| !*playing).await;
    }
}

impl std::fmt::Debug for PlaybackQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("PlaybackQueue")
            .field("pending", &state.pending.len())
            .field("consumer_active", &state.consumer_active)
            .field("epoch", &state.epoch)
            .finish()
    }
}

async fn consume(shared: Arc<QueueShared>) {
    let mut epoch_rx = shared.epoch_tx.subscribe();

    loop {
        let (chunk, epoch) = {
            let mut state = shared.lock();
            match state.pending.pop_front() {
                Some(chunk) => (chunk, state.epoch),
                None => {
                    state.consumer_active = false;
                    shared.active_tx.send_replace(false);
                    return;
                }
            }
        };

        let samples = match decode_pcm16(&chunk.data) {
            Ok(samples) => samples,
            Err(e) => {
                warn!(error = %e, "dropping undecodable speech chunk");
                shared.lock().stats.dropped += 1;
                continue;
            }
        };
        let buffer = PlaybackBuffer {
            samples,
            sample_rate: chunk.sample_rate,
        };

        tokio::select! {
            biased;
            _ = epoch_rx.wait_for(|current| *current != epoch) => {
                debug!(epoch, "chunk abandoned by flush");
            }
            result = shared.output.play(buffer) => match result {
                Ok(()) => shared.lock().stats.played += 1,
                Err(e) => {
                    warn!(error = %e, "speech chunk failed to play");
                    shared.lock().stats.dropped += 1;
                }
            },
        }
    }
}
