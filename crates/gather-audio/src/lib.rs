//! Audio plumbing for Gather voice calls.
//!
//! Two halves that never touch each other:
//!
//! - capture: microphone blocks are re-framed to fixed-size PCM16 frames at
//!   16 kHz and handed to the session as base64 strings, in capture order.
//! - playback: base64 PCM16 chunks from the endpoint are decoded and played
//!   one at a time; a flush drops everything pending and cuts the current
//!   chunk short.
//!
//! Hardware sits behind [`MicrophoneSource`] and [`SpeechOutput`]. The
//! `native-audio` feature provides CPAL and Rodio implementations; tests and
//! headless runs use [`PushMicrophone`].

mod capture;
mod device;
mod error;
mod playback;

pub mod pcm;
pub mod resample;

#[cfg(feature = "native-audio")]
pub mod native;

pub use capture::{AudioFrame, CapturePipeline};
pub use device::{
    CaptureConstraints, MicrophoneFeed, MicrophoneSource, MicrophoneStats, PlaybackBuffer,
    PushMicrophone, SpeechOutput,
};
pub use error::AudioError;
pub use pcm::{
    decode_pcm16, encode_pcm16, DEFAULT_FRAME_SIZE, INPUT_MIME_TYPE, INPUT_SAMPLE_RATE,
    OUTPUT_SAMPLE_RATE,
};
pub use playback::{PlaybackQueue, PlaybackStats, SpeechChunk};
