use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// The microphone or speaker is unavailable or access was denied.
    #[error("audio device error: {0}")]
    Device(String),

    /// A device stream failed after it was opened.
    #[error("audio stream error: {0}")]
    Stream(String),

    /// An inbound speech chunk could not be decoded.
    #[error("playback decode error: {0}")]
    PlaybackDecode(String),
}
