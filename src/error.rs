use thiserror::Error;

/// Errors surfaced by the public engine API.
///
/// Missing hardware and queue underrun are not errors: the first leaves a
/// device slot empty, the second is reported through `ReadStatus`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Audio device error: {0}")]
    Device(#[from] anyhow::Error),
    #[error("Invalid volume: {0}")]
    InvalidVolume(f32),
    #[error("Invalid sample rate: {0}Hz")]
    InvalidRate(u32),
    #[error("Configuration error: {0}")]
    Config(String),
}
