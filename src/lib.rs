#![deny(clippy::all)]

//! Voice-call audio engine.
//!
//! Captures microphone audio, reduces it to 8kHz mono i16 and queues it for
//! a codec layer to pull; takes decoded 8kHz frames back, runs them through
//! a peak-history AGC and plays them. See [`AudioEngine`].

pub mod audio_config;
pub mod error;

pub mod resampler;
pub mod sample_queue;
pub mod peak_history;
pub mod agc;
pub mod level_meter;

pub mod device;
pub mod cpal_backend;
pub mod engine;

pub use crate::audio_config::{
    AgcConfig, EngineConfig, RampMode, ResamplePolicy, CANONICAL_RATE, FRAME_SAMPLES,
};
pub use crate::cpal_backend::CpalHost;
pub use crate::device::{AudioHost, CaptureHandler, DeviceFormat, Direction, InputDevice, OutputDevice};
pub use crate::engine::{AudioEngine, ReadStatus};
pub use crate::error::EngineError;
pub use crate::level_meter::LevelMeter;
