// Audio Configuration
// Canonical voice format shared with the codec layer, plus the
// user-tunable engine settings loaded from TOML.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Canonical sample rate for every queued/encoded sample
pub const CANONICAL_RATE: u32 = 8_000;

/// Canonical channel count (mono)
pub const CANONICAL_CHANNELS: u16 = 1;

/// Frame duration in milliseconds
pub const FRAME_MS: u32 = 20;

/// Samples per frame at 8kHz
/// 8000 * 0.020 = 160 samples
pub const FRAME_SAMPLES: usize = 160;

/// Output peak the AGC steers towards (i16 scale)
pub const AGC_TARGET_PEAK: f32 = 30_000.0;

/// Gain ceiling, also used when the history holds nothing but silence
pub const AGC_MAX_GAIN: f32 = 50.0;

/// Maximum per-frame boost as a fraction of the current gain
pub const AGC_MAX_RISE: f32 = 0.05;

/// Frames of peak history (25 * 20ms = 500ms)
pub const AGC_HISTORY_FRAMES: usize = 25;

/// Clip limit applied after gain and volume.
/// Leaves a little headroom below i16::MAX.
pub const CLIP_LIMIT: f32 = 32_760.0;

/// Transport ring between the capture callback and the queue, in 8kHz samples.
/// 32768 samples = ~4s before the consumer has to drain it.
pub const CAPTURE_RING_SAMPLES: usize = 32_768;

/// Playback ring in 8kHz samples (19200 bytes of i16)
pub const PLAYBACK_RING_SAMPLES: usize = 9_600;

/// How the capture side reduces a device rate to 8kHz when the ratio is not 1
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplePolicy {
    /// Decode the buffer, then walk a floating-point index in steps of the ratio
    #[default]
    Fractional,
    /// Advance the raw byte cursor by a whole number of samples
    ByteStride,
}

/// Denominator used to spread a gain change across a frame.
///
/// Every sample of the frame is gain-scaled, but the ramp only advances for
/// the first `min(len, denominator)` samples; later samples hold the ramp
/// end and the gain moves by at most one clamped delta per frame. For a
/// `Canonical` frame longer than 160 samples this differs from a ramp that
/// keeps stepping to the end of the frame: a 320-sample frame boosting from
/// gain 10 ends at 10.5, not 11.0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RampMode {
    /// Always divide by 160, whatever the frame length (legacy behaviour)
    #[default]
    Canonical,
    /// Divide by the length of the frame being processed
    FrameLength,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgcConfig {
    pub enabled: bool,
    /// Gain before the first frame is seen
    pub initial_gain: f32,
    pub ramp: RampMode,
}

impl Default for AgcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_gain: 100.0,
            ramp: RampMode::default(),
        }
    }
}

/// Engine configuration
///
/// Every field has a default, so an empty TOML document is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capture device name; `None` or "default" picks the host default
    pub input_device: Option<String>,
    /// Playback device name; `None` or "default" picks the host default
    pub output_device: Option<String>,
    /// Output volume multiplier in [0.0, 1.0]
    pub volume: f32,
    pub resample_policy: ResamplePolicy,
    pub capture_ring_samples: usize,
    pub playback_ring_samples: usize,
    pub agc: AgcConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            volume: 1.0,
            resample_policy: ResamplePolicy::default(),
            capture_ring_samples: CAPTURE_RING_SAMPLES,
            playback_ring_samples: PLAYBACK_RING_SAMPLES,
            agc: AgcConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, EngineError> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))
    }
}

/// Treats "default" and the empty string the same as no name at all
pub(crate) fn requested_name(name: Option<&str>) -> Option<&str> {
    match name {
        None | Some("") | Some("default") => None,
        Some(n) => Some(n),
    }
}
