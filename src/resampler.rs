// Capture Resampler
// Reduces little-endian i16 device PCM to the canonical 8kHz stream.
//
// No anti-aliasing: content above the new Nyquist limit folds back.
// The strategy is picked once per capture device, never per buffer.

use crate::audio_config::{ResamplePolicy, CANONICAL_RATE};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    /// Device already runs at 8kHz: every sample goes through unchanged
    Passthrough,
    /// Nearest-previous-sample decimation with a fractional step.
    /// Output `k` takes input `floor(k * device_rate / 8000)`.
    Fractional { device_rate: u32 },
    /// Whole-sample stride over the raw bytes.
    ///
    /// When the true ratio is not an integer the stride is rounded, so the
    /// output rate is `device_rate / stride` instead of exactly 8kHz. The
    /// relative drift is `|ratio - stride| / ratio` (e.g. 44.1kHz: ratio
    /// 5.5125, stride 6, ~8.8% slow).
    ByteStride { stride: usize },
}

/// Converts capture buffers at the device rate into 8kHz samples
#[derive(Debug, Clone)]
pub struct CaptureResampler {
    strategy: Strategy,
    ratio: f64,
    /// Decoded samples of the current buffer (fractional strategy only)
    decoded: Vec<i16>,
}

impl CaptureResampler {
    /// Pick the strategy for a capture device running at `device_rate`
    ///
    /// # Arguments
    /// * `device_rate` - Negotiated capture rate in Hz
    /// * `policy` - Strategy to use when the rate is not exactly 8kHz
    pub fn select(device_rate: u32, policy: ResamplePolicy) -> Result<Self, EngineError> {
        if device_rate == 0 {
            return Err(EngineError::InvalidRate(device_rate));
        }

        let ratio = device_rate as f64 / CANONICAL_RATE as f64;
        if device_rate < CANONICAL_RATE {
            log::warn!(
                "[Resampler] Device rate {}Hz is below {}Hz, samples will be repeated",
                device_rate,
                CANONICAL_RATE
            );
        }

        let strategy = if device_rate == CANONICAL_RATE {
            Strategy::Passthrough
        } else {
            match policy {
                ResamplePolicy::Fractional => Strategy::Fractional { device_rate },
                ResamplePolicy::ByteStride => {
                    let stride = (ratio.round() as usize).max(1);
                    let drift = (ratio - stride as f64).abs() / ratio;
                    if drift > f64::EPSILON {
                        log::warn!(
                            "[Resampler] Ratio {:.4} is not integral, byte stride {} drifts {:.2}%",
                            ratio,
                            stride,
                            drift * 100.0
                        );
                    }
                    Strategy::ByteStride { stride }
                }
            }
        };

        log::info!(
            "[Resampler] Created: {}Hz -> {}Hz (ratio: {:.4}, {:?})",
            device_rate,
            CANONICAL_RATE,
            ratio,
            strategy
        );

        Ok(Self {
            strategy,
            ratio,
            decoded: Vec::new(),
        })
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// deviceRate / 8000
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Convert one capture buffer, handing every 8kHz sample to `emit` in order.
    ///
    /// A trailing odd byte is ignored. Each buffer is walked from its own
    /// start; no fractional position carries over between buffers.
    pub fn process<F>(&mut self, bytes: &[u8], mut emit: F)
    where
        F: FnMut(i16),
    {
        if bytes.len() < 2 {
            return;
        }

        match self.strategy {
            Strategy::Passthrough => {
                for pair in bytes.chunks_exact(2) {
                    emit(i16::from_le_bytes([pair[0], pair[1]]));
                }
            }
            Strategy::Fractional { device_rate } => {
                self.decoded.clear();
                self.decoded.extend(
                    bytes
                        .chunks_exact(2)
                        .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
                );

                // Integer positions: a running float sum drifts past `len`
                let len = self.decoded.len() as u64;
                let last = self.decoded.len() - 1;
                let rate = device_rate as u64;
                let canonical = CANONICAL_RATE as u64;
                let mut k = 0u64;
                while k * rate < len * canonical {
                    let idx = ((k * rate / canonical) as usize).min(last);
                    emit(self.decoded[idx]);
                    k += 1;
                }
            }
            Strategy::ByteStride { stride } => {
                let step = 2 * stride;
                let mut i = 0;
                while i + 1 < bytes.len() {
                    emit(i16::from_le_bytes([bytes[i], bytes[i + 1]]));
                    i += step;
                }
            }
        }
    }

    /// Convenience wrapper collecting the output of `process`
    pub fn process_to_vec(&mut self, bytes: &[u8]) -> Vec<i16> {
        let estimated = ((bytes.len() / 2) as f64 / self.ratio) as usize + 1;
        let mut out = Vec::with_capacity(estimated);
        self.process(bytes, |s| out.push(s));
        out
    }
}
