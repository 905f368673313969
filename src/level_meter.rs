use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

/// Peak magnitude of the most recent `read`/`write` call.
///
/// Cloning gives another handle onto the same level, so a UI thread can
/// poll it while the audio thread updates it. Purely observational.
#[derive(Debug, Clone, Default)]
pub struct LevelMeter {
    level: Arc<AtomicU16>,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.level.store(0, Ordering::Relaxed);
    }

    /// Raise the level to the largest |sample| in `samples`
    pub fn observe(&self, samples: &[i16]) {
        let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
        self.level.fetch_max(peak, Ordering::Relaxed);
    }

    pub fn level(&self) -> u16 {
        self.level.load(Ordering::Relaxed)
    }
}
