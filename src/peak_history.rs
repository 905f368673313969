/// Fixed-size ring of the most recent per-frame peaks.
///
/// Slots start at zero, so until `N` frames have been pushed the unused
/// slots take part in `max()` as silence.
#[derive(Debug, Clone)]
pub struct PeakHistory<const N: usize> {
    slots: [f32; N],
    next: usize,
}

impl<const N: usize> PeakHistory<N> {
    pub fn new() -> Self {
        Self {
            slots: [0.0; N],
            next: 0,
        }
    }

    /// Overwrite the oldest slot, wrapping after `N` pushes
    pub fn push(&mut self, peak: f32) {
        if N == 0 {
            return;
        }
        self.slots[self.next] = peak;
        self.next = (self.next + 1) % N;
    }

    /// Largest value over all slots
    pub fn max(&self) -> f32 {
        self.slots.iter().copied().fold(0.0, f32::max)
    }
}

impl<const N: usize> Default for PeakHistory<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history_is_silent() {
        let history = PeakHistory::<25>::new();
        assert_eq!(history.max(), 0.0);
    }

    #[test]
    fn test_max_over_contents() {
        let mut history = PeakHistory::<4>::new();
        history.push(10.0);
        history.push(300.0);
        history.push(20.0);
        assert_eq!(history.max(), 300.0);
    }

    #[test]
    fn test_wraps_and_forgets_oldest() {
        let mut history = PeakHistory::<3>::new();
        history.push(900.0);
        history.push(1.0);
        history.push(2.0);
        assert_eq!(history.max(), 900.0);

        // Fourth push overwrites the first slot
        history.push(3.0);
        assert_eq!(history.max(), 3.0);
    }

    #[test]
    fn test_loud_frame_remembered_for_n_frames() {
        let mut history = PeakHistory::<25>::new();
        history.push(32767.0);
        for _ in 0..24 {
            history.push(100.0);
            assert_eq!(history.max(), 32767.0);
        }
        history.push(100.0);
        assert_eq!(history.max(), 100.0);
    }
}
