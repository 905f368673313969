// Playback Automatic Gain Control
//
// Peak-history AGC with asymmetric slew:
//   - Instant attenuation: when the target drops below the current gain the
//     gain follows immediately, so loud onsets do not clip.
//   - Slow boost: the gain rises at most 5% per frame, ramped across the
//     frame, so short pauses do not cause pumping.
//   - The target is computed from the loudest of the last 25 frame peaks
//     (~500ms), not from the current frame alone.

use crate::audio_config::{
    AgcConfig, RampMode, AGC_HISTORY_FRAMES, AGC_MAX_GAIN, AGC_MAX_RISE, AGC_TARGET_PEAK,
    CLIP_LIMIT, FRAME_SAMPLES,
};
use crate::peak_history::PeakHistory;

pub struct GainController {
    current_gain: f32,
    history: PeakHistory<AGC_HISTORY_FRAMES>,
    volume: f32,
    ramp: RampMode,
    /// Float working copy of the frame, reused across calls
    scratch: Vec<f32>,
}

impl GainController {
    pub fn new(config: &AgcConfig) -> Self {
        let initial_gain = if config.initial_gain.is_finite() && config.initial_gain > 0.0 {
            config.initial_gain
        } else {
            log::warn!(
                "[AGC] Initial gain {} is not usable, using {}",
                config.initial_gain,
                AgcConfig::default().initial_gain
            );
            AgcConfig::default().initial_gain
        };

        Self {
            current_gain: initial_gain,
            history: PeakHistory::new(),
            volume: 1.0,
            ramp: config.ramp,
            scratch: Vec::with_capacity(FRAME_SAMPLES),
        }
    }

    pub fn current_gain(&self) -> f32 {
        self.current_gain
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Volume is expected in [0.0, 1.0]; callers validate
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    /// Run AGC, volume and clipping over one frame in place
    pub fn process(&mut self, pcm: &mut [i16]) {
        let len = pcm.len();
        if len == 0 {
            return;
        }

        self.scratch.clear();
        self.scratch.extend(pcm.iter().map(|&s| s as f32));

        // Detect max level of this frame, then over the history
        let frame_peak = self.scratch.iter().fold(0.0f32, |max, s| max.max(s.abs()));
        self.history.push(frame_peak);
        let peak = frame_peak.max(self.history.max());

        let target_gain = if peak > 0.0 {
            AGC_TARGET_PEAK / peak
        } else {
            AGC_MAX_GAIN
        };

        // Attenuate instantly; otherwise boost towards the ceiling. A gain
        // already above the ceiling gets a negative delta and ramps down.
        let gain_delta = if target_gain < self.current_gain {
            self.current_gain = target_gain;
            0.0
        } else {
            let target_gain = target_gain.min(AGC_MAX_GAIN);
            (target_gain - self.current_gain).min(AGC_MAX_RISE * self.current_gain)
        };

        let ramp_len = match self.ramp {
            RampMode::Canonical => FRAME_SAMPLES,
            RampMode::FrameLength => len,
        };
        let step = gain_delta / ramp_len as f32;

        // Samples past the ramp hold its final value
        for (i, sample) in self.scratch.iter_mut().enumerate() {
            *sample *= self.current_gain + i.min(ramp_len) as f32 * step;
        }
        self.current_gain += len.min(ramp_len) as f32 * step;

        for (out, &sample) in pcm.iter_mut().zip(self.scratch.iter()) {
            *out = clip(sample * self.volume);
        }
    }

    /// Volume and clipping only, for when AGC is switched off
    pub fn apply_volume(&self, pcm: &mut [i16]) {
        for sample in pcm.iter_mut() {
            *sample = clip(*sample as f32 * self.volume);
        }
    }
}

fn clip(sample: f32) -> i16 {
    sample.clamp(-CLIP_LIMIT, CLIP_LIMIT) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn controller(initial_gain: f32) -> GainController {
        GainController::new(&AgcConfig {
            enabled: true,
            initial_gain,
            ramp: RampMode::Canonical,
        })
    }

    fn sine(amplitude: f32, len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| (amplitude * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 8000.0).sin()) as i16)
            .collect()
    }

    #[test]
    fn test_full_scale_frame_attenuates_instantly() {
        let mut agc = controller(100.0);
        let mut frame = vec![32767i16; 160];
        agc.process(&mut frame);

        let expected_gain = 30000.0 / 32767.0;
        assert!((agc.current_gain() - expected_gain).abs() < 1e-4);
        for &s in &frame {
            assert!((29_990..=30_000).contains(&s), "got {}", s);
        }
    }

    #[test]
    fn test_quiet_frame_attenuates_then_ramps_to_ceiling() {
        let mut agc = controller(100.0);
        let mut frame = vec![400i16; 160];
        agc.process(&mut frame);
        // Target 75 is below 100: instant drop, not capped
        assert_eq!(agc.current_gain(), 75.0);
        assert!(frame.iter().all(|&s| s == 30000));

        // Boost branch caps the target at 50, so the gain ramps down to it
        let mut frame = vec![400i16; 160];
        agc.process(&mut frame);
        assert_eq!(agc.current_gain(), 50.0);
        assert_eq!(frame[0], 30000);
        assert!(frame[159] < frame[0]);
        assert!(frame[159] > 20000);
    }

    #[test]
    fn test_silence_uses_max_gain() {
        let mut agc = controller(100.0);
        let mut frame = vec![0i16; 160];
        agc.process(&mut frame);
        // Target 50 is below 100: instant drop to the ceiling
        assert_eq!(agc.current_gain(), 50.0);
        assert!(frame.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_boost_limited_to_5_percent_per_frame() {
        let mut agc = controller(10.0);
        let mut frame = sine(100.0, 160);
        agc.process(&mut frame);
        // Target is ~300 (capped at 50), so only 5% of 10 is allowed
        assert!((agc.current_gain() - 10.5).abs() < 1e-4);
    }

    #[test]
    fn test_boost_ramps_across_frame() {
        let mut agc = controller(10.0);
        let mut frame = vec![100i16; 160];
        agc.process(&mut frame);
        // First sample at gain 10, last at 10 + 159 * (0.5 / 160)
        assert_eq!(frame[0], 1000);
        assert_eq!(frame[159], (100.0f32 * (10.0 + 159.0 * 0.5 / 160.0)) as i16);
    }

    #[test]
    fn test_loud_history_holds_gain_down() {
        let mut agc = controller(100.0);
        let mut loud = vec![30000i16; 160];
        agc.process(&mut loud);
        let loud_gain = agc.current_gain();

        // 24 quiet frames later the loud peak is still in the history
        for _ in 0..24 {
            let mut quiet = sine(500.0, 160);
            agc.process(&mut quiet);
            assert_eq!(agc.current_gain(), loud_gain);
        }

        // Once it falls out, the gain starts to rise slowly
        let mut quiet = sine(500.0, 160);
        agc.process(&mut quiet);
        assert!(agc.current_gain() > loud_gain);
        assert!(agc.current_gain() <= loud_gain * 1.05 + 1e-4);
    }

    #[test]
    fn test_canonical_ramp_short_frame_under_ramps() {
        let mut agc = controller(10.0);
        let mut frame = vec![100i16; 80];
        agc.process(&mut frame);
        // Only half of the allowed 0.5 boost is applied
        assert!((agc.current_gain() - 10.25).abs() < 1e-4);
    }

    #[test]
    fn test_frame_length_ramp_short_frame() {
        let mut agc = GainController::new(&AgcConfig {
            enabled: true,
            initial_gain: 10.0,
            ramp: RampMode::FrameLength,
        });
        let mut frame = vec![100i16; 80];
        agc.process(&mut frame);
        assert!((agc.current_gain() - 10.5).abs() < 1e-4);
    }

    #[test]
    fn test_long_frame_fully_scaled() {
        let mut agc = controller(2.0);
        let mut frame = vec![1000i16; 320];
        agc.process(&mut frame);
        // Samples past index 160 are still gain-scaled, at the held ramp end
        assert!((2099..=2100).contains(&frame[300]), "got {}", frame[300]);
        assert!((agc.current_gain() - 2.1).abs() < 1e-4);
    }

    #[test]
    fn test_canonical_long_frame_holds_ramp_end() {
        let mut agc = controller(10.0);
        let mut frame = vec![100i16; 320];
        agc.process(&mut frame);
        assert!((agc.current_gain() - 10.5).abs() < 1e-4);
        assert_eq!(frame[200], frame[319]);
    }

    #[test]
    fn test_volume_scales_after_gain() {
        let mut agc = controller(100.0);
        agc.set_volume(0.5);
        let mut frame = vec![32767i16; 160];
        agc.process(&mut frame);
        for &s in &frame {
            assert!((14_990..=15_000).contains(&s), "got {}", s);
        }
    }

    #[test]
    fn test_apply_volume_exact() {
        let mut agc = controller(100.0);
        agc.set_volume(0.5);
        let mut frame = [20000i16, -20000, 1];
        agc.apply_volume(&mut frame);
        assert_eq!(frame, [10000, -10000, 0]);
    }

    #[test]
    fn test_apply_volume_clips() {
        let agc = controller(100.0);
        let mut frame = [i16::MAX, i16::MIN];
        agc.apply_volume(&mut frame);
        assert_eq!(frame, [32760, -32760]);
    }

    #[test]
    fn test_empty_frame_is_noop() {
        let mut agc = controller(100.0);
        agc.process(&mut []);
        assert_eq!(agc.current_gain(), 100.0);
    }

    #[test]
    fn test_unusable_initial_gain_replaced() {
        assert_eq!(controller(0.0).current_gain(), 100.0);
        assert_eq!(controller(f32::NAN).current_gain(), 100.0);
    }

    proptest! {
        #[test]
        fn gain_never_exceeds_ceiling(
            initial in 0.01f32..=50.0,
            frames in proptest::collection::vec(
                proptest::collection::vec(any::<i16>(), 1..400), 1..60),
        ) {
            let mut agc = controller(initial);
            for mut frame in frames {
                agc.process(&mut frame);
                prop_assert!(agc.current_gain() <= AGC_MAX_GAIN + 1e-3,
                    "gain {}", agc.current_gain());
            }
        }

        #[test]
        fn gain_never_boosts_past_ceiling(
            initial in 0.01f32..200.0,
            frame_length_ramp in any::<bool>(),
            frames in proptest::collection::vec(
                proptest::collection::vec(-500i16..500, 1..1000), 1..40),
        ) {
            let mut agc = GainController::new(&AgcConfig {
                enabled: true,
                initial_gain: initial,
                ramp: if frame_length_ramp { RampMode::FrameLength } else { RampMode::Canonical },
            });
            for mut frame in frames {
                let before = agc.current_gain();
                agc.process(&mut frame);
                prop_assert!(agc.current_gain() <= before.max(AGC_MAX_GAIN) + 1e-3,
                    "gain {} -> {}", before, agc.current_gain());
            }
        }

        #[test]
        fn gain_rises_at_most_5_percent(
            amplitudes in proptest::collection::vec(0i16..i16::MAX, 1..80),
        ) {
            let mut agc = controller(100.0);
            for amplitude in amplitudes {
                let before = agc.current_gain();
                let mut frame = vec![amplitude; 160];
                agc.process(&mut frame);
                prop_assert!(agc.current_gain() <= before * 1.05 + 1e-3);
            }
        }

        #[test]
        fn output_is_clipped(
            initial in 0.01f32..100.0,
            volume in 0.0f32..=1.0,
            frame in proptest::collection::vec(any::<i16>(), 1..400),
        ) {
            let mut agc = controller(initial);
            agc.set_volume(volume);
            let mut frame = frame;
            agc.process(&mut frame);
            prop_assert!(frame.iter().all(|&s| (-32760..=32760).contains(&s)));
        }
    }
}
