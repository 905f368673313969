// Voice Audio Engine
//
// Capture:  device handler -> CaptureResampler -> SampleWriter ~~> SampleQueue -> read()
// Playback: write() -> GainController -> LevelMeter -> OutputDevice
//
// The capture handler runs on the backend's audio thread and only appends;
// everything else runs synchronously on the caller's thread.

use crate::agc::GainController;
use crate::audio_config::{requested_name, EngineConfig, FRAME_SAMPLES};
use crate::cpal_backend::CpalHost;
use crate::device::{encode_pcm, AudioHost, DeviceFormat, Direction, InputDevice, OutputDevice};
use crate::error::EngineError;
use crate::level_meter::LevelMeter;
use crate::resampler::CaptureResampler;
use crate::sample_queue::{sample_queue, SampleQueue};

/// Outcome of a fixed-count `read`
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The buffer was filled, with captured audio or with silence when
    /// there is no capture device
    Ready,
    /// A capture device exists but not enough samples are buffered yet.
    /// Nothing was dequeued; retry later.
    NotReady,
}

/// One engine per active voice session
pub struct AudioEngine<H: AudioHost = CpalHost> {
    host: H,
    config: EngineConfig,
    input: Option<Box<dyn InputDevice>>,
    output: Option<Box<dyn OutputDevice>>,
    resampler: Option<CaptureResampler>,
    queue: SampleQueue,
    gain: GainController,
    agc_enabled: bool,
    meter: LevelMeter,
    capturing: bool,
    playing: bool,
    /// Reused serialization buffer for playback writes
    pcm_bytes: Vec<u8>,
}

impl AudioEngine<CpalHost> {
    /// Engine on the platform's default cpal host
    pub fn with_cpal(config: EngineConfig) -> Result<Self, EngineError> {
        let host = CpalHost::with_playback_ring(config.playback_ring_samples);
        Self::new(host, config)
    }
}

impl<H: AudioHost> AudioEngine<H> {
    pub fn new(host: H, config: EngineConfig) -> Result<Self, EngineError> {
        let mut gain = GainController::new(&config.agc);
        gain.set_volume(checked_volume(config.volume)?);
        let (_, queue) = sample_queue(config.capture_ring_samples);

        Ok(Self {
            host,
            agc_enabled: config.agc.enabled,
            config,
            input: None,
            output: None,
            resampler: None,
            queue,
            gain,
            meter: LevelMeter::new(),
            capturing: false,
            playing: false,
            pcm_bytes: Vec::with_capacity(FRAME_SAMPLES * 2),
        })
    }

    /// Device names for one direction, in host order
    ///
    /// Enumeration failures are logged and give an empty list.
    pub fn discover_devices(&self, direction: Direction) -> Vec<String> {
        match self.host.device_names(direction) {
            Ok(names) => names,
            Err(e) => {
                log::error!("[AudioEngine] Failed to enumerate {:?} devices: {}", direction, e);
                Vec::new()
            }
        }
    }

    /// Open the capture and playback devices and pick the capture resampler.
    ///
    /// `None` or "default" selects the host default. Missing hardware on
    /// either side is logged and leaves that side empty; it is not an error.
    pub fn initialize(
        &mut self,
        input_device: Option<&str>,
        output_device: Option<&str>,
    ) -> Result<(), EngineError> {
        self.stop_capture()?;
        self.stop_playback()?;
        self.input = None;
        self.output = None;
        self.resampler = None;

        let output = self.host.open_output(requested_name(output_device))?;
        match &output {
            Some(out) => log::info!(
                "[AudioEngine] Using playback device {} ({}Hz)",
                out.name(),
                out.format().sample_rate
            ),
            None => log::warn!("[AudioEngine] No audio playback hardware found"),
        }

        let input = self.host.open_input(requested_name(input_device))?;
        let resampler = match &input {
            Some(inp) => {
                let format = inp.format();
                let resampler =
                    CaptureResampler::select(format.sample_rate, self.config.resample_policy)?;
                log::info!(
                    "[AudioEngine] Capture device: {} SR: {} resample factor: {:.4}",
                    inp.name(),
                    format.sample_rate,
                    resampler.ratio()
                );
                Some(resampler)
            }
            None => {
                log::warn!("[AudioEngine] No audio recording hardware found");
                None
            }
        };

        self.output = output;
        self.input = input;
        self.resampler = resampler;
        Ok(())
    }

    /// `initialize` with the device names from the configuration
    pub fn initialize_from_config(&mut self) -> Result<(), EngineError> {
        let input = self.config.input_device.clone();
        let output = self.config.output_device.clone();
        self.initialize(input.as_deref(), output.as_deref())
    }

    /// Clear the queue and subscribe to capture-ready buffers
    pub fn start_capture(&mut self) -> Result<(), EngineError> {
        let input = match self.input.as_mut() {
            Some(input) => input,
            None => {
                log::info!("[AudioEngine] No capture device, start_capture ignored");
                return Ok(());
            }
        };

        if self.capturing {
            input.stop()?;
            self.capturing = false;
        }

        let mut resampler = match &self.resampler {
            Some(r) => r.clone(),
            None => CaptureResampler::select(input.format().sample_rate, self.config.resample_policy)?,
        };

        // Fresh pair: stale samples from a previous session cannot leak in
        let (mut writer, queue) = sample_queue(self.config.capture_ring_samples);
        self.queue = queue;

        input.start(Box::new(move |bytes: &[u8]| {
            resampler.process(bytes, |sample| writer.enqueue(sample));
        }))?;

        self.capturing = true;
        log::info!("[AudioEngine] Capture started");
        Ok(())
    }

    /// Unsubscribe from capture and discard anything still queued
    pub fn stop_capture(&mut self) -> Result<(), EngineError> {
        if self.capturing {
            if let Some(input) = self.input.as_mut() {
                input.stop()?;
            }
            self.capturing = false;

            let dropped = self.queue.dropped();
            if dropped > 0 {
                log::warn!("[AudioEngine] {} capture samples dropped this session", dropped);
            }
            log::info!("[AudioEngine] Capture stopped");
        }
        self.queue.clear();
        Ok(())
    }

    pub fn start_playback(&mut self) -> Result<(), EngineError> {
        if self.playing {
            return Ok(());
        }
        match self.output.as_mut() {
            Some(output) => {
                output.start()?;
                self.playing = true;
                log::info!("[AudioEngine] Playback started");
            }
            None => log::info!("[AudioEngine] No playback device, start_playback ignored"),
        }
        Ok(())
    }

    pub fn stop_playback(&mut self) -> Result<(), EngineError> {
        if !self.playing {
            return Ok(());
        }
        if let Some(output) = self.output.as_mut() {
            output.stop()?;
        }
        self.playing = false;
        log::info!("[AudioEngine] Playback stopped");
        Ok(())
    }

    /// Run AGC (when enabled), volume and clipping over `pcm` in place,
    /// then hand it to the playback device.
    ///
    /// Returns the number of samples the device accepted; 0 when there is
    /// no playback device or playback is not started.
    pub fn write(&mut self, pcm: &mut [i16]) -> Result<usize, EngineError> {
        self.meter.reset();

        if self.agc_enabled {
            self.gain.process(pcm);
        } else {
            self.gain.apply_volume(pcm);
        }

        let accepted = match (self.playing, self.output.as_mut()) {
            (true, Some(output)) => {
                encode_pcm(pcm, &mut self.pcm_bytes);
                let written = output.write(&self.pcm_bytes)? / 2;
                if written < pcm.len() {
                    log::debug!(
                        "[AudioEngine] Playback buffer full, {} samples dropped",
                        pcm.len() - written
                    );
                }
                written
            }
            _ => {
                log::debug!("[AudioEngine] Playback inactive, frame of {} dropped", pcm.len());
                0
            }
        };

        self.meter.observe(pcm);
        Ok(accepted)
    }

    /// Fill all of `pcm` from the queue.
    ///
    /// Without a capture device the buffer is zero-filled and `Ready` is
    /// returned. With one, a short queue gives `NotReady` and dequeues nothing.
    pub fn read(&mut self, pcm: &mut [i16]) -> ReadStatus {
        self.meter.reset();

        if self.queue.read_exact(pcm) {
            self.meter.observe(pcm);
            return ReadStatus::Ready;
        }

        if self.input.is_none() {
            pcm.fill(0);
            return ReadStatus::Ready;
        }

        ReadStatus::NotReady
    }

    /// Drain up to one 160-sample frame (fewer if `pcm` is shorter or the
    /// queue holds less). Never waits; returns the count written.
    pub fn read_frame(&mut self, pcm: &mut [i16]) -> usize {
        self.meter.reset();
        let limit = pcm.len().min(FRAME_SAMPLES);
        let n = self.queue.read_up_to(&mut pcm[..limit]);
        self.meter.observe(&pcm[..n]);
        n
    }

    /// Takes effect on the next written frame.
    /// Values outside [0.0, 1.0] are clamped; non-finite values are rejected.
    pub fn set_volume(&mut self, volume: f32) -> Result<(), EngineError> {
        self.gain.set_volume(checked_volume(volume)?);
        Ok(())
    }

    pub fn volume(&self) -> f32 {
        self.gain.volume()
    }

    pub fn set_agc_enabled(&mut self, enabled: bool) {
        if enabled != self.agc_enabled {
            log::info!("[AudioEngine] AGC {}", if enabled { "enabled" } else { "disabled" });
        }
        self.agc_enabled = enabled;
    }

    pub fn agc_enabled(&self) -> bool {
        self.agc_enabled
    }

    pub fn current_gain(&self) -> f32 {
        self.gain.current_gain()
    }

    /// Handle for UI metering; shares state with the engine
    pub fn level_meter(&self) -> LevelMeter {
        self.meter.clone()
    }

    /// Peak |sample| of the most recent read or write
    pub fn level(&self) -> u16 {
        self.meter.level()
    }

    /// Capture rate / 8000, or 1.0 without a capture device
    pub fn resample_ratio(&self) -> f64 {
        self.resampler.as_ref().map(|r| r.ratio()).unwrap_or(1.0)
    }

    pub fn input_format(&self) -> Option<DeviceFormat> {
        self.input.as_ref().map(|i| i.format())
    }

    pub fn output_format(&self) -> Option<DeviceFormat> {
        self.output.as_ref().map(|o| o.format())
    }

    pub fn has_capture_device(&self) -> bool {
        self.input.is_some()
    }

    pub fn has_playback_device(&self) -> bool {
        self.output.is_some()
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// 8kHz samples waiting to be read
    pub fn queued_samples(&mut self) -> usize {
        self.queue.available()
    }

    /// Capture samples lost to a full transport ring this session
    pub fn dropped_samples(&self) -> u64 {
        self.queue.dropped()
    }
}

impl<H: AudioHost> Drop for AudioEngine<H> {
    fn drop(&mut self) {
        let _ = self.stop_capture();
        let _ = self.stop_playback();
    }
}

fn checked_volume(volume: f32) -> Result<f32, EngineError> {
    if !volume.is_finite() {
        return Err(EngineError::InvalidVolume(volume));
    }
    Ok(volume.clamp(0.0, 1.0))
}
