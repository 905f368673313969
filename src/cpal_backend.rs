// cpal Device Backend - Lock-Free Real-Time Compliant
//
// Architecture:
// 1. Capture callback: reduces to mono i16, serializes to LE bytes in a
//    reused buffer and hands them to the registered handler. Nothing else.
// 2. Playback callback: ONLY pops from a lock-free SPSC ring; silence on underrun
// 3. Format negotiation asks for 8kHz mono i16 and falls back to the
//    device's preferred config when no supported range contains 8kHz

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig, SupportedStreamConfig,
    SupportedStreamConfigRange,
};
use ringbuf::{traits::{Consumer, Producer, Split}, HeapCons, HeapProd, HeapRb};

use crate::audio_config::{CANONICAL_CHANNELS, CANONICAL_RATE, PLAYBACK_RING_SAMPLES};
use crate::device::{AudioHost, CaptureHandler, DeviceFormat, Direction, InputDevice, OutputDevice};

/// Sample formats the stream builders know how to convert
const HANDLED_FORMATS: [SampleFormat; 3] = [SampleFormat::I16, SampleFormat::F32, SampleFormat::I32];

/// Audio host backed by the platform default cpal host
pub struct CpalHost {
    host: cpal::Host,
    playback_ring_samples: usize,
}

impl CpalHost {
    pub fn new() -> Self {
        Self::with_playback_ring(PLAYBACK_RING_SAMPLES)
    }

    /// `playback_ring_samples` bounds how much 8kHz audio can wait for the device
    pub fn with_playback_ring(playback_ring_samples: usize) -> Self {
        let host = cpal::default_host();
        log::info!("[CpalHost] Using audio host {:?}", host.id());
        Self {
            host,
            playback_ring_samples: playback_ring_samples.max(1),
        }
    }
}

impl Default for CpalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioHost for CpalHost {
    fn device_names(&self, direction: Direction) -> Result<Vec<String>> {
        let devices: Vec<cpal::Device> = match direction {
            Direction::Capture => self.host.input_devices()?.collect(),
            Direction::Playback => self.host.output_devices()?.collect(),
        };
        Ok(devices.iter().filter_map(|d| d.name().ok()).collect())
    }

    fn open_input(&self, name: Option<&str>) -> Result<Option<Box<dyn InputDevice>>> {
        let devices: Vec<cpal::Device> = self.host.input_devices()?.collect();
        match pick_device(devices, name, self.host.default_input_device(), "Capture") {
            Some(device) => {
                let input: Box<dyn InputDevice> = Box::new(CpalInput::open(device)?);
                Ok(Some(input))
            }
            None => Ok(None),
        }
    }

    fn open_output(&self, name: Option<&str>) -> Result<Option<Box<dyn OutputDevice>>> {
        let devices: Vec<cpal::Device> = self.host.output_devices()?.collect();
        match pick_device(devices, name, self.host.default_output_device(), "Playback") {
            Some(device) => {
                let output: Box<dyn OutputDevice> =
                    Box::new(CpalOutput::open(device, self.playback_ring_samples)?);
                Ok(Some(output))
            }
            None => Ok(None),
        }
    }
}

/// Named device if present, otherwise the default, otherwise the first one
fn pick_device(
    devices: Vec<cpal::Device>,
    name: Option<&str>,
    default: Option<cpal::Device>,
    side: &str,
) -> Option<cpal::Device> {
    if devices.is_empty() {
        return None;
    }

    if let Some(wanted) = name {
        let found = devices
            .iter()
            .position(|d| d.name().map(|n| n == wanted).unwrap_or(false));
        if let Some(index) = found {
            return devices.into_iter().nth(index);
        }
        log::warn!("[{}] Device '{}' not found, using default", side, wanted);
    }

    default.or_else(|| devices.into_iter().next())
}

fn format_rank(format: SampleFormat) -> u8 {
    match format {
        SampleFormat::I16 => 0,
        SampleFormat::F32 => 1,
        _ => 2,
    }
}

/// Pick the config closest to 8kHz mono i16.
///
/// Any range containing 8kHz wins, preferring mono and then i16. Without
/// one the device's preferred config is used as the nearest format.
pub(crate) fn negotiate(
    ranges: &[SupportedStreamConfigRange],
    preferred: SupportedStreamConfig,
    side: &str,
) -> SupportedStreamConfig {
    let canonical = cpal::SampleRate(CANONICAL_RATE);

    let best = ranges
        .iter()
        .filter(|r| r.min_sample_rate() <= canonical && r.max_sample_rate() >= canonical)
        .filter(|r| HANDLED_FORMATS.contains(&r.sample_format()))
        .min_by_key(|r| (r.channels() != CANONICAL_CHANNELS, format_rank(r.sample_format())));

    match best {
        Some(range) => range.clone().with_sample_rate(canonical),
        None => {
            log::warn!(
                "[{}] Raw audio format not supported by backend, using nearest format: {}Hz, {}ch, {:?}",
                side,
                preferred.sample_rate().0,
                preferred.channels(),
                preferred.sample_format()
            );
            preferred
        }
    }
}

fn device_format(config: &SupportedStreamConfig) -> DeviceFormat {
    DeviceFormat {
        sample_rate: config.sample_rate().0,
        channels: config.channels(),
    }
}

// ============================================================================
// CAPTURE
// ============================================================================

pub struct CpalInput {
    device: cpal::Device,
    name: String,
    config: SupportedStreamConfig,
    stream: Option<Stream>,
}

impl CpalInput {
    fn open(device: cpal::Device) -> Result<Self> {
        let name = device.name()?;
        let preferred = device
            .default_input_config()
            .map_err(|e| anyhow!("Failed to get config: {}", e))?;
        let ranges: Vec<SupportedStreamConfigRange> = device
            .supported_input_configs()
            .map(|configs| configs.collect())
            .unwrap_or_default();
        let config = negotiate(&ranges, preferred, "Capture");

        log::info!(
            "[Capture] Device: {}, Rate: {}Hz, Channels: {}, Format: {:?}",
            name,
            config.sample_rate().0,
            config.channels(),
            config.sample_format()
        );

        Ok(Self {
            device,
            name,
            config,
            stream: None,
        })
    }
}

impl InputDevice for CpalInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> DeviceFormat {
        device_format(&self.config)
    }

    fn start(&mut self, handler: CaptureHandler) -> Result<()> {
        // Replacing the stream drops the previous handler
        self.stream = None;

        let stream_config: StreamConfig = self.config.config();
        let channels = self.config.channels() as usize;
        let stream = match self.config.sample_format() {
            SampleFormat::I16 => {
                build_capture_stream::<i16>(&self.device, &stream_config, channels, handler)?
            }
            SampleFormat::F32 => {
                build_capture_stream::<f32>(&self.device, &stream_config, channels, handler)?
            }
            SampleFormat::I32 => {
                build_capture_stream::<i32>(&self.device, &stream_config, channels, handler)?
            }
            format => {
                return Err(anyhow!("Unsupported sample format: {:?}", format));
            }
        };

        stream
            .play()
            .map_err(|e| anyhow!("Failed to start stream: {}", e))?;
        self.stream = Some(stream);
        log::info!("[Capture] Stream started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.stream.take().is_some() {
            log::info!("[Capture] Stream stopped");
        }
        Ok(())
    }
}

/// Build input stream whose callback only converts and hands off
fn build_capture_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    channels: usize,
    mut handler: CaptureHandler,
) -> Result<Stream>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let channels = channels.max(1);
    let mut pcm_bytes: Vec<u8> = Vec::with_capacity(8192);

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            pcm_bytes.clear();
            // Take first channel only (interleaved)
            for frame in data.chunks(channels) {
                let sample = i16::from_sample(frame[0]);
                pcm_bytes.extend_from_slice(&sample.to_le_bytes());
            }
            handler(pcm_bytes.as_slice());
        },
        |err| log::error!("[Capture] Stream error: {}", err),
        None,
    )?;

    Ok(stream)
}

// ============================================================================
// PLAYBACK
// ============================================================================

pub struct CpalOutput {
    device: cpal::Device,
    name: String,
    config: SupportedStreamConfig,
    ring_samples: usize,
    producer: Option<HeapProd<i16>>,
    stream: Option<Stream>,
}

impl CpalOutput {
    fn open(device: cpal::Device, ring_samples: usize) -> Result<Self> {
        let name = device.name()?;
        let preferred = device
            .default_output_config()
            .map_err(|e| anyhow!("Failed to get config: {}", e))?;
        let ranges: Vec<SupportedStreamConfigRange> = device
            .supported_output_configs()
            .map(|configs| configs.collect())
            .unwrap_or_default();
        let config = negotiate(&ranges, preferred, "Playback");

        log::info!(
            "[Playback] Device: {}, Rate: {}Hz, Channels: {}, Format: {:?}",
            name,
            config.sample_rate().0,
            config.channels(),
            config.sample_format()
        );

        Ok(Self {
            device,
            name,
            config,
            ring_samples,
            producer: None,
            stream: None,
        })
    }
}

impl OutputDevice for CpalOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> DeviceFormat {
        device_format(&self.config)
    }

    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let rb = HeapRb::<i16>::new(self.ring_samples);
        let (producer, consumer) = rb.split();

        let stream_config: StreamConfig = self.config.config();
        let channels = self.config.channels() as usize;
        let stream = match self.config.sample_format() {
            SampleFormat::I16 => {
                build_playback_stream::<i16>(&self.device, &stream_config, channels, consumer)?
            }
            SampleFormat::F32 => {
                build_playback_stream::<f32>(&self.device, &stream_config, channels, consumer)?
            }
            SampleFormat::I32 => {
                build_playback_stream::<i32>(&self.device, &stream_config, channels, consumer)?
            }
            format => {
                return Err(anyhow!("Unsupported sample format: {:?}", format));
            }
        };

        stream
            .play()
            .map_err(|e| anyhow!("Failed to start stream: {}", e))?;
        self.producer = Some(producer);
        self.stream = Some(stream);
        log::info!("[Playback] Stream started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.producer = None;
        if self.stream.take().is_some() {
            log::info!("[Playback] Stream stopped");
        }
        Ok(())
    }

    fn write(&mut self, pcm_bytes: &[u8]) -> Result<usize> {
        let producer = match self.producer.as_mut() {
            Some(p) => p,
            None => return Ok(0),
        };

        let mut accepted = 0;
        for pair in pcm_bytes.chunks_exact(2) {
            if producer.try_push(i16::from_le_bytes([pair[0], pair[1]])).is_err() {
                break;
            }
            accepted += 2;
        }
        Ok(accepted)
    }
}

/// Build output stream that holds each 8kHz sample for as many device
/// frames as the rate ratio asks for
fn build_playback_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    channels: usize,
    mut consumer: HeapCons<i16>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<i16>,
{
    let channels = channels.max(1);
    let step = CANONICAL_RATE as f64 / config.sample_rate.0.max(1) as f64;
    let mut phase = 1.0f64;
    let mut current: i16 = 0;

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            for frame in data.chunks_mut(channels) {
                while phase >= 1.0 {
                    phase -= 1.0;
                    current = consumer.try_pop().unwrap_or(0);
                }
                let value = T::from_sample(current);
                for slot in frame.iter_mut() {
                    *slot = value;
                }
                phase += step;
            }
        },
        |err| log::error!("[Playback] Stream error: {}", err),
        None,
    )?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{SampleRate, SupportedBufferSize};

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    fn preferred() -> SupportedStreamConfig {
        SupportedStreamConfig::new(2, SampleRate(48000), SupportedBufferSize::Unknown, SampleFormat::F32)
    }

    #[test]
    fn test_negotiate_prefers_mono_i16_at_8k() {
        let ranges = vec![
            range(2, 8000, 48000, SampleFormat::I16),
            range(1, 8000, 48000, SampleFormat::F32),
            range(1, 8000, 48000, SampleFormat::I16),
        ];
        let config = negotiate(&ranges, preferred(), "Capture");
        assert_eq!(config.sample_rate().0, 8000);
        assert_eq!(config.channels(), 1);
        assert_eq!(config.sample_format(), SampleFormat::I16);
    }

    #[test]
    fn test_negotiate_mono_beats_format() {
        let ranges = vec![
            range(2, 8000, 48000, SampleFormat::I16),
            range(1, 8000, 48000, SampleFormat::F32),
        ];
        let config = negotiate(&ranges, preferred(), "Capture");
        assert_eq!(config.channels(), 1);
        assert_eq!(config.sample_format(), SampleFormat::F32);
    }

    #[test]
    fn test_negotiate_falls_back_to_preferred() {
        let ranges = vec![range(2, 44100, 48000, SampleFormat::F32)];
        let config = negotiate(&ranges, preferred(), "Capture");
        assert_eq!(device_format(&config), DeviceFormat { sample_rate: 48000, channels: 2 });
    }

    #[test]
    fn test_negotiate_skips_unhandled_formats() {
        let ranges = vec![range(1, 8000, 8000, SampleFormat::U8)];
        let config = negotiate(&ranges, preferred(), "Playback");
        assert_eq!(config.sample_rate().0, 48000);
    }

    #[test]
    fn test_host_enumeration_does_not_panic() {
        // Only meaningful where audio hardware exists
        let host = CpalHost::new();
        let _ = host.device_names(Direction::Capture);
        let _ = host.device_names(Direction::Playback);
    }
}
