// Device Seam
//
// The engine only ever talks to these traits. A backend delivers capture
// buffers through a registered handler and accepts playback bytes; both
// sides carry mono little-endian i16 PCM.

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Capture,
    Playback,
}

/// Format a device was actually opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Capture-ready handler.
///
/// Receives mono little-endian i16 bytes at the device's native rate, on
/// whatever thread the backend delivers audio from.
pub type CaptureHandler = Box<dyn FnMut(&[u8]) + Send + 'static>;

pub trait InputDevice {
    fn name(&self) -> &str;

    fn format(&self) -> DeviceFormat;

    /// Register `handler` and begin delivering buffers.
    /// Starting again replaces the previous registration.
    fn start(&mut self, handler: CaptureHandler) -> Result<()>;

    /// Drop the handler registration. No buffers arrive after this returns.
    fn stop(&mut self) -> Result<()>;
}

pub trait OutputDevice {
    fn name(&self) -> &str;

    fn format(&self) -> DeviceFormat;

    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Queue 8kHz mono little-endian i16 bytes for playback.
    /// Returns how many bytes were accepted.
    fn write(&mut self, pcm_bytes: &[u8]) -> Result<usize>;
}

pub trait AudioHost {
    /// Device names in host order
    fn device_names(&self, direction: Direction) -> Result<Vec<String>>;

    /// Open a capture device by name, or the default when `name` is `None`.
    ///
    /// `Ok(None)` means the host has no capture hardware at all. An unknown
    /// name falls back to the default device.
    fn open_input(&self, name: Option<&str>) -> Result<Option<Box<dyn InputDevice>>>;

    /// Playback counterpart of `open_input`
    fn open_output(&self, name: Option<&str>) -> Result<Option<Box<dyn OutputDevice>>>;
}

/// Serialize samples as little-endian bytes, reusing `pcm_bytes`
pub fn encode_pcm(samples: &[i16], pcm_bytes: &mut Vec<u8>) {
    pcm_bytes.clear();
    pcm_bytes.reserve(samples.len() * 2);
    for sample in samples {
        pcm_bytes.extend_from_slice(&sample.to_le_bytes());
    }
}

/// Decode little-endian bytes; a trailing odd byte is ignored
pub fn decode_pcm(pcm_bytes: &[u8]) -> Vec<i16> {
    pcm_bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
