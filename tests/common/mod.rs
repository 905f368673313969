//! In-memory audio host for driving `AudioEngine` without hardware

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use voicelink_audio::device::{decode_pcm, encode_pcm};
use voicelink_audio::{AudioHost, CaptureHandler, DeviceFormat, Direction, InputDevice, OutputDevice};

#[derive(Default)]
struct MockState {
    inputs: Vec<(String, u32)>,
    outputs: Vec<(String, u32)>,
    handler: Option<CaptureHandler>,
    output_started: bool,
    played: Vec<i16>,
}

/// Cloning shares the same devices, so a test can keep a handle after
/// moving the host into an engine.
#[derive(Clone, Default)]
pub struct MockHost {
    state: Arc<Mutex<MockState>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(self, name: &str, sample_rate: u32) -> Self {
        self.state.lock().unwrap().inputs.push((name.to_string(), sample_rate));
        self
    }

    pub fn with_output(self, name: &str, sample_rate: u32) -> Self {
        self.state.lock().unwrap().outputs.push((name.to_string(), sample_rate));
        self
    }

    /// Deliver one capture buffer at the device rate.
    /// Returns false when no handler is registered.
    pub fn deliver(&self, samples: &[i16]) -> bool {
        let mut bytes = Vec::new();
        encode_pcm(samples, &mut bytes);
        self.deliver_bytes(&bytes)
    }

    pub fn deliver_bytes(&self, bytes: &[u8]) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.handler.as_mut() {
            Some(handler) => {
                handler(bytes);
                true
            }
            None => false,
        }
    }

    pub fn has_handler(&self) -> bool {
        self.state.lock().unwrap().handler.is_some()
    }

    pub fn output_started(&self) -> bool {
        self.state.lock().unwrap().output_started
    }

    pub fn played(&self) -> Vec<i16> {
        self.state.lock().unwrap().played.clone()
    }
}

/// First match by name, otherwise the first device (the mock's default)
fn pick(devices: &[(String, u32)], name: Option<&str>) -> Option<(String, u32)> {
    name.and_then(|wanted| devices.iter().find(|(n, _)| n == wanted))
        .or_else(|| devices.first())
        .cloned()
}

impl AudioHost for MockHost {
    fn device_names(&self, direction: Direction) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        let devices = match direction {
            Direction::Capture => &state.inputs,
            Direction::Playback => &state.outputs,
        };
        Ok(devices.iter().map(|(n, _)| n.clone()).collect())
    }

    fn open_input(&self, name: Option<&str>) -> Result<Option<Box<dyn InputDevice>>> {
        let picked = pick(&self.state.lock().unwrap().inputs, name);
        Ok(picked.map(|(name, sample_rate)| {
            Box::new(MockInput {
                name,
                sample_rate,
                state: self.state.clone(),
            }) as Box<dyn InputDevice>
        }))
    }

    fn open_output(&self, name: Option<&str>) -> Result<Option<Box<dyn OutputDevice>>> {
        let picked = pick(&self.state.lock().unwrap().outputs, name);
        Ok(picked.map(|(name, sample_rate)| {
            Box::new(MockOutput {
                name,
                sample_rate,
                state: self.state.clone(),
            }) as Box<dyn OutputDevice>
        }))
    }
}

struct MockInput {
    name: String,
    sample_rate: u32,
    state: Arc<Mutex<MockState>>,
}

impl InputDevice for MockInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> DeviceFormat {
        DeviceFormat {
            sample_rate: self.sample_rate,
            channels: 1,
        }
    }

    fn start(&mut self, handler: CaptureHandler) -> Result<()> {
        self.state.lock().unwrap().handler = Some(handler);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.state.lock().unwrap().handler = None;
        Ok(())
    }
}

struct MockOutput {
    name: String,
    sample_rate: u32,
    state: Arc<Mutex<MockState>>,
}

impl OutputDevice for MockOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> DeviceFormat {
        DeviceFormat {
            sample_rate: self.sample_rate,
            channels: 1,
        }
    }

    fn start(&mut self) -> Result<()> {
        self.state.lock().unwrap().output_started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.state.lock().unwrap().output_started = false;
        Ok(())
    }

    fn write(&mut self, pcm_bytes: &[u8]) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.played.extend(decode_pcm(pcm_bytes));
        Ok(pcm_bytes.len())
    }
}
