//! Host audio driver using CPAL, so the pipeline runs on a desktop machine.
//!
//! The peripheral's bus model maps onto CPAL streams: installing a direction
//! opens an input or output stream, pin binding and amplifier control are
//! no-ops, and reads/writes move samples through bounded channels that the
//! stream callbacks drain or fill.

use crate::audio::driver::{BusConfig, Direction, I2sDriver, PinRoles};
use crate::error::{Result, VoltError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::collections::VecDeque;
use std::time::Duration;

/// Preferred device names for PipeWire/PulseAudio desktops.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse"];

/// Captured blocks queued between the input callback and `read`.
const CAPTURE_QUEUE_BLOCKS: usize = 64;

/// Playback blocks queued between `write` and the output callback.
const PLAYBACK_QUEUE_BLOCKS: usize = 16;

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES.iter().any(|pref| lower.contains(pref))
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / i16::MAX as f32
}

/// Audio devices visible to the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostDevices {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// List input and output devices of the default host.
///
/// # Errors
/// Returns `VoltError::Hardware` if device enumeration fails.
pub fn list_devices() -> Result<HostDevices> {
    let host = cpal::default_host();
    let inputs = host
        .input_devices()
        .map_err(|e| VoltError::hardware(format!("Failed to enumerate input devices: {}", e)))?
        .filter_map(|d| d.name().ok())
        .collect();
    let outputs = host
        .output_devices()
        .map_err(|e| VoltError::hardware(format!("Failed to enumerate output devices: {}", e)))?
        .filter_map(|d| d.name().ok())
        .collect();
    Ok(HostDevices { inputs, outputs })
}

fn find_device(direction: Direction, name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    let devices = match direction {
        Direction::Capture => host.input_devices(),
        Direction::Playback => host.output_devices(),
    }
    .map_err(|e| VoltError::hardware(format!("Failed to enumerate {direction} devices: {e}")))?;

    let mut preferred = None;
    for device in devices {
        let Ok(device_name) = device.name() else {
            continue;
        };
        match name {
            Some(wanted) if device_name == wanted => return Ok(device),
            None if preferred.is_none() && is_preferred_device(&device_name) => {
                preferred = Some(device)
            }
            _ => {}
        }
    }

    if let Some(wanted) = name {
        return Err(VoltError::hardware(format!(
            "{direction} device not found: {wanted}"
        )));
    }
    preferred
        .or_else(|| match direction {
            Direction::Capture => host.default_input_device(),
            Direction::Playback => host.default_output_device(),
        })
        .ok_or_else(|| VoltError::hardware(format!("no default {direction} device")))
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched by the thread that owns the driver;
/// the driver itself is moved, never shared.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

enum Active {
    Capture {
        _stream: SendableStream,
        blocks: Receiver<Vec<i16>>,
        leftover: Vec<u8>,
        cursor: usize,
    },
    Playback {
        _stream: SendableStream,
        blocks: Sender<Vec<i16>>,
        odd_byte: Option<u8>,
    },
}

/// [`I2sDriver`] backed by the host's default audio devices.
pub struct CpalI2sDriver {
    input_device: Option<String>,
    output_device: Option<String>,
    active: Option<Active>,
    pins_bound: bool,
}

impl CpalI2sDriver {
    /// Create a driver. `None` picks PipeWire/PulseAudio if present, else the default device.
    pub fn new(input_device: Option<String>, output_device: Option<String>) -> Self {
        Self {
            input_device,
            output_device,
            active: None,
            pins_bound: false,
        }
    }

    fn open_capture(&self, config: &BusConfig) -> Result<Active> {
        let device = find_device(Direction::Capture, self.input_device.as_deref())?;
        let stream_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let (tx, rx) = crossbeam_channel::bounded::<Vec<i16>>(CAPTURE_QUEUE_BLOCKS);
        let err_callback = |err| tracing::warn!(error = %err, "capture stream error");

        let i16_tx = tx.clone();
        let stream = match device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let _dropped = i16_tx.try_send(data.to_vec()).is_err();
            },
            err_callback,
            None,
        ) {
            Ok(stream) => stream,
            Err(_) => device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let block = data.iter().map(|&s| f32_to_i16(s)).collect();
                        let _dropped = tx.try_send(block).is_err();
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| {
                    VoltError::hardware(format!(
                        "capture device rejects {} Hz mono: {}",
                        config.sample_rate, e
                    ))
                })?,
        };
        stream
            .play()
            .map_err(|e| VoltError::hardware(format!("Failed to start capture stream: {}", e)))?;

        Ok(Active::Capture {
            _stream: SendableStream(stream),
            blocks: rx,
            leftover: Vec::new(),
            cursor: 0,
        })
    }

    fn open_playback(&self, config: &BusConfig) -> Result<Active> {
        let device = find_device(Direction::Playback, self.output_device.as_deref())?;
        let stream_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let (tx, rx) = crossbeam_channel::bounded::<Vec<i16>>(PLAYBACK_QUEUE_BLOCKS);
        let err_callback = |err| tracing::warn!(error = %err, "playback stream error");

        let i16_rx = rx.clone();
        let mut i16_queue = VecDeque::new();
        let stream = match device.build_output_stream(
            &stream_config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                fill_output(data, &i16_rx, &mut i16_queue, |s| s);
            },
            err_callback,
            None,
        ) {
            Ok(stream) => stream,
            Err(_) => {
                let mut f32_queue = VecDeque::new();
                device
                    .build_output_stream(
                        &stream_config,
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            fill_output(data, &rx, &mut f32_queue, i16_to_f32);
                        },
                        err_callback,
                        None,
                    )
                    .map_err(|e| {
                        VoltError::hardware(format!(
                            "playback device rejects {} Hz mono: {}",
                            config.sample_rate, e
                        ))
                    })?
            }
        };
        stream
            .play()
            .map_err(|e| VoltError::hardware(format!("Failed to start playback stream: {}", e)))?;

        Ok(Active::Playback {
            _stream: SendableStream(stream),
            blocks: tx,
            odd_byte: None,
        })
    }
}

/// Fill an output callback buffer from queued blocks, padding with silence.
fn fill_output<T: Copy>(
    data: &mut [T],
    blocks: &Receiver<Vec<i16>>,
    queue: &mut VecDeque<i16>,
    convert: impl Fn(i16) -> T,
) {
    while queue.len() < data.len() {
        match blocks.try_recv() {
            Ok(block) => queue.extend(block),
            Err(_) => break,
        }
    }
    for out in data.iter_mut() {
        *out = convert(queue.pop_front().unwrap_or(0));
    }
}

impl I2sDriver for CpalI2sDriver {
    fn uninstall(&mut self) {
        if self.active.take().is_some() {
            tracing::debug!("host audio stream closed");
        }
        self.pins_bound = false;
    }

    fn install(&mut self, config: &BusConfig) -> Result<()> {
        self.uninstall();
        let active = match config.direction {
            Direction::Capture => self.open_capture(config)?,
            Direction::Playback => self.open_playback(config)?,
        };
        self.active = Some(active);
        tracing::debug!(
            direction = %config.direction,
            sample_rate = config.sample_rate,
            "host audio stream opened"
        );
        Ok(())
    }

    fn bind_pins(&mut self, pins: &PinRoles) -> Result<()> {
        if self.active.is_none() {
            return Err(VoltError::hardware("pins bound before driver install"));
        }
        tracing::trace!(?pins, "pin binding is a no-op on the host driver");
        self.pins_bound = true;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let Some(Active::Capture {
            blocks,
            leftover,
            cursor,
            ..
        }) = self.active.as_mut()
        else {
            return Err(VoltError::hardware("read while not configured for capture"));
        };

        if *cursor >= leftover.len() {
            let block = match blocks.recv_timeout(timeout) {
                Ok(block) => block,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(VoltError::timeout("host audio read"));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(VoltError::hardware("capture stream stopped"));
                }
            };
            leftover.clear();
            leftover.extend(block.iter().flat_map(|s| s.to_le_bytes()));
            *cursor = 0;
        }

        let n = buf.len().min(leftover.len() - *cursor);
        buf[..n].copy_from_slice(&leftover[*cursor..*cursor + n]);
        *cursor += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8], timeout: Duration) -> Result<usize> {
        let Some(Active::Playback {
            blocks, odd_byte, ..
        }) = self.active.as_mut()
        else {
            return Err(VoltError::hardware("write while not configured for playback"));
        };
        if buf.is_empty() {
            return Ok(0);
        }

        let mut bytes = buf;
        let mut block = Vec::with_capacity(buf.len() / 2 + 1);
        if let Some(low) = odd_byte.take() {
            block.push(i16::from_le_bytes([low, bytes[0]]));
            bytes = &bytes[1..];
        }
        let mut pairs = bytes.chunks_exact(2);
        block.extend(pairs.by_ref().map(|p| i16::from_le_bytes([p[0], p[1]])));
        if let [last] = pairs.remainder() {
            *odd_byte = Some(*last);
        }

        match blocks.send_timeout(block, timeout) {
            Ok(()) => Ok(buf.len()),
            Err(SendTimeoutError::Timeout(_)) => Err(VoltError::timeout("host audio write")),
            Err(SendTimeoutError::Disconnected(_)) => {
                Err(VoltError::hardware("playback stream stopped"))
            }
        }
    }

    fn set_amplifier(&mut self, enabled: bool) -> Result<()> {
        tracing::trace!(enabled, "amplifier control is a no-op on the host driver");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_preferred_device() {
        assert!(is_preferred_device("pipewire"));
        assert!(is_preferred_device("PipeWire"));
        assert!(is_preferred_device("PulseAudio"));
        assert!(!is_preferred_device("hw:0,0"));
        assert!(!is_preferred_device("default"));
    }

    #[test]
    fn test_sample_conversion_clamps() {
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(0.0), 0);
        assert!((i16_to_f32(i16::MAX) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_fill_output_pads_with_silence() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        tx.send(vec![1i16, 2, 3]).unwrap();
        let mut queue = VecDeque::new();
        let mut out = [9i16; 5];

        fill_output(&mut out, &rx, &mut queue, |s| s);

        assert_eq!(out, [1, 2, 3, 0, 0]);
    }

    #[test]
    fn test_read_without_install_is_hardware_error() {
        let mut driver = CpalI2sDriver::new(None, None);
        let mut buf = [0u8; 4];
        match driver.read(&mut buf, Duration::from_millis(1)) {
            Err(VoltError::Hardware { .. }) => {}
            other => panic!("Expected Hardware error, got {:?}", other),
        }
    }

    #[test]
    fn test_bind_pins_requires_install() {
        let mut driver = CpalI2sDriver::new(None, None);
        assert!(driver.bind_pins(&PinRoles::capture_default()).is_err());
    }

    #[test]
    fn test_unknown_device_name_fails_install() {
        let mut driver = CpalI2sDriver::new(Some("NonExistentDevice12345".into()), None);
        let result = driver.install(&BusConfig::mono16(Direction::Capture, 16000));
        assert!(result.is_err());
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_list_devices_finds_something() {
        let devices = list_devices().unwrap();
        assert!(!devices.inputs.is_empty() || !devices.outputs.is_empty());
    }
}
