//! Low-level driver seam for the duplex audio peripheral.
//!
//! The [`I2sDriver`] trait is what the duplex controller configures and moves
//! bytes through. Implementations exist for a desktop host (cpal) and for tests
//! ([`MockI2sDriver`](crate::audio::mock::MockI2sDriver)).

use crate::defaults;
use crate::error::Result;
use std::fmt;
use std::time::Duration;

/// Direction the shared peripheral is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Capture,
    Playback,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Capture => f.write_str("capture"),
            Direction::Playback => f.write_str("playback"),
        }
    }
}

/// Pin roles bound for one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinRoles {
    /// Bit clock.
    pub bit_clock: u8,
    /// Word select (left/right clock).
    pub word_select: u8,
    /// Data in (capture) or data out (playback).
    pub data: u8,
}

impl PinRoles {
    pub fn capture_default() -> Self {
        let (bit_clock, word_select, data) = defaults::CAPTURE_PINS;
        Self {
            bit_clock,
            word_select,
            data,
        }
    }

    pub fn playback_default() -> Self {
        let (bit_clock, word_select, data) = defaults::PLAYBACK_PINS;
        Self {
            bit_clock,
            word_select,
            data,
        }
    }
}

/// Bus configuration installed on the peripheral for one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    pub direction: Direction,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub dma_buffer_count: usize,
    pub dma_buffer_frames: usize,
}

impl BusConfig {
    /// Mono 16-bit bus at the given rate with default DMA sizing.
    pub fn mono16(direction: Direction, sample_rate: u32) -> Self {
        Self {
            direction,
            sample_rate,
            bits_per_sample: 16,
            dma_buffer_count: defaults::DMA_BUFFER_COUNT,
            dma_buffer_frames: defaults::DMA_BUFFER_FRAMES,
        }
    }

    /// Size of one DMA buffer in bytes.
    pub fn dma_buffer_bytes(&self) -> usize {
        self.dma_buffer_frames * usize::from(self.bits_per_sample / 8)
    }
}

/// Trait for the physical audio peripheral driver.
///
/// All blocking calls take an explicit timeout; implementations must return
/// [`VoltError::Timeout`](crate::error::VoltError::Timeout) rather than a
/// silent short result when it expires.
pub trait I2sDriver: Send {
    /// Removes any installed configuration. Must be safe to call when nothing is installed.
    fn uninstall(&mut self);

    /// Installs the bus (clocking, DMA) for one direction.
    fn install(&mut self, config: &BusConfig) -> Result<()>;

    /// Binds clock, word-select and data pins for the installed direction.
    fn bind_pins(&mut self, pins: &PinRoles) -> Result<()>;

    /// Reads up to `buf.len()` bytes of captured PCM.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Writes up to `buf.len()` bytes of PCM to the output. Returns bytes accepted.
    fn write(&mut self, buf: &[u8], timeout: Duration) -> Result<usize>;

    /// Switches the output amplifier.
    fn set_amplifier(&mut self, enabled: bool) -> Result<()>;
}

impl<T: I2sDriver + ?Sized> I2sDriver for Box<T> {
    fn uninstall(&mut self) {
        (**self).uninstall()
    }

    fn install(&mut self, config: &BusConfig) -> Result<()> {
        (**self).install(config)
    }

    fn bind_pins(&mut self, pins: &PinRoles) -> Result<()> {
        (**self).bind_pins(pins)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).read(buf, timeout)
    }

    fn write(&mut self, buf: &[u8], timeout: Duration) -> Result<usize> {
        (**self).write(buf, timeout)
    }

    fn set_amplifier(&mut self, enabled: bool) -> Result<()> {
        (**self).set_amplifier(enabled)
    }
}
