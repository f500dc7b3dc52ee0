//! Exclusive ownership of the single duplex audio peripheral.
//!
//! Capture and playback share one physical bus. Acquiring a direction tears
//! down whatever was configured before and returns a token that borrows the
//! controller mutably, so a capture handle and a playback handle can never be
//! alive at the same time and reads/writes are only reachable through the
//! matching token.

use crate::audio::driver::{BusConfig, Direction, I2sDriver, PinRoles};
use crate::defaults;
use crate::error::{Result, VoltError};
use std::time::Duration;

/// Static configuration of the peripheral for both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplexSettings {
    pub capture: BusConfig,
    pub playback: BusConfig,
    pub capture_pins: PinRoles,
    pub playback_pins: PinRoles,
    /// Bytes discarded right after capture is configured.
    pub settle_bytes: usize,
    /// Timeout for settling reads and the release silence flush.
    pub io_timeout: Duration,
}

impl DuplexSettings {
    /// Default bus and pin layout with the given sample rates.
    pub fn new(capture_rate: u32, playback_rate: u32) -> Self {
        Self {
            capture: BusConfig::mono16(Direction::Capture, capture_rate),
            playback: BusConfig::mono16(Direction::Playback, playback_rate),
            capture_pins: PinRoles::capture_default(),
            playback_pins: PinRoles::playback_default(),
            settle_bytes: defaults::SETTLE_BYTES,
            io_timeout: Duration::from_millis(defaults::AUDIO_WRITE_TIMEOUT_MS),
        }
    }
}

impl Default for DuplexSettings {
    fn default() -> Self {
        Self::new(defaults::SAMPLE_RATE, defaults::PLAYBACK_SAMPLE_RATE)
    }
}

/// Owner of the shared audio peripheral.
pub struct AudioDuplexController<D: I2sDriver> {
    driver: D,
    settings: DuplexSettings,
    active: Option<Direction>,
    silence: Vec<u8>,
}

impl<D: I2sDriver> AudioDuplexController<D> {
    pub fn new(driver: D, settings: DuplexSettings) -> Self {
        let silence = vec![0u8; settings.playback.dma_buffer_bytes()];
        Self {
            driver,
            settings,
            active: None,
            silence,
        }
    }

    /// Direction currently configured, if any.
    pub fn active_direction(&self) -> Option<Direction> {
        self.active
    }

    pub fn settings(&self) -> &DuplexSettings {
        &self.settings
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Configure the peripheral for capture.
    ///
    /// The first [`DuplexSettings::settle_bytes`] of audio are read and
    /// discarded before the token is returned.
    ///
    /// # Errors
    /// Returns `VoltError::Hardware` if driver install or pin binding fails.
    pub fn acquire_capture(&mut self) -> Result<CaptureToken<'_, D>> {
        self.reconfigure(Direction::Capture)?;
        self.discard_settling();
        Ok(CaptureToken {
            controller: self,
            released: false,
        })
    }

    /// Configure the peripheral for playback and power the amplifier on.
    ///
    /// # Errors
    /// Returns `VoltError::Hardware` if driver install, pin binding or
    /// amplifier control fails.
    pub fn acquire_playback(&mut self) -> Result<PlaybackToken<'_, D>> {
        self.reconfigure(Direction::Playback)?;
        if let Err(e) = self.driver.set_amplifier(true) {
            self.teardown();
            return Err(as_hardware(Direction::Playback, e));
        }
        Ok(PlaybackToken {
            controller: self,
            released: false,
        })
    }

    /// Tear down any configuration. Used at shutdown.
    pub fn shutdown(&mut self) {
        self.teardown();
    }

    fn reconfigure(&mut self, direction: Direction) -> Result<()> {
        self.teardown();

        let (bus, pins) = match direction {
            Direction::Capture => (self.settings.capture, self.settings.capture_pins),
            Direction::Playback => (self.settings.playback, self.settings.playback_pins),
        };

        if let Err(e) = self.driver.install(&bus) {
            self.driver.uninstall();
            return Err(as_hardware(direction, e));
        }
        if let Err(e) = self.driver.bind_pins(&pins) {
            self.driver.uninstall();
            return Err(as_hardware(direction, e));
        }

        self.active = Some(direction);
        tracing::debug!(
            %direction,
            sample_rate = bus.sample_rate,
            bit_clock = pins.bit_clock,
            word_select = pins.word_select,
            data = pins.data,
            "audio peripheral configured"
        );
        Ok(())
    }

    fn teardown(&mut self) {
        if self.active == Some(Direction::Playback)
            && let Err(e) = self.driver.set_amplifier(false)
        {
            tracing::warn!(error = %e, "failed to power down amplifier");
        }
        self.driver.uninstall();
        self.active = None;
    }

    fn discard_settling(&mut self) {
        let mut scratch = [0u8; 256];
        let mut remaining = self.settings.settle_bytes;
        while remaining > 0 {
            let want = remaining.min(scratch.len());
            match self.driver.read(&mut scratch[..want], self.settings.io_timeout) {
                Ok(0) => break,
                Ok(n) => remaining -= n.min(remaining),
                Err(e) => {
                    tracing::debug!(error = %e, "settling read failed, continuing");
                    break;
                }
            }
        }
    }

    fn flush_and_power_down(&mut self) -> Result<()> {
        let flushed = write_all(&mut self.driver, &self.silence, self.settings.io_timeout);
        self.teardown();
        flushed
    }
}

fn as_hardware(direction: Direction, error: VoltError) -> VoltError {
    match error {
        VoltError::Hardware { .. } => error,
        other => VoltError::hardware(format!("{direction} configuration failed: {other}")),
    }
}

fn write_all<D: I2sDriver>(driver: &mut D, mut buf: &[u8], timeout: Duration) -> Result<()> {
    while !buf.is_empty() {
        let n = driver.write(buf, timeout)?;
        if n == 0 {
            return Err(VoltError::timeout("audio write accepted no bytes"));
        }
        buf = &buf[n..];
    }
    Ok(())
}

/// Capability to read from the peripheral while it is configured for capture.
pub struct CaptureToken<'a, D: I2sDriver> {
    controller: &'a mut AudioDuplexController<D>,
    released: bool,
}

impl<D: I2sDriver> CaptureToken<'_, D> {
    /// Blocking read of up to `buf.len()` bytes, bounded by `timeout`.
    pub fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.controller.driver.read(buf, timeout)
    }

    pub fn sample_rate(&self) -> u32 {
        self.controller.settings.capture.sample_rate
    }

    /// Tear the capture configuration down.
    pub fn release(mut self) {
        self.released = true;
        self.controller.teardown();
    }
}

impl<D: I2sDriver> Drop for CaptureToken<'_, D> {
    fn drop(&mut self) {
        if !self.released {
            self.controller.teardown();
        }
    }
}

/// Capability to write to the peripheral while it is configured for playback.
pub struct PlaybackToken<'a, D: I2sDriver> {
    controller: &'a mut AudioDuplexController<D>,
    released: bool,
}

impl<D: I2sDriver> PlaybackToken<'_, D> {
    /// Blocking write of up to `buf.len()` bytes, bounded by `timeout`.
    pub fn write(&mut self, buf: &[u8], timeout: Duration) -> Result<usize> {
        self.controller.driver.write(buf, timeout)
    }

    /// Write the whole buffer, each underlying write bounded by `timeout`.
    pub fn write_all(&mut self, buf: &[u8], timeout: Duration) -> Result<()> {
        write_all(&mut self.controller.driver, buf, timeout)
    }

    pub fn sample_rate(&self) -> u32 {
        self.controller.settings.playback.sample_rate
    }

    /// Flush one DMA buffer of silence, power the amplifier off and tear down.
    ///
    /// The peripheral is torn down even when the flush fails.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.controller.flush_and_power_down()
    }
}

impl<D: I2sDriver> Drop for PlaybackToken<'_, D> {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.controller.flush_and_power_down()
        {
            tracing::warn!(error = %e, "silence flush failed while dropping playback");
        }
    }
}
