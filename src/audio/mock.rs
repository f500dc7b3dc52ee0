//! Mock peripheral driver for tests and dry runs.

use crate::audio::driver::{BusConfig, Direction, I2sDriver, PinRoles};
use crate::clock::MockClock;
use crate::error::{Result, VoltError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Configuration change observed by the mock driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    Uninstalled,
    Installed {
        direction: Direction,
        sample_rate: u32,
    },
    PinsBound {
        direction: Direction,
        pins: PinRoles,
    },
    Amplifier(bool),
}

#[derive(Debug, Default)]
struct MockDriverState {
    events: Vec<DriverEvent>,
    installed: Option<Direction>,
    amplifier_on: bool,
    bytes_read: u64,
    bytes_written: u64,
    write_calls: u64,
    largest_write: usize,
    last_write_silent: bool,
}

/// Mock audio peripheral.
///
/// Capture returns a repeating sample pattern; playback only counts bytes so
/// arbitrarily long streams can be written without storing them.
#[derive(Debug)]
pub struct MockI2sDriver {
    state: Arc<Mutex<MockDriverState>>,
    pattern: Vec<u8>,
    cursor: usize,
    max_read: Option<usize>,
    fail_install: Option<Direction>,
    fail_pins: bool,
    stall_reads: bool,
    fail_writes: bool,
    clock: Option<(MockClock, Duration)>,
}

impl MockI2sDriver {
    /// Create a mock driver that captures silence.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockDriverState::default())),
            pattern: Vec::new(),
            cursor: 0,
            max_read: None,
            fail_install: None,
            fail_pins: false,
            stall_reads: false,
            fail_writes: false,
            clock: None,
        }
    }

    /// Capture reads cycle through these samples.
    pub fn with_samples(mut self, samples: &[i16]) -> Self {
        self.pattern = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.cursor = 0;
        self
    }

    /// Limit every read to at most `bytes`.
    pub fn with_short_reads(mut self, bytes: usize) -> Self {
        self.max_read = Some(bytes.max(1));
        self
    }

    /// Fail driver installation for one direction.
    pub fn with_install_failure(mut self, direction: Direction) -> Self {
        self.fail_install = Some(direction);
        self
    }

    /// Fail pin binding.
    pub fn with_pin_failure(mut self) -> Self {
        self.fail_pins = true;
        self
    }

    /// Every read times out.
    pub fn with_read_stall(mut self) -> Self {
        self.stall_reads = true;
        self
    }

    /// Every write fails with a hardware error.
    pub fn with_write_failure(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Advance `clock` by `per_read` on each read, simulating blocking time.
    pub fn with_clock(mut self, clock: MockClock, per_read: Duration) -> Self {
        self.clock = Some((clock, per_read));
        self
    }

    /// Handle for inspecting the driver after it has been moved into a controller.
    pub fn probe(&self) -> MockDriverProbe {
        MockDriverProbe {
            state: Arc::clone(&self.state),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockDriverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockI2sDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl I2sDriver for MockI2sDriver {
    fn uninstall(&mut self) {
        let mut state = self.state();
        state.installed = None;
        state.events.push(DriverEvent::Uninstalled);
    }

    fn install(&mut self, config: &BusConfig) -> Result<()> {
        if self.fail_install == Some(config.direction) {
            return Err(VoltError::hardware(format!(
                "mock {} driver install failed",
                config.direction
            )));
        }
        let mut state = self.state();
        state.installed = Some(config.direction);
        state.events.push(DriverEvent::Installed {
            direction: config.direction,
            sample_rate: config.sample_rate,
        });
        Ok(())
    }

    fn bind_pins(&mut self, pins: &PinRoles) -> Result<()> {
        if self.fail_pins {
            return Err(VoltError::hardware("mock pin binding failed"));
        }
        let mut state = self.state();
        let direction = state
            .installed
            .ok_or_else(|| VoltError::hardware("pins bound before driver install"))?;
        state.events.push(DriverEvent::PinsBound {
            direction,
            pins: *pins,
        });
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if let Some((clock, per_read)) = &self.clock {
            clock.advance(*per_read);
        }
        if self.state().installed != Some(Direction::Capture) {
            return Err(VoltError::hardware("read while not configured for capture"));
        }
        if self.stall_reads {
            return Err(VoltError::timeout("mock audio read"));
        }

        let n = self.max_read.map_or(buf.len(), |max| buf.len().min(max));
        if self.pattern.is_empty() {
            buf[..n].fill(0);
        } else {
            for byte in &mut buf[..n] {
                *byte = self.pattern[self.cursor];
                self.cursor = (self.cursor + 1) % self.pattern.len();
            }
        }
        self.state().bytes_read += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8], _timeout: Duration) -> Result<usize> {
        let mut state = self.state();
        if state.installed != Some(Direction::Playback) {
            return Err(VoltError::hardware("write while not configured for playback"));
        }
        if self.fail_writes {
            return Err(VoltError::hardware("mock audio write failed"));
        }
        state.bytes_written += buf.len() as u64;
        state.write_calls += 1;
        state.largest_write = state.largest_write.max(buf.len());
        state.last_write_silent = buf.iter().all(|&b| b == 0);
        Ok(buf.len())
    }

    fn set_amplifier(&mut self, enabled: bool) -> Result<()> {
        let mut state = self.state();
        state.amplifier_on = enabled;
        state.events.push(DriverEvent::Amplifier(enabled));
        Ok(())
    }
}

/// Read-only view into a [`MockI2sDriver`]'s recorded state.
#[derive(Debug, Clone)]
pub struct MockDriverProbe {
    state: Arc<Mutex<MockDriverState>>,
}

impl MockDriverProbe {
    fn state(&self) -> MutexGuard<'_, MockDriverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<DriverEvent> {
        self.state().events.clone()
    }

    pub fn installed(&self) -> Option<Direction> {
        self.state().installed
    }

    pub fn amplifier_on(&self) -> bool {
        self.state().amplifier_on
    }

    pub fn bytes_read(&self) -> u64 {
        self.state().bytes_read
    }

    pub fn bytes_written(&self) -> u64 {
        self.state().bytes_written
    }

    pub fn write_calls(&self) -> u64 {
        self.state().write_calls
    }

    pub fn largest_write(&self) -> usize {
        self.state().largest_write
    }

    pub fn last_write_silent(&self) -> bool {
        self.state().last_write_silent
    }
}
