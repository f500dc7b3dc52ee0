use crate::audio::driver::I2sDriver;
use crate::audio::duplex::{AudioDuplexController, CaptureToken};
use crate::audio::pcm::PcmBuffer;
use crate::clock::Clock;
use crate::defaults;
use crate::error::{Result, VoltError};
use std::time::Duration;

/// Tuning for a capture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Upper bound on bytes requested per peripheral read.
    pub chunk_bytes: usize,
    /// Timeout of a single peripheral read.
    pub read_timeout: Duration,
    /// Time allowed beyond the recording length before padding kicks in.
    pub timeout_slack: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: defaults::READ_CHUNK_BYTES,
            read_timeout: Duration::from_millis(defaults::AUDIO_READ_TIMEOUT_MS),
            timeout_slack: Duration::from_millis(defaults::RECORD_TIMEOUT_SLACK_MS),
        }
    }
}

/// Outcome of [`Recorder::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recording {
    /// Bytes actually delivered by the peripheral.
    pub bytes_captured: usize,
    /// Bytes zero-filled after the hard timeout.
    pub padded_bytes: usize,
    pub timed_out: bool,
}

impl Recording {
    pub fn total_bytes(&self) -> usize {
        self.bytes_captured + self.padded_bytes
    }
}

/// Fills a [`PcmBuffer`] from the capture side of the peripheral.
pub struct Recorder<C: Clock> {
    config: RecorderConfig,
    clock: C,
}

impl<C: Clock> Recorder<C> {
    pub fn new(config: RecorderConfig, clock: C) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Acquire capture, record, and release the peripheral again.
    pub fn capture<D: I2sDriver>(
        &self,
        audio: &mut AudioDuplexController<D>,
        pcm: &mut PcmBuffer,
        duration_secs: u32,
    ) -> Result<Recording> {
        let mut token = audio.acquire_capture()?;
        let recording = self.record(&mut token, pcm, duration_secs);
        token.release();
        recording
    }

    /// Record `duration_secs` of audio into `pcm`.
    ///
    /// Reads in chunks of at most `chunk_bytes` until the byte target is met.
    /// Individual read timeouts are tolerated. Once the hard timeout
    /// (`duration_secs` plus slack) expires the rest of the target is
    /// zero-filled and the call still succeeds.
    ///
    /// # Errors
    /// Returns `VoltError::BufferBusy` if the buffer is still shared with an
    /// upload, or any non-timeout peripheral error.
    pub fn record<D: I2sDriver>(
        &self,
        capture: &mut CaptureToken<'_, D>,
        pcm: &mut PcmBuffer,
        duration_secs: u32,
    ) -> Result<Recording> {
        if capture.sample_rate() != pcm.sample_rate() {
            tracing::warn!(
                capture_rate = capture.sample_rate(),
                buffer_rate = pcm.sample_rate(),
                "capture and buffer sample rates differ"
            );
        }

        let hard_timeout = Duration::from_secs(u64::from(duration_secs)) + self.config.timeout_slack;
        let wanted = (pcm.sample_rate() as usize)
            .saturating_mul(duration_secs as usize)
            .saturating_mul(defaults::BYTES_PER_SAMPLE);
        let chunk = self.config.chunk_bytes.max(defaults::BYTES_PER_SAMPLE);

        let storage = pcm.writable()?;
        let target = wanted.min(storage.len());
        let start = self.clock.now();
        let mut captured = 0usize;
        let mut timed_out = false;

        tracing::debug!(target, duration_secs, "recording started");

        while captured < target {
            if self.clock.elapsed_since(start) >= hard_timeout {
                timed_out = true;
                break;
            }
            let end = (captured + chunk).min(target);
            match capture.read(&mut storage[captured..end], self.config.read_timeout) {
                Ok(n) => captured += n,
                Err(VoltError::Timeout { .. }) => {
                    tracing::debug!(captured, "capture read timed out, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        let padded = target - captured;
        storage[captured..target].fill(0);
        pcm.set_filled(target);

        let elapsed_ms = self.clock.elapsed_since(start).as_millis() as u64;
        if timed_out {
            tracing::warn!(
                captured,
                padded,
                elapsed_ms,
                "recording hit hard timeout, padded with silence"
            );
        } else {
            tracing::info!(bytes = captured, elapsed_ms, "recording complete");
        }

        Ok(Recording {
            bytes_captured: captured,
            padded_bytes: padded,
            timed_out,
        })
    }
}
