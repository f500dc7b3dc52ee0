//! Incremental playback of a PCM byte stream of unknown length.

use crate::audio::driver::I2sDriver;
use crate::audio::duplex::PlaybackToken;
use crate::clock::Clock;
use crate::defaults;
use crate::error::{Result, VoltError};
use crate::net;
use std::io::{self, Read};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerConfig {
    /// Size of the single transfer buffer. Must be even.
    pub chunk_bytes: usize,
    /// End the stream after this long without new bytes.
    pub idle_timeout: Duration,
    /// Pause between polls while the source has nothing ready.
    pub poll_interval: Duration,
    /// Timeout of each peripheral write.
    pub write_timeout: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: defaults::STREAM_CHUNK_BYTES,
            idle_timeout: Duration::from_millis(defaults::STREAM_IDLE_TIMEOUT_MS),
            poll_interval: Duration::from_millis(defaults::STREAM_POLL_INTERVAL_MS),
            write_timeout: Duration::from_millis(defaults::AUDIO_WRITE_TIMEOUT_MS),
        }
    }
}

/// Why a playback loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The source reported end of stream.
    Eof,
    /// The declared content length was consumed.
    LengthReached,
    /// No bytes arrived within the idle timeout after playback had started.
    IdleTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackReport {
    pub bytes_played: u64,
    pub chunks: u64,
    pub ended_by: StreamEnd,
}

/// Moves bytes from a reader to the playback side of the peripheral through
/// one fixed buffer, so memory use does not depend on the stream length.
pub struct Player<C: Clock> {
    config: PlayerConfig,
    clock: C,
    chunk: Vec<u8>,
}

impl<C: Clock> Player<C> {
    pub fn new(config: PlayerConfig, clock: C) -> Self {
        let size = (config.chunk_bytes.max(2)) & !1;
        Self {
            config,
            clock,
            chunk: vec![0u8; size],
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Size of the transfer buffer in bytes.
    pub fn chunk_capacity(&self) -> usize {
        self.chunk.len()
    }

    /// Deadline `timeout` from now on the player's clock.
    pub fn deadline_in(&self, timeout: Duration) -> Instant {
        self.clock.now() + timeout
    }

    /// Stream `source` to the speaker until it ends, then write one chunk of silence.
    ///
    /// `declared_len` is the content length when known. Reads that fail with
    /// `WouldBlock` or a timeout are polled until `idle_timeout`; an idle
    /// timeout before any audio arrived is an error, afterwards it ends the
    /// stream normally. `deadline` bounds the whole call and is checked at
    /// chunk boundaries.
    pub fn play<D: I2sDriver>(
        &mut self,
        playback: &mut PlaybackToken<'_, D>,
        source: &mut dyn Read,
        declared_len: Option<u64>,
        deadline: Option<Instant>,
    ) -> Result<PlaybackReport> {
        let capacity = self.chunk.len();
        let mut remaining = declared_len;
        let mut pending = 0usize;
        let mut bytes_played = 0u64;
        let mut chunks = 0u64;
        let mut last_data = self.clock.now();

        let ended_by = loop {
            if remaining == Some(0) {
                break StreamEnd::LengthReached;
            }
            if let Some(deadline) = deadline
                && self.clock.now() >= deadline
            {
                return Err(VoltError::timeout("speech playback"));
            }

            let room = capacity - pending;
            let want = match remaining {
                Some(r) => room.min(usize::try_from(r).unwrap_or(usize::MAX)),
                None => room,
            };

            match source.read(&mut self.chunk[pending..pending + want]) {
                Ok(0) => break StreamEnd::Eof,
                Ok(n) => {
                    last_data = self.clock.now();
                    if let Some(r) = remaining.as_mut() {
                        *r = r.saturating_sub(n as u64);
                    }
                    let available = pending + n;
                    let whole = available & !1;
                    playback.write_all(&self.chunk[..whole], self.config.write_timeout)?;
                    bytes_played += whole as u64;
                    chunks += 1;
                    pending = available - whole;
                    if pending == 1 {
                        self.chunk[0] = self.chunk[whole];
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock || net::is_timeout(&e) => {
                    let idle = self.clock.elapsed_since(last_data);
                    if idle >= self.config.idle_timeout {
                        if bytes_played == 0 && pending == 0 {
                            return Err(VoltError::timeout("waiting for speech audio"));
                        }
                        break StreamEnd::IdleTimeout;
                    }
                    self.clock.sleep(self.config.poll_interval);
                }
                Err(e) => {
                    return Err(VoltError::NetworkUnavailable {
                        reason: format!("speech stream interrupted: {e}"),
                    });
                }
            }
        };

        if pending != 0 {
            tracing::debug!("dropping trailing odd byte from speech stream");
        }

        self.chunk.fill(0);
        playback.write_all(&self.chunk, self.config.write_timeout)?;

        tracing::debug!(bytes_played, chunks, ?ended_by, "playback stream finished");
        Ok(PlaybackReport {
            bytes_played,
            chunks,
            ended_by,
        })
    }
}
