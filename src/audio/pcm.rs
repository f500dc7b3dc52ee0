//! Fixed-capacity PCM capture buffer.

use crate::defaults::BYTES_PER_SAMPLE;
use crate::error::{Result, VoltError};
use std::sync::Arc;

/// Mono 16-bit little-endian PCM buffer, allocated once and reused.
///
/// The storage sits behind an `Arc` so an upload can stream from it without
/// copying. The recorder needs exclusive access to refill it; while an upload
/// body still holds a [`SharedPcm`], [`PcmBuffer::writable`] fails with
/// [`VoltError::BufferBusy`] instead of reallocating.
#[derive(Debug)]
pub struct PcmBuffer {
    data: Arc<Vec<u8>>,
    filled: usize,
    sample_rate: u32,
}

impl PcmBuffer {
    /// Allocate a zeroed buffer for `seconds` of audio at `sample_rate`.
    ///
    /// # Errors
    /// Returns `VoltError::BufferAllocation` if the memory cannot be reserved.
    pub fn allocate(sample_rate: u32, seconds: u32) -> Result<Self> {
        let bytes = (sample_rate as usize)
            .saturating_mul(seconds as usize)
            .saturating_mul(BYTES_PER_SAMPLE);
        let mut data = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|_| VoltError::BufferAllocation { bytes })?;
        data.resize(bytes, 0);
        tracing::debug!(bytes, sample_rate, seconds, "allocated PCM buffer");
        Ok(Self {
            data: Arc::new(data),
            filled: 0,
            sample_rate,
        })
    }

    /// Buffer holding exactly these samples, marked as filled.
    pub fn from_samples(sample_rate: u32, samples: &[i16]) -> Self {
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let filled = data.len();
        Self {
            data: Arc::new(data),
            filled,
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes holding valid audio.
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn sample_count(&self) -> usize {
        self.filled / BYTES_PER_SAMPLE
    }

    /// Valid audio bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    /// Read-only handle to the valid audio, suitable for a `'static` upload body.
    pub fn shared(&self) -> SharedPcm {
        SharedPcm {
            data: Arc::clone(&self.data),
            len: self.filled,
        }
    }

    /// Mark the buffer empty without touching its storage.
    pub fn clear(&mut self) {
        self.filled = 0;
    }

    /// Exclusive access to the full storage for refilling.
    pub(crate) fn writable(&mut self) -> Result<&mut [u8]> {
        Arc::get_mut(&mut self.data)
            .map(Vec::as_mut_slice)
            .ok_or(VoltError::BufferBusy)
    }

    pub(crate) fn set_filled(&mut self, bytes: usize) {
        self.filled = bytes.min(self.data.len());
    }
}

/// Cheap clone of a [`PcmBuffer`]'s valid bytes.
#[derive(Debug, Clone)]
pub struct SharedPcm {
    data: Arc<Vec<u8>>,
    len: usize,
}

impl SharedPcm {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRef<[u8]> for SharedPcm {
    fn as_ref(&self) -> &[u8] {
        &self.data[..self.len]
    }
}
