//! Canonical 44-byte WAV framing for captured PCM.

use crate::audio::pcm::PcmBuffer;
use crate::error::{Result, VoltError};
use std::path::Path;

/// Length of the canonical PCM WAV header.
pub const WAV_HEADER_LEN: usize = 44;

/// Append-only writer over a fixed slice. Every write is length-checked.
pub struct ByteWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.remaining() {
            return Err(VoltError::BufferOverflow {
                needed: bytes.len(),
                available: self.remaining(),
            });
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    pub fn put_u16_le(&mut self, value: u16) -> Result<()> {
        self.put_bytes(&value.to_le_bytes())
    }

    pub fn put_u32_le(&mut self, value: u32) -> Result<()> {
        self.put_bytes(&value.to_le_bytes())
    }
}

/// Fields of a PCM WAV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub data_len: u32,
}

impl WavHeader {
    /// Mono 16-bit header for `data_len` bytes of PCM.
    pub fn pcm_mono16(sample_rate: u32, data_len: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
            data_len,
        }
    }

    /// Header for the valid contents of `pcm`.
    ///
    /// # Errors
    /// Returns `VoltError::BufferOverflow` if the audio does not fit a WAV size field.
    pub fn for_pcm(pcm: &PcmBuffer) -> Result<Self> {
        let data_len = u32::try_from(pcm.len())
            .ok()
            .filter(|len| len.checked_add(36).is_some())
            .ok_or(VoltError::BufferOverflow {
                needed: pcm.len(),
                available: (u32::MAX - 36) as usize,
            })?;
        Ok(Self::pcm_mono16(pcm.sample_rate(), data_len))
    }

    /// Value of the RIFF chunk size field, `None` if it does not fit in 32 bits.
    pub fn riff_len(&self) -> Option<u32> {
        self.data_len.checked_add(36)
    }

    pub fn block_align(&self) -> u16 {
        self.channels.saturating_mul(self.bits_per_sample / 8)
    }

    pub fn byte_rate(&self) -> Option<u32> {
        self.sample_rate.checked_mul(u32::from(self.block_align()))
    }

    /// Serialize the 44-byte header.
    ///
    /// # Errors
    /// Returns `VoltError::BufferOverflow` if a size field would overflow.
    pub fn to_bytes(&self) -> Result<[u8; WAV_HEADER_LEN]> {
        let overflow = || VoltError::BufferOverflow {
            needed: (self.data_len as usize).saturating_add(36),
            available: u32::MAX as usize,
        };
        let riff_len = self.riff_len().ok_or_else(overflow)?;
        let byte_rate = self.byte_rate().ok_or_else(overflow)?;

        let mut out = [0u8; WAV_HEADER_LEN];
        let mut w = ByteWriter::new(&mut out);
        w.put_bytes(b"RIFF")?;
        w.put_u32_le(riff_len)?;
        w.put_bytes(b"WAVE")?;
        w.put_bytes(b"fmt ")?;
        w.put_u32_le(16)?;
        w.put_u16_le(1)?;
        w.put_u16_le(self.channels)?;
        w.put_u32_le(self.sample_rate)?;
        w.put_u32_le(byte_rate)?;
        w.put_u16_le(self.block_align())?;
        w.put_u16_le(self.bits_per_sample)?;
        w.put_bytes(b"data")?;
        w.put_u32_le(self.data_len)?;
        debug_assert_eq!(w.position(), WAV_HEADER_LEN);
        Ok(out)
    }
}

/// Write the valid contents of `pcm` to a WAV file.
pub fn write_wav_file(path: &Path, pcm: &PcmBuffer) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: pcm.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(wav_io_error)?;
    for pair in pcm.as_bytes().chunks_exact(2) {
        writer
            .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
            .map_err(wav_io_error)?;
    }
    writer.finalize().map_err(wav_io_error)?;
    tracing::info!(path = %path.display(), bytes = pcm.len(), "wrote WAV file");
    Ok(())
}

fn wav_io_error(error: hound::Error) -> VoltError {
    match error {
        hound::Error::IoError(e) => VoltError::Io(e),
        other => VoltError::Io(std::io::Error::other(other.to_string())),
    }
}
