//! Streaming multipart/form-data body for the transcription upload.
//!
//! The body is produced in four segments (part headers, WAV header, PCM,
//! closing boundary) so the audio is never copied into a second buffer.

use crate::audio::pcm::{PcmBuffer, SharedPcm};
use crate::audio::wav::{WAV_HEADER_LEN, WavHeader};
use crate::defaults;
use crate::error::Result;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::fmt;
use std::io::{self, Read};

/// Candidates tried before accepting a boundary that collides with the payload.
const MAX_BOUNDARY_ATTEMPTS: usize = 8;

/// Multipart boundary token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary(String);

impl Boundary {
    /// Fixed prefix followed by random alphanumerics.
    pub fn generate() -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(defaults::BOUNDARY_RANDOM_LEN)
            .map(char::from)
            .collect();
        Self(format!("{}{}", defaults::BOUNDARY_PREFIX, suffix))
    }

    /// Generate a boundary that does not occur in any of `payloads`.
    pub fn generate_disjoint(payloads: &[&[u8]]) -> Self {
        let mut candidate = Self::generate();
        for attempt in 1..MAX_BOUNDARY_ATTEMPTS {
            if !payloads.iter().any(|p| candidate.occurs_in(p)) {
                return candidate;
            }
            tracing::debug!(attempt, "boundary collides with payload, regenerating");
            candidate = Self::generate();
        }
        candidate
    }

    /// Use a fixed token.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn occurs_in(&self, payload: &[u8]) -> bool {
        let needle = self.0.as_bytes();
        !needle.is_empty()
            && payload.len() >= needle.len()
            && payload.windows(needle.len()).any(|w| w == needle)
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `Read` implementation producing the full two-part form body.
pub struct MultipartUpload {
    boundary: Boundary,
    header: Vec<u8>,
    wav_header: [u8; WAV_HEADER_LEN],
    pcm: SharedPcm,
    footer: Vec<u8>,
    segment: usize,
    offset: usize,
}

impl MultipartUpload {
    /// Body with a `model` field and the contents of `pcm` as `audio.wav`.
    pub fn new(model: &str, pcm: &PcmBuffer) -> Result<Self> {
        let wav_header = WavHeader::for_pcm(pcm)?.to_bytes()?;
        let shared = pcm.shared();
        let boundary =
            Boundary::generate_disjoint(&[model.as_bytes(), &wav_header, shared.as_ref()]);
        Ok(Self::assemble(boundary, model, wav_header, shared))
    }

    /// Body using a fixed boundary.
    pub fn with_boundary(boundary: Boundary, model: &str, pcm: &PcmBuffer) -> Result<Self> {
        let wav_header = WavHeader::for_pcm(pcm)?.to_bytes()?;
        Ok(Self::assemble(boundary, model, wav_header, pcm.shared()))
    }

    fn assemble(
        boundary: Boundary,
        model: &str,
        wav_header: [u8; WAV_HEADER_LEN],
        pcm: SharedPcm,
    ) -> Self {
        let header = format!(
            "--{b}\r\n\
             Content-Disposition: form-data; name=\"model\"\r\n\r\n\
             {model}\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"audio.wav\"\r\n\
             Content-Type: audio/wav\r\n\r\n",
            b = boundary
        )
        .into_bytes();
        let footer = format!("\r\n--{}--\r\n", boundary).into_bytes();
        Self {
            boundary,
            header,
            wav_header,
            pcm,
            footer,
            segment: 0,
            offset: 0,
        }
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Exact body length: part headers + WAV header + PCM + closing boundary.
    pub fn content_length(&self) -> u64 {
        (self.header.len() + WAV_HEADER_LEN + self.pcm.len() + self.footer.len()) as u64
    }

    pub fn header_len(&self) -> usize {
        self.header.len()
    }

    pub fn footer_len(&self) -> usize {
        self.footer.len()
    }

    fn segment_bytes(&self) -> Option<&[u8]> {
        match self.segment {
            0 => Some(&self.header),
            1 => Some(&self.wav_header),
            2 => Some(self.pcm.as_ref()),
            3 => Some(&self.footer),
            _ => None,
        }
    }
}

impl Read for MultipartUpload {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let Some(segment) = self.segment_bytes() else {
                return Ok(0);
            };
            let rest = &segment[self.offset.min(segment.len())..];
            if rest.is_empty() {
                self.segment += 1;
                self.offset = 0;
                continue;
            }
            let n = rest.len().min(buf.len());
            buf[..n].copy_from_slice(&rest[..n]);
            self.offset += n;
            return Ok(n);
        }
    }
}
