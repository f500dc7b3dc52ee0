use crate::audio::pcm::PcmBuffer;
use crate::defaults;
use crate::error::{Result, Service, VoltError};
use crate::net::{HttpRequest, MultipartUpload, RequestBody};
use crate::services::{ServiceContext, classify_status};
use serde::Deserialize;
use std::time::Duration;

/// Response from the transcription endpoint.
#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionSettings {
    pub model: String,
    /// Overall request timeout.
    pub timeout: Duration,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            model: defaults::STT_MODEL.to_string(),
            timeout: Duration::from_millis(defaults::TRANSCRIBE_TIMEOUT_MS),
        }
    }
}

/// Uploads captured PCM as a WAV file and returns the recognized text.
pub struct TranscriptionClient {
    context: ServiceContext,
    settings: TranscriptionSettings,
}

impl TranscriptionClient {
    pub fn new(context: ServiceContext, settings: TranscriptionSettings) -> Self {
        Self { context, settings }
    }

    pub fn settings(&self) -> &TranscriptionSettings {
        &self.settings
    }

    /// Transcribe the valid contents of `pcm`.
    ///
    /// The multipart body is streamed straight from the buffer; nothing is
    /// concatenated. Returns the trimmed transcript, which may be empty if
    /// nothing was said.
    ///
    /// # Errors
    /// `EmptyInput` for an empty buffer and `NetworkUnavailable`/`Auth` from
    /// the preflight, all without socket activity. Non-200 statuses and bad
    /// bodies are classified per [`classify_status`].
    pub fn transcribe(&self, pcm: &PcmBuffer) -> Result<String> {
        if pcm.is_empty() {
            return Err(VoltError::EmptyInput {
                what: "audio recording",
            });
        }
        let api_key = self.context.preflight(Service::Transcription)?;

        let upload = MultipartUpload::new(&self.settings.model, pcm)?;
        let len = upload.content_length();
        tracing::debug!(
            audio_bytes = pcm.len(),
            body_bytes = len,
            model = %self.settings.model,
            "starting transcription upload"
        );

        let request = HttpRequest {
            url: self.context.url("/audio/transcriptions"),
            api_key,
            body: RequestBody::Stream {
                content_type: upload.content_type(),
                len,
                reader: Box::new(upload),
            },
            timeout: Some(self.settings.timeout),
        };

        let response = self.context.transport.post(request)?;
        let response = classify_status(Service::Transcription, response)?;
        let parsed: TranscriptionResponse =
            response.read_json(Service::Transcription, defaults::MAX_JSON_RESPONSE_BYTES)?;

        let text = parsed.text.trim().to_string();
        tracing::info!(chars = text.chars().count(), "transcription complete");
        Ok(text)
    }
}
