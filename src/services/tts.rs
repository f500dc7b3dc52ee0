use crate::audio::driver::I2sDriver;
use crate::audio::duplex::AudioDuplexController;
use crate::audio::player::{PlaybackReport, Player};
use crate::clock::Clock;
use crate::defaults;
use crate::error::{Result, Service, VoltError};
use crate::net::{HttpRequest, HttpResponse};
use crate::services::{ServiceContext, classify_status};
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
    speed: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechSettings {
    pub model: String,
    pub voice: String,
    pub speed: f32,
    /// Must be a raw PCM format; the stream goes to the speaker undecoded.
    pub response_format: String,
    /// Bound on the whole speak call, checked at chunk boundaries.
    pub timeout: Duration,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            model: defaults::TTS_MODEL.to_string(),
            voice: defaults::TTS_VOICE.to_string(),
            speed: defaults::TTS_SPEED,
            response_format: defaults::TTS_FORMAT.to_string(),
            timeout: Duration::from_millis(defaults::SPEAK_TIMEOUT_MS),
        }
    }
}

/// Requests synthesized speech and streams it to the speaker as it arrives.
pub struct SpeechSynthesisClient {
    context: ServiceContext,
    settings: SpeechSettings,
}

impl SpeechSynthesisClient {
    pub fn new(context: ServiceContext, settings: SpeechSettings) -> Self {
        Self { context, settings }
    }

    pub fn settings(&self) -> &SpeechSettings {
        &self.settings
    }

    /// Speak `text`.
    ///
    /// Playback is acquired only after a 200 response head, so a failed
    /// request never powers the amplifier. The body is consumed through the
    /// player's fixed buffer and playback is released (silence flush,
    /// amplifier off) whether or not streaming succeeded.
    pub fn speak<D: I2sDriver, C: Clock>(
        &self,
        text: &str,
        audio: &mut AudioDuplexController<D>,
        player: &mut Player<C>,
    ) -> Result<PlaybackReport> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VoltError::EmptyInput {
                what: "speech text",
            });
        }
        let api_key = self.context.preflight(Service::Speech)?;

        let payload = SpeechRequest {
            model: &self.settings.model,
            input: text,
            voice: &self.settings.voice,
            response_format: &self.settings.response_format,
            speed: self.settings.speed,
        };
        // A request timeout would cap the whole stream. The transport's read
        // timeout and the player deadline bound it instead.
        let request = HttpRequest::json(self.context.url("/audio/speech"), api_key, &payload, None)?;

        let deadline = player.deadline_in(self.settings.timeout);
        tracing::debug!(voice = %self.settings.voice, chars = text.len(), "requesting speech");
        let response = self.context.transport.post(request)?;
        let HttpResponse {
            content_length,
            mut body,
            ..
        } = classify_status(Service::Speech, response)?;

        let mut token = audio.acquire_playback()?;
        let played = player.play(&mut token, &mut body, content_length, Some(deadline));
        let released = token.release();

        let report = played?;
        released?;
        tracing::info!(
            bytes = report.bytes_played,
            chunks = report.chunks,
            ended_by = ?report.ended_by,
            "speech playback complete"
        );
        Ok(report)
    }
}
