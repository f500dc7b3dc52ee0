use crate::audio::duplex::DuplexSettings;
use crate::audio::player::PlayerConfig;
use crate::audio::recorder::RecorderConfig;
use crate::defaults;
use crate::error::{Result, VoltError};
use crate::net::TransportSettings;
use crate::services::{ChatSettings, SpeechSettings, TranscriptionSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub api: ApiConfig,
    pub stt: SttConfig,
    pub chat: ChatConfig,
    pub tts: TtsConfig,
    pub persona: PersonaConfig,
    pub pipeline: PipelineConfig,
}

/// Audio peripheral configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub playback_sample_rate: u32,
    pub record_seconds: u32,
    pub read_chunk_bytes: usize,
    pub settle_bytes: usize,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// Host input device (desktop driver only)
    pub device: Option<String>,
    /// Host output device (desktop driver only)
    pub output_device: Option<String>,
}

/// Remote API connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Usually supplied through `VOLT_API_KEY` rather than the file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub organization: Option<String>,
    pub project: Option<String>,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    pub model: String,
}

/// Language model configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    pub enabled: bool,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub turn_budget: u32,
    pub closing_message: String,
}

/// Text-to-speech configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsConfig {
    pub model: String,
    pub voice: String,
    pub speed: f32,
    pub response_format: String,
    pub chunk_bytes: usize,
    pub idle_timeout_ms: u64,
}

/// Assistant persona used to build the system prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PersonaConfig {
    pub name: String,
    pub child_name: String,
    pub child_age: u32,
    /// Template with `{name}`, `{child_name}` and `{child_age}` placeholders
    pub system_prompt: String,
    pub content_filter: bool,
    pub offline_message: String,
}

/// Per-stage timeouts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Added to the recording length to get the capture hard timeout
    pub record_timeout_slack_ms: u64,
    pub transcribe_timeout_ms: u64,
    pub chat_timeout_ms: u64,
    pub speak_timeout_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            playback_sample_rate: defaults::PLAYBACK_SAMPLE_RATE,
            record_seconds: defaults::RECORD_SECONDS,
            read_chunk_bytes: defaults::READ_CHUNK_BYTES,
            settle_bytes: defaults::SETTLE_BYTES,
            read_timeout_ms: defaults::AUDIO_READ_TIMEOUT_MS,
            write_timeout_ms: defaults::AUDIO_WRITE_TIMEOUT_MS,
            device: None,
            output_device: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::API_BASE_URL.to_string(),
            key: None,
            organization: None,
            project: None,
            connect_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
            read_timeout_ms: defaults::SOCKET_READ_TIMEOUT_MS,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: defaults::STT_MODEL.to_string(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: defaults::CHAT_MODEL.to_string(),
            temperature: defaults::TEMPERATURE,
            max_tokens: defaults::MAX_TOKENS,
            turn_budget: defaults::TURN_BUDGET,
            closing_message: defaults::CLOSING_MESSAGE.to_string(),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            model: defaults::TTS_MODEL.to_string(),
            voice: defaults::TTS_VOICE.to_string(),
            speed: defaults::TTS_SPEED,
            response_format: defaults::TTS_FORMAT.to_string(),
            chunk_bytes: defaults::STREAM_CHUNK_BYTES,
            idle_timeout_ms: defaults::STREAM_IDLE_TIMEOUT_MS,
        }
    }
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: defaults::ASSISTANT_NAME.to_string(),
            child_name: "friend".to_string(),
            child_age: 8,
            system_prompt: defaults::SYSTEM_PROMPT.to_string(),
            content_filter: true,
            offline_message: defaults::OFFLINE_MESSAGE.to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            record_timeout_slack_ms: defaults::RECORD_TIMEOUT_SLACK_MS,
            transcribe_timeout_ms: defaults::TRANSCRIBE_TIMEOUT_MS,
            chat_timeout_ms: defaults::CHAT_TIMEOUT_MS,
            speak_timeout_ms: defaults::SPEAK_TIMEOUT_MS,
        }
    }
}

fn invalid(key: &str, message: impl Into<String>) -> VoltError {
    VoltError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

fn check_chunk(key: &str, bytes: usize) -> Result<()> {
    if bytes == 0 || bytes % 2 != 0 {
        return Err(invalid(key, format!("{bytes} must be even and greater than 0")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values. The result is not validated.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file, or return defaults if the file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(VoltError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOLT_API_KEY → api.key
    /// - VOLT_STT_MODEL → stt.model
    /// - VOLT_CHAT_MODEL → chat.model
    /// - VOLT_VOICE → tts.voice
    /// - VOLT_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("VOLT_API_KEY")
            && !key.is_empty()
        {
            self.api.key = Some(key);
        }

        if let Ok(model) = std::env::var("VOLT_STT_MODEL")
            && !model.is_empty()
        {
            self.stt.model = model;
        }

        if let Ok(model) = std::env::var("VOLT_CHAT_MODEL")
            && !model.is_empty()
        {
            self.chat.model = model;
        }

        if let Ok(voice) = std::env::var("VOLT_VOICE")
            && !voice.is_empty()
        {
            self.tts.voice = voice;
        }

        if let Ok(device) = std::env::var("VOLT_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/volt/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("volt")
            .join("config.toml")
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be greater than 0"));
        }
        if self.audio.playback_sample_rate == 0 {
            return Err(invalid("audio.playback_sample_rate", "must be greater than 0"));
        }
        if !(1..=defaults::MAX_RECORD_SECONDS).contains(&self.audio.record_seconds) {
            return Err(invalid(
                "audio.record_seconds",
                format!(
                    "{} is outside 1..={}",
                    self.audio.record_seconds,
                    defaults::MAX_RECORD_SECONDS
                ),
            ));
        }
        check_chunk("audio.read_chunk_bytes", self.audio.read_chunk_bytes)?;
        check_chunk("tts.chunk_bytes", self.tts.chunk_bytes)?;

        if !(0.0..=2.0).contains(&self.chat.temperature) {
            return Err(invalid(
                "chat.temperature",
                format!("{} is outside 0.0..=2.0", self.chat.temperature),
            ));
        }
        if self.chat.max_tokens == 0 {
            return Err(invalid("chat.max_tokens", "must be greater than 0"));
        }
        if self.chat.turn_budget == 0 {
            return Err(invalid("chat.turn_budget", "must be greater than 0"));
        }
        if !(0.25..=4.0).contains(&self.tts.speed) {
            return Err(invalid(
                "tts.speed",
                format!("{} is outside 0.25..=4.0", self.tts.speed),
            ));
        }
        if self.tts.response_format != "pcm" {
            return Err(invalid(
                "tts.response_format",
                format!("{:?} cannot be played without decoding; use \"pcm\"", self.tts.response_format),
            ));
        }
        if !(self.api.base_url.starts_with("https://") || self.api.base_url.starts_with("http://")) {
            return Err(invalid("api.base_url", "must be an http(s) URL"));
        }
        Ok(())
    }

    /// Serialize to TOML. The API key is left out.
    pub fn to_toml(&self) -> Result<String> {
        let mut redacted = self.clone();
        redacted.api.key = None;
        toml::to_string_pretty(&redacted).map_err(|e| VoltError::ConfigParse {
            message: e.to_string(),
        })
    }

    pub fn duplex_settings(&self) -> DuplexSettings {
        let mut settings =
            DuplexSettings::new(self.audio.sample_rate, self.audio.playback_sample_rate);
        settings.settle_bytes = self.audio.settle_bytes;
        settings.io_timeout = Duration::from_millis(self.audio.write_timeout_ms);
        settings
    }

    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            chunk_bytes: self.audio.read_chunk_bytes,
            read_timeout: Duration::from_millis(self.audio.read_timeout_ms),
            timeout_slack: Duration::from_millis(self.pipeline.record_timeout_slack_ms),
        }
    }

    pub fn player_config(&self) -> PlayerConfig {
        PlayerConfig {
            chunk_bytes: self.tts.chunk_bytes,
            idle_timeout: Duration::from_millis(self.tts.idle_timeout_ms),
            poll_interval: Duration::from_millis(defaults::STREAM_POLL_INTERVAL_MS),
            write_timeout: Duration::from_millis(self.audio.write_timeout_ms),
        }
    }

    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            connect_timeout: Duration::from_millis(self.api.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.api.read_timeout_ms),
            organization: self.api.organization.clone(),
            project: self.api.project.clone(),
        }
    }

    /// Transport for the speech stream. Each body read gives up after the
    /// playback idle timeout so a stalled stream ends on that interval.
    pub fn speech_transport_settings(&self) -> TransportSettings {
        TransportSettings {
            read_timeout: Duration::from_millis(self.tts.idle_timeout_ms),
            ..self.transport_settings()
        }
    }

    pub fn transcription_settings(&self) -> TranscriptionSettings {
        TranscriptionSettings {
            model: self.stt.model.clone(),
            timeout: Duration::from_millis(self.pipeline.transcribe_timeout_ms),
        }
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            model: self.chat.model.clone(),
            temperature: self.chat.temperature,
            max_tokens: self.chat.max_tokens,
            timeout: Duration::from_millis(self.pipeline.chat_timeout_ms),
            closing_message: self.chat.closing_message.clone(),
        }
    }

    pub fn speech_settings(&self) -> SpeechSettings {
        SpeechSettings {
            model: self.tts.model.clone(),
            voice: self.tts.voice.clone(),
            speed: self.tts.speed,
            response_format: self.tts.response_format.clone(),
            timeout: Duration::from_millis(self.pipeline.speak_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_volt_env() {
        for key in [
            "VOLT_API_KEY",
            "VOLT_STT_MODEL",
            "VOLT_CHAT_MODEL",
            "VOLT_VOICE",
            "VOLT_AUDIO_DEVICE",
        ] {
            remove_env(key);
        }
    }

    fn write_config(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.playback_sample_rate, 24000);
        assert_eq!(config.audio.record_seconds, 5);
        assert_eq!(config.audio.device, None);
        assert_eq!(config.api.base_url, "https://api.openai.com/v1");
        assert_eq!(config.stt.model, "whisper-1");
        assert_eq!(config.chat.model, "gpt-4o-mini");
        assert_eq!(config.chat.max_tokens, 150);
        assert_eq!(config.chat.turn_budget, 10);
        assert_eq!(config.tts.voice, "echo");
        assert_eq!(config.tts.response_format, "pcm");
        assert_eq!(config.tts.chunk_bytes, 512);
        assert_eq!(config.persona.name, "VOLT");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let file = write_config(
            r#"
            [audio]
            record_seconds = 8
            device = "pulse"

            [api]
            organization = "org-123"

            [chat]
            model = "gpt-4o"
            temperature = 0.2
            turn_budget = 3

            [tts]
            voice = "nova"
            speed = 1.5

            [persona]
            child_name = "Stone"
            child_age = 10
            content_filter = false

            [pipeline]
            chat_timeout_ms = 5000
        "#,
        );

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.audio.record_seconds, 8);
        assert_eq!(config.audio.device.as_deref(), Some("pulse"));
        assert_eq!(config.api.organization.as_deref(), Some("org-123"));
        assert_eq!(config.chat.model, "gpt-4o");
        assert_eq!(config.chat.turn_budget, 3);
        assert_eq!(config.tts.voice, "nova");
        assert_eq!(config.persona.child_name, "Stone");
        assert!(!config.persona.content_filter);
        assert_eq!(config.chat_settings().timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = write_config(
            r#"
            [stt]
            model = "whisper-2"
        "#,
        );

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.stt.model, "whisper-2");
        assert_eq!(config.audio, AudioConfig::default());
        assert_eq!(config.chat, ChatConfig::default());
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn test_env_override_api_key_and_models() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_volt_env();

        set_env("VOLT_API_KEY", "sk-env-0123456789");
        set_env("VOLT_STT_MODEL", "whisper-x");
        set_env("VOLT_CHAT_MODEL", "gpt-x");
        set_env("VOLT_VOICE", "alloy");
        set_env("VOLT_AUDIO_DEVICE", "hw:1,0");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.api.key.as_deref(), Some("sk-env-0123456789"));
        assert_eq!(config.stt.model, "whisper-x");
        assert_eq!(config.chat.model, "gpt-x");
        assert_eq!(config.tts.voice, "alloy");
        assert_eq!(config.audio.device.as_deref(), Some("hw:1,0"));

        clear_volt_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_volt_env();

        set_env("VOLT_CHAT_MODEL", "");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.chat.model, "gpt-4o-mini");

        clear_volt_env();
    }

    #[test]
    fn test_invalid_toml_returns_config_error() {
        let file = write_config(
            r#"
            [audio
            device = "broken
        "#,
        );

        match Config::load(file.path()) {
            Err(VoltError::Config(_)) => {}
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("missing.toml")).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_rejects_invalid_toml() {
        let file = write_config("[chat\n");
        assert!(Config::load_or_default(file.path()).is_err());
    }

    #[test]
    fn test_default_path_ends_with_volt_config() {
        let path = Config::default_path();
        assert!(path.ends_with("volt/config.toml"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let cases: [(&str, fn(&mut Config)); 10] = [
            ("audio.record_seconds", |c| c.audio.record_seconds = 0),
            ("audio.record_seconds", |c| c.audio.record_seconds = 31),
            ("audio.sample_rate", |c| c.audio.sample_rate = 0),
            ("audio.read_chunk_bytes", |c| c.audio.read_chunk_bytes = 1023),
            ("tts.chunk_bytes", |c| c.tts.chunk_bytes = 0),
            ("chat.temperature", |c| c.chat.temperature = 2.5),
            ("chat.turn_budget", |c| c.chat.turn_budget = 0),
            ("tts.speed", |c| c.tts.speed = 0.1),
            ("tts.response_format", |c| c.tts.response_format = "mp3".into()),
            ("api.base_url", |c| c.api.base_url = "ftp://x".into()),
        ];

        for (expected_key, mutate) in cases {
            let mut config = Config::default();
            mutate(&mut config);
            match config.validate() {
                Err(VoltError::ConfigInvalidValue { key, .. }) => assert_eq!(key, expected_key),
                other => panic!("Expected invalid {}, got {:?}", expected_key, other),
            }
        }
    }

    #[test]
    fn test_to_toml_round_trips_without_key() {
        let mut config = Config::default();
        config.api.key = Some("sk-secret-0123456789".to_string());
        config.persona.child_name = "Stone".to_string();

        let text = config.to_toml().unwrap();
        assert!(!text.contains("sk-secret"));

        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.persona.child_name, "Stone");
        assert_eq!(parsed.api.key, None);
    }

    #[test]
    fn test_derived_component_settings() {
        let mut config = Config::default();
        config.audio.settle_bytes = 400;
        config.tts.idle_timeout_ms = 2000;

        assert_eq!(config.duplex_settings().settle_bytes, 400);
        assert_eq!(config.duplex_settings().playback.sample_rate, 24000);
        assert_eq!(config.player_config().idle_timeout, Duration::from_secs(2));
        assert_eq!(config.recorder_config().chunk_bytes, 1024);
        assert_eq!(config.transcription_settings().model, "whisper-1");
        assert_eq!(config.speech_settings().voice, "echo");
        assert_eq!(
            config.transport_settings().connect_timeout,
            Duration::from_secs(10)
        );
    }
}
