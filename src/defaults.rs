//! Default configuration constants for volt-voice.
//!
//! Shared by the configuration types and the pipeline components so that the
//! same numbers are never spelled twice.

/// Capture sample rate in Hz.
///
/// 16kHz mono is what the speech-recognition service expects and keeps the
/// capture buffer small enough for a wearable.
pub const SAMPLE_RATE: u32 = 16000;

/// Bytes per PCM sample (16-bit signed, mono).
pub const BYTES_PER_SAMPLE: usize = 2;

/// Default length of one voice recording in seconds.
pub const RECORD_SECONDS: u32 = 5;

/// Longest recording the capture buffer may be sized for.
pub const MAX_RECORD_SECONDS: u32 = 30;

/// Bytes requested from the peripheral per capture read.
pub const READ_CHUNK_BYTES: usize = 1024;

/// Bytes discarded after capture start to drop microphone start-up noise.
pub const SETTLE_BYTES: usize = 200;

/// Timeout for a single peripheral read in milliseconds.
pub const AUDIO_READ_TIMEOUT_MS: u64 = 500;

/// Timeout for a single peripheral write in milliseconds.
pub const AUDIO_WRITE_TIMEOUT_MS: u64 = 500;

/// Extra time granted on top of the recording length before the recorder gives up.
pub const RECORD_TIMEOUT_SLACK_MS: u64 = 2000;

/// Number of DMA buffers configured on the peripheral.
pub const DMA_BUFFER_COUNT: usize = 8;

/// Frames per DMA buffer.
pub const DMA_BUFFER_FRAMES: usize = 1024;

/// Size of the fixed chunk used to move synthesized audio from socket to speaker.
pub const STREAM_CHUNK_BYTES: usize = 512;

/// Interval without incoming audio after which the speech stream is considered finished.
pub const STREAM_IDLE_TIMEOUT_MS: u64 = 10_000;

/// Sleep between polls when the speech stream has no bytes ready.
pub const STREAM_POLL_INTERVAL_MS: u64 = 10;

/// Sample rate of raw PCM returned by the speech-synthesis service.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Base URL of the remote speech and chat services.
pub const API_BASE_URL: &str = "https://api.openai.com/v1";

/// Socket connect timeout in milliseconds.
pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Per-read socket timeout in milliseconds.
pub const SOCKET_READ_TIMEOUT_MS: u64 = 15_000;

/// Overall timeout of the transcription request in milliseconds.
pub const TRANSCRIBE_TIMEOUT_MS: u64 = 15_000;

/// Overall timeout of the chat request in milliseconds.
pub const CHAT_TIMEOUT_MS: u64 = 20_000;

/// Overall timeout of speech playback in milliseconds.
pub const SPEAK_TIMEOUT_MS: u64 = 60_000;

/// Speech-to-text model name.
pub const STT_MODEL: &str = "whisper-1";

/// Chat model name.
pub const CHAT_MODEL: &str = "gpt-4o-mini";

/// Maximum tokens in a chat reply. Keeps answers short enough to speak.
pub const MAX_TOKENS: u32 = 150;

/// Chat sampling temperature.
pub const TEMPERATURE: f32 = 0.7;

/// Completed exchanges allowed before the conversation closes.
pub const TURN_BUDGET: u32 = 10;

/// Text-to-speech model name.
pub const TTS_MODEL: &str = "tts-1";

/// Text-to-speech voice.
pub const TTS_VOICE: &str = "echo";

/// Text-to-speech speaking rate.
pub const TTS_SPEED: f32 = 1.08;

/// Raw PCM so the stream can go to the speaker without decoding.
pub const TTS_FORMAT: &str = "pcm";

/// API keys shorter than this are treated as missing.
pub const MIN_API_KEY_LEN: usize = 10;

/// Prefix of every multipart boundary token.
pub const BOUNDARY_PREFIX: &str = "----VoltFormBoundary";

/// Random characters appended to the boundary prefix.
pub const BOUNDARY_RANDOM_LEN: usize = 24;

/// Replies longer than this are not accepted from the JSON services.
pub const MAX_JSON_RESPONSE_BYTES: u64 = 64 * 1024;

/// Assistant name used in the persona prompt.
pub const ASSISTANT_NAME: &str = "VOLT";

/// Spoken when the turn budget is exhausted.
pub const CLOSING_MESSAGE: &str =
    "That's enough chatting for now. Let's take a break and talk again later!";

/// Shown when a turn cannot be completed.
pub const OFFLINE_MESSAGE: &str =
    "{name} is offline right now. Try the breathing exercise or a joke!";

/// System prompt template. `{name}`, `{child_name}` and `{child_age}` are substituted.
pub const SYSTEM_PROMPT: &str = "You are {name}, a caring AI companion watch. \
    You speak warmly and encouragingly to {child_name}. \
    Keep responses short (2-3 sentences max). \
    Be supportive, kind, and age-appropriate for a {child_age} year old. \
    Use simple language and be positive.";

/// Appended to the system prompt when the content filter is enabled.
pub const CONTENT_FILTER_PROMPT: &str = "Never discuss violence, weapons, adult content, \
    or anything frightening. If asked, gently change the subject to something fun and safe.";

/// Capture pins: bit clock, word select, data in.
pub const CAPTURE_PINS: (u8, u8, u8) = (5, 4, 6);

/// Playback pins: bit clock, word select, data out.
pub const PLAYBACK_PINS: (u8, u8, u8) = (15, 16, 7);
