//! Scripted transport for tests and dry runs.

use crate::error::{Result, VoltError};
use crate::net::transport::{HttpRequest, HttpResponse, HttpTransport, RequestBody};
use std::io::{self, Cursor, Read};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Canned reply for one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// JSON (or any text) body with the given status.
    Json { status: u16, body: String },
    /// `len` bytes of `byte`, streamed. `chunked` hides the content length.
    Audio { len: u64, chunked: bool, byte: u8 },
    /// `bytes` of audio followed by a body that never produces more data.
    Stall { bytes: u64 },
    /// The connect attempt times out.
    ConnectTimeout,
    /// The host is unreachable.
    Offline,
}

impl MockReply {
    /// 200 with a JSON body.
    pub fn ok_json(value: serde_json::Value) -> Self {
        MockReply::Json {
            status: 200,
            body: value.to_string(),
        }
    }

    /// Status code with an OpenAI-style error body.
    pub fn status(status: u16) -> Self {
        MockReply::Json {
            status,
            body: r#"{"error":{"message":"mock error"}}"#.to_string(),
        }
    }

    /// 200 with a transcription result.
    pub fn transcript(text: &str) -> Self {
        Self::ok_json(serde_json::json!({ "text": text }))
    }

    /// 200 with a chat completion whose first choice says `content`.
    pub fn chat(content: &str) -> Self {
        Self::ok_json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        }))
    }

    /// 200 with `len` bytes of audio of known length.
    pub fn audio(len: u64) -> Self {
        MockReply::Audio {
            len,
            chunked: false,
            byte: 0x10,
        }
    }

    /// 200 with `len` bytes of chunked audio.
    pub fn chunked_audio(len: u64) -> Self {
        MockReply::Audio {
            len,
            chunked: true,
            byte: 0x10,
        }
    }
}

/// A request as seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub url: String,
    pub api_key: String,
    pub content_type: String,
    /// Length declared by the body.
    pub declared_len: u64,
    /// Bytes actually produced by the body.
    pub body: Vec<u8>,
    pub timeout: Option<Duration>,
}

impl RecordedRequest {
    /// Body parsed as JSON, if it is JSON.
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Reader that never has data ready.
struct StalledBody;

impl Read for StalledBody {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::WouldBlock))
    }
}

/// Transport that answers from a route table keyed by URL suffix and records
/// every request it receives.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Vec<(String, MockReply)>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests whose URL ends with `suffix`. Later routes win.
    pub fn with_route(mut self, suffix: &str, reply: MockReply) -> Self {
        self.routes.push((suffix.to_string(), reply));
        self
    }

    pub fn with_transcription(self, reply: MockReply) -> Self {
        self.with_route("/audio/transcriptions", reply)
    }

    pub fn with_chat(self, reply: MockReply) -> Self {
        self.with_route("/chat/completions", reply)
    }

    pub fn with_speech(self, reply: MockReply) -> Self {
        self.with_route("/audio/speech", reply)
    }

    fn recorded(&self) -> MutexGuard<'_, Vec<RecordedRequest>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorded().clone()
    }

    pub fn request_count(&self) -> usize {
        self.recorded().len()
    }

    /// Number of requests whose URL ends with `suffix`.
    pub fn count_for(&self, suffix: &str) -> usize {
        self.recorded()
            .iter()
            .filter(|r| r.url.ends_with(suffix))
            .count()
    }

    /// Most recent request whose URL ends with `suffix`.
    pub fn last_for(&self, suffix: &str) -> Option<RecordedRequest> {
        self.recorded()
            .iter()
            .rev()
            .find(|r| r.url.ends_with(suffix))
            .cloned()
    }

    fn reply_for(&self, url: &str) -> Option<&MockReply> {
        self.routes
            .iter()
            .rev()
            .find(|(suffix, _)| url.ends_with(suffix.as_str()))
            .map(|(_, reply)| reply)
    }
}

impl HttpTransport for MockTransport {
    fn post(&self, request: HttpRequest) -> Result<HttpResponse> {
        let content_type = request.body.content_type().to_string();
        let declared_len = request.body.len();
        let body = match request.body {
            RequestBody::Json(bytes) => bytes,
            RequestBody::Stream { mut reader, .. } => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                bytes
            }
        };
        self.recorded().push(RecordedRequest {
            url: request.url.clone(),
            api_key: request.api_key,
            content_type,
            declared_len,
            body,
            timeout: request.timeout,
        });

        let reply = self
            .reply_for(&request.url)
            .cloned()
            .unwrap_or_else(|| MockReply::status(404));

        match reply {
            MockReply::Json { status, body } => Ok(HttpResponse {
                status,
                content_length: Some(body.len() as u64),
                body: Box::new(Cursor::new(body.into_bytes())),
            }),
            MockReply::Audio { len, chunked, byte } => Ok(HttpResponse {
                status: 200,
                content_length: (!chunked).then_some(len),
                body: Box::new(io::repeat(byte).take(len)),
            }),
            MockReply::Stall { bytes } => Ok(HttpResponse {
                status: 200,
                content_length: None,
                body: Box::new(io::repeat(0x10).take(bytes).chain(StalledBody)),
            }),
            MockReply::ConnectTimeout => Err(VoltError::timeout(format!("POST {}", request.url))),
            MockReply::Offline => Err(VoltError::NetworkUnavailable {
                reason: format!("connect to {} failed: host unreachable", request.url),
            }),
        }
    }
}
