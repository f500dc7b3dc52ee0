use crate::error::{Result, Service, VoltError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

/// Body of an outgoing POST.
pub enum RequestBody {
    /// Serialized JSON document.
    Json(Vec<u8>),
    /// Sized body produced incrementally by a reader.
    Stream {
        content_type: String,
        len: u64,
        reader: Box<dyn Read + Send>,
    },
}

impl RequestBody {
    pub fn content_type(&self) -> &str {
        match self {
            RequestBody::Json(_) => "application/json",
            RequestBody::Stream { content_type, .. } => content_type,
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            RequestBody::Json(bytes) => bytes.len() as u64,
            RequestBody::Stream { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Json(bytes) => f.debug_tuple("Json").field(&bytes.len()).finish(),
            RequestBody::Stream {
                content_type, len, ..
            } => f
                .debug_struct("Stream")
                .field("content_type", content_type)
                .field("len", len)
                .finish_non_exhaustive(),
        }
    }
}

/// One authenticated POST to a remote service.
#[derive(Debug)]
pub struct HttpRequest {
    pub url: String,
    /// Sent as `Authorization: Bearer <api_key>`.
    pub api_key: String,
    pub body: RequestBody,
    /// Overall timeout. `None` leaves only the per-read socket timeout.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Build a JSON request.
    pub fn json<T: Serialize>(
        url: impl Into<String>,
        api_key: impl Into<String>,
        payload: &T,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let body = serde_json::to_vec(payload).map_err(|e| VoltError::Io(e.into()))?;
        Ok(Self {
            url: url.into(),
            api_key: api_key.into(),
            body: RequestBody::Json(body),
            timeout,
        })
    }
}

/// Response head plus a streaming body.
pub struct HttpResponse {
    pub status: u16,
    /// `None` for chunked or close-delimited bodies.
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    /// Read at most `limit` bytes and parse them as JSON.
    ///
    /// # Errors
    /// Oversized or unparseable bodies are `MalformedResponse`; a body read
    /// timeout is `Timeout`.
    pub fn read_json<T: DeserializeOwned>(self, service: Service, limit: u64) -> Result<T> {
        let mut buf = Vec::new();
        self.body
            .take(limit + 1)
            .read_to_end(&mut buf)
            .map_err(|e| body_read_error(service, e))?;
        if buf.len() as u64 > limit {
            return Err(VoltError::malformed(
                service,
                format!("response exceeds {limit} bytes"),
            ));
        }
        serde_json::from_slice(&buf).map_err(|e| VoltError::malformed(service, e.to_string()))
    }

    /// Best-effort read of a short error body for logging.
    pub fn error_excerpt(self, max: u64) -> String {
        let mut buf = Vec::new();
        match self.body.take(max).read_to_end(&mut buf) {
            Ok(_) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => String::new(),
        }
    }
}

fn body_read_error(service: Service, error: std::io::Error) -> VoltError {
    if super::is_timeout(&error) {
        VoltError::timeout(format!("reading {service} response"))
    } else {
        VoltError::NetworkUnavailable {
            reason: format!("{service} response interrupted: {error}"),
        }
    }
}

/// Seam between the service clients and the network stack.
pub trait HttpTransport: Send + Sync {
    /// Send a POST and return once the response head has arrived.
    ///
    /// # Errors
    /// Connect failures are `NetworkUnavailable`, expired timeouts are `Timeout`.
    fn post(&self, request: HttpRequest) -> Result<HttpResponse>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    fn post(&self, request: HttpRequest) -> Result<HttpResponse> {
        (**self).post(request)
    }
}

impl<T: HttpTransport + ?Sized> HttpTransport for Box<T> {
    fn post(&self, request: HttpRequest) -> Result<HttpResponse> {
        (**self).post(request)
    }
}
