//! Error types for volt-voice.

use std::fmt;
use thiserror::Error;

/// Remote service an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Transcription,
    Chat,
    Speech,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Service::Transcription => "transcription",
            Service::Chat => "chat",
            Service::Speech => "speech synthesis",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum VoltError {
    // Pipeline failure taxonomy
    #[error("Network unavailable: {reason}")]
    NetworkUnavailable { reason: String },

    #[error("Authentication rejected by {service} service")]
    Auth { service: Service },

    #[error("Rate limited by {service} service")]
    RateLimited { service: Service },

    #[error("{service} service returned HTTP {status}")]
    Server { service: Service, status: u16 },

    #[error("Malformed {service} response: {message}")]
    MalformedResponse { service: Service, message: String },

    #[error("Audio hardware error: {message}")]
    Hardware { message: String },

    #[error("Timed out: {operation}")]
    Timeout { operation: String },

    #[error("Empty input: {what}")]
    EmptyInput { what: &'static str },

    // Resource errors
    #[error("Failed to allocate {bytes} byte audio buffer")]
    BufferAllocation { bytes: usize },

    #[error("Audio buffer is still shared with an upload in flight")]
    BufferBusy,

    #[error("Buffer overflow: needed {needed} bytes, {available} available")]
    BufferOverflow { needed: usize, available: usize },

    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`VoltError`], used for policy decisions and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NetworkUnavailable,
    Auth,
    RateLimited,
    Server,
    MalformedResponse,
    Hardware,
    Timeout,
    EmptyInput,
    Resource,
    Config,
    Io,
}

impl VoltError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VoltError::NetworkUnavailable { .. } => ErrorKind::NetworkUnavailable,
            VoltError::Auth { .. } => ErrorKind::Auth,
            VoltError::RateLimited { .. } => ErrorKind::RateLimited,
            VoltError::Server { .. } => ErrorKind::Server,
            VoltError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            VoltError::Hardware { .. } => ErrorKind::Hardware,
            VoltError::Timeout { .. } => ErrorKind::Timeout,
            VoltError::EmptyInput { .. } => ErrorKind::EmptyInput,
            VoltError::BufferAllocation { .. }
            | VoltError::BufferBusy
            | VoltError::BufferOverflow { .. } => ErrorKind::Resource,
            VoltError::ConfigParse { .. }
            | VoltError::ConfigInvalidValue { .. }
            | VoltError::Config(_) => ErrorKind::Config,
            VoltError::Io(_) => ErrorKind::Io,
        }
    }

    /// True for failures that may succeed on a later trigger without intervention.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NetworkUnavailable
                | ErrorKind::RateLimited
                | ErrorKind::Server
                | ErrorKind::MalformedResponse
                | ErrorKind::Timeout
                | ErrorKind::Hardware
        )
    }

    /// True for failures that persist until something outside the pipeline changes.
    pub fn is_persistent(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }

    pub(crate) fn hardware(message: impl Into<String>) -> Self {
        VoltError::Hardware {
            message: message.into(),
        }
    }

    pub(crate) fn timeout(operation: impl Into<String>) -> Self {
        VoltError::Timeout {
            operation: operation.into(),
        }
    }

    pub(crate) fn malformed(service: Service, message: impl Into<String>) -> Self {
        VoltError::MalformedResponse {
            service,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VoltError>;
