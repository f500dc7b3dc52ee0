//! Clients for the three remote services: transcription, chat and speech synthesis.
//!
//! Each client makes at most one network attempt per call. Preconditions
//! (link up, usable API key, non-empty input) are checked before any socket
//! activity.

pub mod chat;
pub mod stt;
pub mod tts;

pub use chat::{ChatReply, ChatSettings, ConversationClient};
pub use stt::{TranscriptionClient, TranscriptionSettings};
pub use tts::{SpeechSettings, SpeechSynthesisClient};

use crate::defaults;
use crate::error::{Result, Service, VoltError};
use crate::net::{HttpResponse, HttpTransport};
use crate::pipeline::collaborators::{CredentialStore, NetworkStatus};
use std::sync::Arc;

/// Shared handles every service client needs.
#[derive(Clone)]
pub struct ServiceContext {
    pub transport: Arc<dyn HttpTransport>,
    pub network: Arc<dyn NetworkStatus>,
    pub credentials: Arc<dyn CredentialStore>,
    pub api_base: String,
}

impl ServiceContext {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        network: Arc<dyn NetworkStatus>,
        credentials: Arc<dyn CredentialStore>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            network,
            credentials,
            api_base: api_base.into(),
        }
    }

    /// Absolute URL for an endpoint path such as `/chat/completions`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base.trim_end_matches('/'), path)
    }

    /// Check the link and return a usable API key.
    ///
    /// Keys shorter than the minimum length count as missing and are
    /// reported as `Auth` for `service`.
    pub fn preflight(&self, service: Service) -> Result<String> {
        if !self.network.is_connected() {
            return Err(VoltError::NetworkUnavailable {
                reason: "network link is down".to_string(),
            });
        }
        match self.credentials.api_key() {
            Some(key) if key.trim().len() >= defaults::MIN_API_KEY_LEN => {
                Ok(key.trim().to_string())
            }
            _ => {
                tracing::warn!(%service, "API key missing or too short");
                Err(VoltError::Auth { service })
            }
        }
    }
}

/// Map a response status to the failure taxonomy. Only 200 passes.
pub fn classify_status(service: Service, response: HttpResponse) -> Result<HttpResponse> {
    let status = response.status;
    if status == 200 {
        return Ok(response);
    }
    let excerpt = response.error_excerpt(512);
    tracing::warn!(%service, status, body = %excerpt, "service returned an error");
    Err(match status {
        401 => VoltError::Auth { service },
        429 => VoltError::RateLimited { service },
        _ => VoltError::Server { service, status },
    })
}
