use crate::defaults;
use crate::error::{Result, VoltError};
use crate::net::transport::{HttpRequest, HttpResponse, HttpTransport, RequestBody};
use reqwest::blocking::{Body, Client};
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

/// Connection settings for [`ReqwestTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    pub connect_timeout: Duration,
    /// Applied to each socket read, including every body read while streaming.
    pub read_timeout: Duration,
    /// Sent as `OpenAI-Organization` when set.
    pub organization: Option<String>,
    /// Sent as `OpenAI-Project` when set.
    pub project: Option<String>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(defaults::CONNECT_TIMEOUT_MS),
            read_timeout: Duration::from_millis(defaults::SOCKET_READ_TIMEOUT_MS),
            organization: None,
            project: None,
        }
    }
}

/// [`HttpTransport`] over a blocking reqwest client.
pub struct ReqwestTransport {
    client: Client,
    settings: TransportSettings,
}

impl ReqwestTransport {
    /// # Errors
    /// Returns `VoltError::NetworkUnavailable` if the TLS backend cannot be initialised.
    pub fn new(settings: TransportSettings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.read_timeout)
            .user_agent(concat!("volt-voice/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| VoltError::NetworkUnavailable {
                reason: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }
}

impl HttpTransport for ReqwestTransport {
    fn post(&self, request: HttpRequest) -> Result<HttpResponse> {
        let HttpRequest {
            url,
            api_key,
            body,
            timeout,
        } = request;

        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(&api_key)
            .header(CONTENT_TYPE, body.content_type().to_string());
        if let Some(org) = &self.settings.organization {
            builder = builder.header("OpenAI-Organization", org);
        }
        if let Some(project) = &self.settings.project {
            builder = builder.header("OpenAI-Project", project);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        builder = match body {
            RequestBody::Json(bytes) => builder.body(bytes),
            RequestBody::Stream { len, reader, .. } => builder.body(Body::sized(reader, len)),
        };

        let response = builder.send().map_err(|e| classify(&url, e))?;
        let status = response.status().as_u16();
        let content_length = response.content_length();
        tracing::debug!(%url, status, ?content_length, "response head received");

        Ok(HttpResponse {
            status,
            content_length,
            body: Box::new(response),
        })
    }
}

fn classify(url: &str, error: reqwest::Error) -> VoltError {
    if error.is_timeout() {
        VoltError::timeout(format!("POST {url}"))
    } else if error.is_connect() {
        VoltError::NetworkUnavailable {
            reason: format!("connect to {url} failed: {error}"),
        }
    } else {
        VoltError::NetworkUnavailable {
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_use_configured_timeouts() {
        let settings = TransportSettings::default();
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
        assert_eq!(settings.read_timeout, Duration::from_secs(15));
        assert!(settings.organization.is_none());
    }

    #[test]
    fn test_transport_builds() {
        let transport = ReqwestTransport::new(TransportSettings {
            organization: Some("org-1".to_string()),
            ..TransportSettings::default()
        })
        .unwrap();
        assert_eq!(transport.settings().organization.as_deref(), Some("org-1"));
    }

    #[test]
    fn test_connection_refused_is_network_unavailable() {
        let transport = ReqwestTransport::new(TransportSettings {
            connect_timeout: Duration::from_millis(500),
            ..TransportSettings::default()
        })
        .unwrap();
        let request = HttpRequest::json(
            "http://127.0.0.1:9/v1/chat/completions",
            "sk-test-key",
            &serde_json::json!({}),
            Some(Duration::from_secs(2)),
        )
        .unwrap();

        match transport.post(request) {
            Err(VoltError::NetworkUnavailable { .. }) | Err(VoltError::Timeout { .. }) => {}
            other => panic!("Expected connection failure, got {:?}", other),
        }
    }
}
