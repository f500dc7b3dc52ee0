use crate::defaults;
use crate::error::{Result, Service, VoltError};
use crate::net::HttpRequest;
use crate::services::{ServiceContext, classify_status};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Overall request timeout.
    pub timeout: Duration,
    /// Returned without a network call once the turn budget is used up.
    pub closing_message: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: defaults::CHAT_MODEL.to_string(),
            temperature: defaults::TEMPERATURE,
            max_tokens: defaults::MAX_TOKENS,
            timeout: Duration::from_millis(defaults::CHAT_TIMEOUT_MS),
            closing_message: defaults::CLOSING_MESSAGE.to_string(),
        }
    }
}

/// Result of a chat call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatReply {
    /// Reply produced by the language model.
    Reply(String),
    /// Fixed closing message; the turn budget was exhausted and nothing was sent.
    Closing(String),
}

impl ChatReply {
    pub fn text(&self) -> &str {
        match self {
            ChatReply::Reply(text) | ChatReply::Closing(text) => text,
        }
    }

    pub fn is_closing(&self) -> bool {
        matches!(self, ChatReply::Closing(_))
    }
}

/// One-shot JSON chat exchange with the language model.
pub struct ConversationClient {
    context: ServiceContext,
    settings: ChatSettings,
}

impl ConversationClient {
    pub fn new(context: ServiceContext, settings: ChatSettings) -> Self {
        Self { context, settings }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Ask the model to answer `user_text`.
    ///
    /// Empty input is rejected and an exhausted budget returns the closing
    /// message; neither touches the network. Otherwise exactly one POST is made.
    pub fn chat(
        &self,
        user_text: &str,
        system_prompt: &str,
        turns_used: u32,
        turn_budget: u32,
    ) -> Result<ChatReply> {
        let user_text = user_text.trim();
        if user_text.is_empty() {
            return Err(VoltError::EmptyInput {
                what: "chat message",
            });
        }
        if turns_used >= turn_budget {
            tracing::info!(turns_used, turn_budget, "turn budget exhausted, closing");
            return Ok(ChatReply::Closing(self.settings.closing_message.clone()));
        }
        let api_key = self.context.preflight(Service::Chat)?;

        let payload = ChatRequest {
            model: &self.settings.model,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_text,
                },
            ],
        };
        let request = HttpRequest::json(
            self.context.url("/chat/completions"),
            api_key,
            &payload,
            Some(self.settings.timeout),
        )?;

        tracing::debug!(model = %self.settings.model, chars = user_text.len(), "sending chat request");
        let response = self.context.transport.post(request)?;
        let response = classify_status(Service::Chat, response)?;
        let parsed: ChatResponse =
            response.read_json(Service::Chat, defaults::MAX_JSON_RESPONSE_BYTES)?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| VoltError::malformed(Service::Chat, "response has no choices"))?
            .message
            .content
            .ok_or_else(|| VoltError::malformed(Service::Chat, "first choice has no content"))?;

        let reply = content.trim().to_string();
        tracing::info!(chars = reply.chars().count(), "chat reply received");
        Ok(ChatReply::Reply(reply))
    }
}
