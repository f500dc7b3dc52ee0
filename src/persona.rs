//! Assistant persona: system prompt rendering and fallback messages.

use crate::config::PersonaConfig;
use crate::defaults;
use crate::error::{ErrorKind, VoltError};
use crate::pipeline::FallbackResponder;

#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    pub name: String,
    pub child_name: String,
    pub child_age: u32,
    pub prompt_template: String,
    pub content_filter: bool,
    pub offline_template: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self::from_config(&PersonaConfig::default())
    }
}

impl Persona {
    pub fn from_config(config: &PersonaConfig) -> Self {
        Self {
            name: config.name.clone(),
            child_name: config.child_name.clone(),
            child_age: config.child_age,
            prompt_template: config.system_prompt.clone(),
            content_filter: config.content_filter,
            offline_template: config.offline_message.clone(),
        }
    }

    /// Substitute `{name}`, `{child_name}` and `{child_age}` in `template`.
    ///
    /// Unknown placeholders are left as they are.
    pub fn render(&self, template: &str) -> String {
        template
            .replace("{child_name}", &self.child_name)
            .replace("{child_age}", &self.child_age.to_string())
            .replace("{name}", &self.name)
    }

    /// System prompt sent with every chat request.
    pub fn system_prompt(&self) -> String {
        let mut prompt = self.render(&self.prompt_template);
        if self.content_filter {
            prompt.push(' ');
            prompt.push_str(defaults::CONTENT_FILTER_PROMPT);
        }
        prompt
    }

    pub fn offline_message(&self) -> String {
        self.render(&self.offline_template)
    }
}

/// Fallback text chosen by failure kind.
#[derive(Debug, Clone)]
pub struct PersonaFallback {
    persona: Persona,
}

impl PersonaFallback {
    pub fn new(persona: Persona) -> Self {
        Self { persona }
    }
}

impl FallbackResponder for PersonaFallback {
    fn respond(&self, failure: &VoltError) -> String {
        let name = &self.persona.name;
        match failure.kind() {
            ErrorKind::Auth => format!("{name} can't chat right now. Ask a grown-up to check the settings."),
            ErrorKind::RateLimited => format!("{name} is a little busy. Let's try again in a minute!"),
            ErrorKind::Timeout => format!("{name} took too long to answer. Let's try again!"),
            ErrorKind::EmptyInput => "I didn't catch that. Can you say it again?".to_string(),
            ErrorKind::Hardware => format!("{name} can't hear or speak right now."),
            _ => self.persona.offline_message(),
        }
    }
}
