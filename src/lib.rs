//! volt-voice - voice interaction core for a wearable AI companion
//!
//! Records speech, transcribes it remotely, asks a language model for a
//! reply and streams synthesized speech back to the speaker, sharing one
//! duplex audio peripheral between capture and playback.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod clock;
pub mod config;
pub mod defaults;
pub mod error;
pub mod net;
pub mod persona;
pub mod pipeline;
pub mod services;

#[cfg(feature = "cli")]
pub mod app;
#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "cli")]
pub mod output;

// Core seams
pub use audio::driver::I2sDriver;
pub use clock::{Clock, MockClock, SystemClock};
pub use net::HttpTransport;
pub use pipeline::collaborators::{
    ActivityNotifier, CredentialStore, FallbackResponder, NetworkStatus, StatusSink,
};

// Pipeline
pub use pipeline::{PipelineState, TurnOutcome, VoicePipeline};

// Error handling
pub use error::{ErrorKind, Result, Service, VoltError};

// Config
pub use config::Config;
pub use persona::{Persona, PersonaFallback};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
