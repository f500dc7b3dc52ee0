//! Command-line interface for volt
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Voice companion: talk to the assistant through the microphone and speaker
#[derive(Parser, Debug)]
#[command(name = "volt", version, about = "Voice companion for the VOLT wearable")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress status output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: info, -vv: debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Use a mock audio driver and canned service replies instead of real hardware and network
    #[arg(long, global = true)]
    pub dry_run: bool,
}

/// Parse a recording duration into whole seconds.
///
/// Accepts bare numbers (seconds) and anything `humantime` understands
/// (`5s`, `1500ms`, `1m`). Sub-second remainders round up.
fn parse_record_secs(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u32>() {
        return Ok(secs);
    }
    let duration = humantime::parse_duration(s).map_err(|e| e.to_string())?;
    let mut secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs += 1;
    }
    u32::try_from(secs).map_err(|_| format!("duration too long: {}", s))
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run voice turns: record, transcribe, chat and speak the reply
    Talk {
        /// Number of turns to run
        #[arg(long, short = 'n', value_name = "N", default_value = "1")]
        turns: u32,
    },

    /// Send a text message and speak the reply
    Chat {
        /// Message text
        text: String,
    },

    /// Record from the microphone and save a WAV file
    Record {
        /// Output file
        #[arg(long, short = 'o', value_name = "FILE", default_value = "recording.wav")]
        out: PathBuf,

        /// Recording length (default: from config). Examples: 5, 5s, 2500ms
        #[arg(long, short = 'd', value_name = "DURATION", value_parser = parse_record_secs)]
        duration: Option<u32>,
    },

    /// Speak text through the speaker
    Say {
        /// Text to synthesize
        text: String,
    },

    /// List host audio devices
    Devices,

    /// View and manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration (API key omitted)
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
