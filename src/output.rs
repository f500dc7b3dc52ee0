//! Terminal rendering for the `volt` binary.

use crate::audio::player::PlaybackReport;
use crate::audio::recorder::Recording;
use crate::pipeline::{StatusSink, TurnOutcome};
use owo_colors::OwoColorize;

/// Status line on stderr, so stdout carries only results.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalStatus {
    quiet: bool,
}

impl TerminalStatus {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl StatusSink for TerminalStatus {
    fn show(&self, text: &str) {
        if !self.quiet {
            eprintln!("{}", text.cyan());
        }
    }
}

/// Print the result of a turn. Failures go to stderr.
pub fn print_outcome(outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Spoken {
            transcript,
            reply,
            closing,
        } => {
            if let Some(heard) = transcript {
                println!("{} {}", "You:".dimmed(), heard);
            }
            println!("{} {}", "VOLT:".green().bold(), reply);
            if *closing {
                eprintln!("{}", "(turn budget used up)".yellow());
            }
        }
        TurnOutcome::Failed { error, message } => {
            println!("{} {}", "VOLT:".yellow().bold(), message);
            eprintln!("{}", format!("Error: {}", error).red());
        }
    }
}

pub fn print_recording(recording: &Recording, path: &std::path::Path) {
    println!(
        "Saved {} bytes to {}",
        recording.total_bytes(),
        path.display().green()
    );
    if recording.timed_out {
        eprintln!(
            "{}",
            format!(
                "Capture timed out, {} bytes padded with silence",
                recording.padded_bytes
            )
            .yellow()
        );
    }
}

pub fn print_playback(report: &PlaybackReport) {
    println!(
        "Played {} bytes in {} chunks ({})",
        report.bytes_played,
        report.chunks,
        format!("{:?}", report.ended_by).dimmed()
    );
}
