use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use volt_voice::app::{self, AppOptions};
use volt_voice::cli::{Cli, Commands, ConfigAction};
use volt_voice::config::Config;
use volt_voice::output::{print_outcome, print_playback, print_recording};
use volt_voice::pipeline::TurnOutcome;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Install the log subscriber. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,volt_voice={level},volt={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose > 1)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    tracing::debug!(version = %volt_voice::version_string(), dry_run = cli.dry_run, "volt starting");
    let options = AppOptions {
        quiet: cli.quiet,
        dry_run: cli.dry_run,
    };

    match cli.command {
        Commands::Talk { turns } => {
            let config = load_config(cli.config.as_deref())?;
            let outcomes = app::run_talk(&config, options, turns)?;
            if outcomes.is_empty() {
                bail!("no turn was started (is chat disabled in the config?)");
            }
            outcomes.iter().for_each(print_outcome);
            return Ok(exit_code(&outcomes));
        }
        Commands::Chat { text } => {
            let config = load_config(cli.config.as_deref())?;
            let Some(outcome) = app::run_chat(&config, options, &text)? else {
                bail!("chat is disabled in the config");
            };
            print_outcome(&outcome);
            return Ok(exit_code(std::slice::from_ref(&outcome)));
        }
        Commands::Record { out, duration } => {
            let config = load_config(cli.config.as_deref())?;
            let recording = app::run_record(&config, options, &out, duration)?;
            print_recording(&recording, &out);
        }
        Commands::Say { text } => {
            let config = load_config(cli.config.as_deref())?;
            let report = app::run_say(&config, options, &text)?;
            if !cli.quiet {
                print_playback(&report);
            }
        }
        Commands::Devices => list_audio_devices()?,
        Commands::Config { action } => handle_config_command(action, cli.config.as_deref())?,
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "volt", &mut std::io::stdout());
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn exit_code(outcomes: &[TurnOutcome]) -> ExitCode {
    if outcomes.iter().all(TurnOutcome::is_spoken) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config), which must exist
/// 2. Default config path (~/.config/volt/config.toml)
/// 3. Built-in defaults
///
/// Environment variable overrides apply on top, then the result is validated.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

fn config_path(custom_path: Option<&Path>) -> PathBuf {
    custom_path.map_or_else(Config::default_path, Path::to_path_buf)
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            println!("{}", config_path(custom_path).display());
        }
        ConfigAction::Init { force } => {
            let path = config_path(custom_path);
            if path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(&path, Config::default().to_toml()?)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("{} {}", "Wrote".green(), path.display());
        }
    }
    Ok(())
}

#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = volt_voice::audio::host::list_devices()?;

    println!("Input devices:");
    if devices.inputs.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (idx, name) in devices.inputs.iter().enumerate() {
        println!("  [{}] {}", idx, name);
    }
    println!("Output devices:");
    if devices.outputs.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (idx, name) in devices.outputs.iter().enumerate() {
        println!("  [{}] {}", idx, name);
    }
    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_audio_devices() -> Result<()> {
    bail!("built without the cpal-audio feature")
}
