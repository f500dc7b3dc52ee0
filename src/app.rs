//! Composition root for the `volt` binary.
//!
//! Builds drivers, transport and clients from [`Config`] and runs one
//! command. `--dry-run` swaps the audio driver and the transport for the
//! scripted mocks so the whole flow can be exercised without hardware,
//! network or an API key.

use crate::audio::driver::I2sDriver;
use crate::audio::duplex::AudioDuplexController;
use crate::audio::mock::MockI2sDriver;
use crate::audio::pcm::PcmBuffer;
use crate::audio::player::{PlaybackReport, Player};
use crate::audio::recorder::{Recorder, Recording};
use crate::audio::wav::write_wav_file;
use crate::clock::SystemClock;
use crate::config::Config;
use crate::error::{Result, VoltError};
use crate::net::{HttpTransport, MockReply, MockTransport, ReqwestTransport};
use crate::output::TerminalStatus;
use crate::persona::{Persona, PersonaFallback};
use crate::pipeline::{
    CredentialStore, LogStatusSink, NoopNotifier, PipelineCollaborators, PipelineResources,
    PipelineServices, PipelineSettings, StaticCredentials, StaticNetwork, StatusSink,
    TurnOutcome, VoicePipeline,
};
use crate::services::{
    ConversationClient, ServiceContext, SpeechSynthesisClient, TranscriptionClient,
};
use std::path::Path;
use std::sync::Arc;

/// Placeholder key so dry runs pass the key length check.
const DRY_RUN_KEY: &str = "sk-dry-run-placeholder";

/// Flags shared by every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppOptions {
    pub quiet: bool,
    pub dry_run: bool,
}

pub type AppPipeline = VoicePipeline<Box<dyn I2sDriver>, SystemClock>;

fn build_driver(config: &Config, options: AppOptions) -> Result<Box<dyn I2sDriver>> {
    if options.dry_run {
        // A quiet tone so the saved WAV is not pure silence.
        let tone: Vec<i16> = (0..32).map(|i| if i < 16 { 800 } else { -800 }).collect();
        return Ok(Box::new(MockI2sDriver::new().with_samples(&tone)));
    }
    host_driver(config)
}

#[cfg(feature = "cpal-audio")]
fn host_driver(config: &Config) -> Result<Box<dyn I2sDriver>> {
    Ok(Box::new(crate::audio::host::CpalI2sDriver::new(
        config.audio.device.clone(),
        config.audio.output_device.clone(),
    )))
}

#[cfg(not(feature = "cpal-audio"))]
fn host_driver(_config: &Config) -> Result<Box<dyn I2sDriver>> {
    Err(VoltError::hardware(
        "built without the cpal-audio feature; use --dry-run",
    ))
}

fn dry_run_transport(config: &Config) -> Arc<dyn HttpTransport> {
    let one_second = u64::from(config.audio.playback_sample_rate) * 2;
    Arc::new(
        MockTransport::new()
            .with_transcription(MockReply::transcript("Hi VOLT, why is the sky blue?"))
            .with_chat(MockReply::chat(
                "Sunlight bounces off tiny bits of air, and blue light bounces the most!",
            ))
            .with_speech(MockReply::chunked_audio(one_second)),
    )
}

/// Service contexts for the request/response services and for speech.
///
/// Speech streams through its own client whose read timeout is the playback
/// idle timeout. Dry runs share one scripted transport.
struct Contexts {
    requests: ServiceContext,
    speech: ServiceContext,
}

fn service_contexts(config: &Config, options: AppOptions) -> Result<Contexts> {
    let key = if options.dry_run {
        Some(DRY_RUN_KEY.to_string())
    } else {
        config.api.key.clone()
    };
    let (transport, speech_transport): (Arc<dyn HttpTransport>, Arc<dyn HttpTransport>) =
        if options.dry_run {
            let mock = dry_run_transport(config);
            (Arc::clone(&mock), mock)
        } else {
            (
                Arc::new(ReqwestTransport::new(config.transport_settings())?),
                Arc::new(ReqwestTransport::new(config.speech_transport_settings())?),
            )
        };
    let credentials: Arc<dyn CredentialStore> = Arc::new(StaticCredentials::new(key));
    let requests = ServiceContext::new(
        transport,
        Arc::new(StaticNetwork::new(true)),
        credentials,
        config.api.base_url.clone(),
    );
    let speech = ServiceContext {
        transport: speech_transport,
        ..requests.clone()
    };
    Ok(Contexts { requests, speech })
}

fn status_sink(options: AppOptions) -> Arc<dyn StatusSink> {
    if options.quiet {
        Arc::new(LogStatusSink)
    } else {
        Arc::new(TerminalStatus::new(false))
    }
}

/// Assemble the full voice pipeline.
pub fn build_pipeline(config: &Config, options: AppOptions) -> Result<AppPipeline> {
    let Contexts { requests, speech } = service_contexts(config, options)?;
    let persona = Persona::from_config(&config.persona);
    let system_prompt = persona.system_prompt();

    let audio = AudioDuplexController::new(build_driver(config, options)?, config.duplex_settings());
    let pcm = PcmBuffer::allocate(config.audio.sample_rate, config.audio.record_seconds)?;
    tracing::debug!(bytes = pcm.capacity(), "capture buffer allocated");

    Ok(VoicePipeline::new(
        PipelineResources {
            audio,
            pcm,
            recorder: Recorder::new(config.recorder_config(), SystemClock),
            player: Player::new(config.player_config(), SystemClock),
        },
        PipelineServices {
            transcription: TranscriptionClient::new(
                requests.clone(),
                config.transcription_settings(),
            ),
            conversation: ConversationClient::new(requests.clone(), config.chat_settings()),
            speech: SpeechSynthesisClient::new(speech, config.speech_settings()),
        },
        PipelineCollaborators {
            status: status_sink(options),
            activity: Arc::new(NoopNotifier),
            fallback: Arc::new(PersonaFallback::new(persona)),
            credentials: Arc::clone(&requests.credentials),
        },
        PipelineSettings {
            record_seconds: config.audio.record_seconds,
            turn_budget: config.chat.turn_budget,
            system_prompt,
            chat_enabled: config.chat.enabled,
        },
    ))
}

/// Run `turns` voice turns back to back.
pub fn run_talk(config: &Config, options: AppOptions, turns: u32) -> Result<Vec<TurnOutcome>> {
    let mut pipeline = build_pipeline(config, options)?;
    let mut outcomes = Vec::new();
    for turn in 1..=turns {
        if !pipeline.trigger_voice_interaction() {
            break;
        }
        tracing::info!(turn, of = turns, "voice turn");
        if let Some(outcome) = pipeline.run_to_idle() {
            outcomes.push(outcome);
        }
    }
    pipeline.shutdown();
    Ok(outcomes)
}

/// Run one text turn.
pub fn run_chat(config: &Config, options: AppOptions, text: &str) -> Result<Option<TurnOutcome>> {
    let mut pipeline = build_pipeline(config, options)?;
    if !pipeline.trigger_text_chat(text) {
        return Ok(None);
    }
    let outcome = pipeline.run_to_idle();
    pipeline.shutdown();
    Ok(outcome)
}

/// Capture `seconds` of audio and save it as a WAV file.
pub fn run_record(
    config: &Config,
    options: AppOptions,
    out: &Path,
    seconds: Option<u32>,
) -> Result<Recording> {
    let seconds = seconds.unwrap_or(config.audio.record_seconds);
    if seconds == 0 {
        return Err(VoltError::EmptyInput {
            what: "recording duration",
        });
    }
    let mut audio =
        AudioDuplexController::new(build_driver(config, options)?, config.duplex_settings());
    let mut pcm = PcmBuffer::allocate(config.audio.sample_rate, seconds)?;
    let recorder = Recorder::new(config.recorder_config(), SystemClock);

    status_sink(options).show("Listening...");
    let recording = recorder.capture(&mut audio, &mut pcm, seconds)?;
    audio.shutdown();

    write_wav_file(out, &pcm)?;
    tracing::info!(path = %out.display(), bytes = pcm.len(), "recording saved");
    Ok(recording)
}

/// Synthesize `text` and play it.
pub fn run_say(config: &Config, options: AppOptions, text: &str) -> Result<PlaybackReport> {
    let Contexts { speech, .. } = service_contexts(config, options)?;
    let speech = SpeechSynthesisClient::new(speech, config.speech_settings());
    let mut audio =
        AudioDuplexController::new(build_driver(config, options)?, config.duplex_settings());
    let mut player = Player::new(config.player_config(), SystemClock);

    status_sink(options).show("Speaking...");
    let report = speech.speak(text, &mut audio, &mut player);
    audio.shutdown();
    report
}
