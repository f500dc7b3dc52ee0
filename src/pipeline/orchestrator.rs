//! Single-flight voice turn: record, transcribe, think, speak.
//!
//! The orchestrator is cooperative. A trigger only arms the state machine;
//! each call to [`VoicePipeline::step`] runs exactly one stage to completion
//! (bounded by that stage's own timeouts) and advances the state. Triggers
//! that arrive while a turn is in flight are rejected, never queued.

use crate::audio::driver::I2sDriver;
use crate::audio::duplex::AudioDuplexController;
use crate::audio::pcm::PcmBuffer;
use crate::audio::player::Player;
use crate::audio::recorder::Recorder;
use crate::clock::Clock;
use crate::error::{Service, VoltError};
use crate::pipeline::collaborators::{
    Activity, ActivityNotifier, CredentialStore, FallbackResponder, StatusSink,
};
use crate::pipeline::state::{PipelineState, TurnCounter};
use crate::services::{ChatReply, ConversationClient, SpeechSynthesisClient, TranscriptionClient};
use std::sync::Arc;
use std::time::Instant;

/// Owned hardware and buffers the pipeline works with.
pub struct PipelineResources<D: I2sDriver, C: Clock> {
    pub audio: AudioDuplexController<D>,
    pub pcm: PcmBuffer,
    pub recorder: Recorder<C>,
    pub player: Player<C>,
}

/// Remote service clients.
pub struct PipelineServices {
    pub transcription: TranscriptionClient,
    pub conversation: ConversationClient,
    pub speech: SpeechSynthesisClient,
}

/// External collaborators consumed by the pipeline.
#[derive(Clone)]
pub struct PipelineCollaborators {
    pub status: Arc<dyn StatusSink>,
    pub activity: Arc<dyn ActivityNotifier>,
    pub fallback: Arc<dyn FallbackResponder>,
    /// Consulted to notice a replaced key while the auth latch is set.
    pub credentials: Arc<dyn CredentialStore>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub record_seconds: u32,
    pub turn_budget: u32,
    /// Fully rendered system prompt.
    pub system_prompt: String,
    /// When false every trigger is rejected.
    pub chat_enabled: bool,
}

/// How a turn ended.
#[derive(Debug)]
pub enum TurnOutcome {
    Spoken {
        /// Recognized speech; `None` for text-triggered turns.
        transcript: Option<String>,
        reply: String,
        /// The reply was the fixed closing message.
        closing: bool,
    },
    Failed {
        error: VoltError,
        /// Fallback message shown to the user.
        message: String,
    },
}

impl TurnOutcome {
    pub fn is_spoken(&self) -> bool {
        matches!(self, TurnOutcome::Spoken { .. })
    }
}

/// Key in use when an auth failure latched chat off.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AuthLatch {
    key: Option<String>,
}

/// Data carried between stages of the live turn.
#[derive(Debug, Default)]
struct Turn {
    transcript: Option<String>,
    user_text: String,
    reply: Option<ChatReply>,
    failure: Option<VoltError>,
}

pub struct VoicePipeline<D: I2sDriver, C: Clock> {
    resources: PipelineResources<D, C>,
    services: PipelineServices,
    collaborators: PipelineCollaborators,
    settings: PipelineSettings,
    state: PipelineState,
    turns: TurnCounter,
    turn: Turn,
    auth_latch: Option<AuthLatch>,
    stage_started: Instant,
}

impl<D: I2sDriver, C: Clock> VoicePipeline<D, C> {
    pub fn new(
        resources: PipelineResources<D, C>,
        services: PipelineServices,
        collaborators: PipelineCollaborators,
        settings: PipelineSettings,
    ) -> Self {
        let turns = TurnCounter::new(settings.turn_budget);
        Self {
            resources,
            services,
            collaborators,
            settings,
            state: PipelineState::Idle,
            turns,
            turn: Turn::default(),
            auth_latch: None,
            stage_started: Instant::now(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn turns(&self) -> TurnCounter {
        self.turns
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// PCM captured by the most recent voice turn.
    pub fn last_recording(&self) -> &PcmBuffer {
        &self.resources.pcm
    }

    /// Arm a full voice turn. Returns false (and changes nothing) unless idle.
    pub fn trigger_voice_interaction(&mut self) -> bool {
        if !self.accept_trigger("voice") {
            return false;
        }
        self.turn = Turn::default();
        self.begin(PipelineState::Recording);
        true
    }

    /// Arm a text turn that skips recording and transcription.
    pub fn trigger_text_chat(&mut self, text: &str) -> bool {
        if !self.accept_trigger("text") {
            return false;
        }
        self.turn = Turn {
            user_text: text.to_string(),
            ..Turn::default()
        };
        self.begin(PipelineState::Thinking);
        true
    }

    /// Run the current stage. Returns the outcome once the turn is over.
    pub fn step(&mut self) -> Option<TurnOutcome> {
        match self.state {
            PipelineState::Idle => None,
            PipelineState::Recording => {
                self.run_recording();
                None
            }
            PipelineState::Transcribing => {
                self.run_transcribing();
                None
            }
            PipelineState::Thinking => {
                self.run_thinking();
                None
            }
            PipelineState::Speaking => self.run_speaking(),
            PipelineState::Failed => Some(self.finish_failed()),
        }
    }

    /// Step until the pipeline is idle again.
    pub fn run_to_idle(&mut self) -> Option<TurnOutcome> {
        let mut outcome = None;
        while !self.state.is_idle() {
            if let Some(done) = self.step() {
                outcome = Some(done);
            }
        }
        outcome
    }

    /// Start a new conversation. The turn counter goes back to zero.
    pub fn reset(&mut self) {
        tracing::info!(used = self.turns.used(), "conversation reset");
        self.turns.reset();
    }

    /// True while chat is disabled by an earlier auth failure.
    ///
    /// The latch clears itself once the credential store hands out a
    /// different key.
    pub fn auth_latched(&mut self) -> bool {
        let Some(latch) = &self.auth_latch else {
            return false;
        };
        let current = self.current_key();
        if current != latch.key {
            tracing::info!("API key changed, clearing auth latch");
            self.auth_latch = None;
            return false;
        }
        true
    }

    pub fn clear_auth_latch(&mut self) {
        if self.auth_latch.take().is_some() {
            tracing::info!("auth latch cleared");
        }
    }

    /// Release the audio peripheral.
    pub fn shutdown(&mut self) {
        self.resources.audio.shutdown();
    }

    fn accept_trigger(&self, kind: &str) -> bool {
        if !self.state.is_idle() {
            tracing::debug!(kind, state = %self.state, "trigger rejected, turn in flight");
            return false;
        }
        if !self.settings.chat_enabled {
            tracing::info!(kind, "trigger rejected, chat disabled");
            self.collaborators.status.show("Chat is disabled");
            return false;
        }
        true
    }

    fn begin(&mut self, first: PipelineState) {
        tracing::info!(first = %first, turns_used = self.turns.used(), "turn started");
        self.collaborators.activity.notify(Activity::Started);
        self.enter(first);
    }

    fn enter(&mut self, state: PipelineState) {
        let elapsed_ms = self.stage_started.elapsed().as_millis() as u64;
        tracing::debug!(from = %self.state, to = %state, elapsed_ms, "stage transition");
        self.state = state;
        self.stage_started = Instant::now();
        let status = match state {
            PipelineState::Recording => Some("Listening..."),
            PipelineState::Transcribing => Some("Transcribing..."),
            PipelineState::Thinking => Some("Thinking..."),
            PipelineState::Speaking => Some("Speaking..."),
            PipelineState::Idle | PipelineState::Failed => None,
        };
        if let Some(text) = status {
            self.collaborators.status.show(text);
        }
    }

    fn fail(&mut self, error: VoltError) {
        if error.is_persistent() {
            let key = self.current_key();
            tracing::error!(stage = %self.state, error = %error, "authentication failed, disabling chat");
            self.auth_latch = Some(AuthLatch { key });
        } else {
            tracing::warn!(stage = %self.state, kind = ?error.kind(), error = %error, "turn failed");
        }
        self.turn.failure = Some(error);
        self.enter(PipelineState::Failed);
    }

    fn current_key(&self) -> Option<String> {
        self.collaborators
            .credentials
            .api_key()
            .map(|k| k.trim().to_string())
    }

    fn run_recording(&mut self) {
        let PipelineResources {
            audio,
            pcm,
            recorder,
            ..
        } = &mut self.resources;
        match recorder.capture(audio, pcm, self.settings.record_seconds) {
            Ok(recording) => {
                tracing::info!(
                    bytes = recording.bytes_captured,
                    padded = recording.padded_bytes,
                    "recording stage complete"
                );
                self.enter(PipelineState::Transcribing);
            }
            Err(e) => self.fail(e),
        }
    }

    fn run_transcribing(&mut self) {
        match self.services.transcription.transcribe(&self.resources.pcm) {
            Ok(text) => {
                tracing::info!(chars = text.chars().count(), "transcription stage complete");
                self.turn.user_text = text.clone();
                self.turn.transcript = Some(text);
                self.enter(PipelineState::Thinking);
            }
            Err(e) => self.fail(e),
        }
    }

    fn run_thinking(&mut self) {
        if self.auth_latched() {
            self.fail(VoltError::Auth {
                service: Service::Chat,
            });
            return;
        }
        let result = self.services.conversation.chat(
            &self.turn.user_text,
            &self.settings.system_prompt,
            self.turns.used(),
            self.turns.budget(),
        );
        match result {
            Ok(reply) => {
                if !reply.is_closing() {
                    self.turns.record();
                }
                tracing::info!(
                    closing = reply.is_closing(),
                    turns_used = self.turns.used(),
                    "thinking stage complete"
                );
                self.turn.reply = Some(reply);
                self.enter(PipelineState::Speaking);
            }
            Err(e) => self.fail(e),
        }
    }

    fn run_speaking(&mut self) -> Option<TurnOutcome> {
        if self.auth_latched() {
            self.fail(VoltError::Auth {
                service: Service::Speech,
            });
            return None;
        }
        let Some(reply) = self.turn.reply.take() else {
            self.fail(VoltError::EmptyInput {
                what: "reply to speak",
            });
            return None;
        };

        let PipelineResources { audio, player, .. } = &mut self.resources;
        match self.services.speech.speak(reply.text(), audio, player) {
            Ok(report) => {
                tracing::info!(bytes = report.bytes_played, "turn complete");
                self.enter(PipelineState::Idle);
                self.collaborators.activity.notify(Activity::Idle);
                let closing = reply.is_closing();
                let reply = match reply {
                    ChatReply::Reply(text) | ChatReply::Closing(text) => text,
                };
                Some(TurnOutcome::Spoken {
                    transcript: self.turn.transcript.take(),
                    reply,
                    closing,
                })
            }
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    fn finish_failed(&mut self) -> TurnOutcome {
        let error = self.turn.failure.take().unwrap_or(VoltError::Timeout {
            operation: "voice turn".to_string(),
        });
        let message = self.collaborators.fallback.respond(&error);
        self.collaborators.status.show(&message);
        self.collaborators.activity.notify(Activity::Failed);
        self.enter(PipelineState::Idle);
        TurnOutcome::Failed { error, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::duplex::DuplexSettings;
    use crate::audio::mock::{MockDriverProbe, MockI2sDriver};
    use crate::audio::player::PlayerConfig;
    use crate::audio::recorder::RecorderConfig;
    use crate::clock::MockClock;
    use crate::net::{HttpTransport, MockReply, MockTransport};
    use crate::pipeline::collaborators::{
        CountingNotifier, RecordingStatusSink, StaticCredentials, StaticNetwork,
    };
    use crate::services::{ChatSettings, ServiceContext, SpeechSettings, TranscriptionSettings};

    const KEY: &str = "sk-test-0123456789";

    struct FixedFallback;

    impl FallbackResponder for FixedFallback {
        fn respond(&self, failure: &VoltError) -> String {
            format!("fallback: {:?}", failure.kind())
        }
    }

    struct Rig {
        pipeline: VoicePipeline<MockI2sDriver, MockClock>,
        transport: Arc<MockTransport>,
        status: Arc<RecordingStatusSink>,
        activity: Arc<CountingNotifier>,
        credentials: Arc<StaticCredentials>,
        network: Arc<StaticNetwork>,
        probe: MockDriverProbe,
    }

    fn happy_transport() -> MockTransport {
        MockTransport::new()
            .with_transcription(MockReply::transcript("why is the sky blue"))
            .with_chat(MockReply::chat("Because of sunlight scattering!"))
            .with_speech(MockReply::audio(4800))
    }

    fn rig_with(transport: MockTransport, budget: u32) -> Rig {
        let transport = Arc::new(transport);
        let network = Arc::new(StaticNetwork::new(true));
        let credentials = Arc::new(StaticCredentials::new(Some(KEY.to_string())));
        let context = ServiceContext::new(
            Arc::clone(&transport) as Arc<dyn HttpTransport>,
            Arc::clone(&network) as Arc<dyn crate::pipeline::NetworkStatus>,
            Arc::clone(&credentials) as Arc<dyn CredentialStore>,
            "https://api.test/v1",
        );
        let clock = MockClock::new();
        let driver = MockI2sDriver::new().with_samples(&[100, -100]);
        let probe = driver.probe();
        let status = Arc::new(RecordingStatusSink::new());
        let activity = Arc::new(CountingNotifier::new());

        let pipeline = VoicePipeline::new(
            PipelineResources {
                audio: AudioDuplexController::new(driver, DuplexSettings::default()),
                pcm: PcmBuffer::allocate(16000, 1).unwrap(),
                recorder: Recorder::new(RecorderConfig::default(), clock.clone()),
                player: Player::new(PlayerConfig::default(), clock),
            },
            PipelineServices {
                transcription: TranscriptionClient::new(
                    context.clone(),
                    TranscriptionSettings::default(),
                ),
                conversation: ConversationClient::new(context.clone(), ChatSettings::default()),
                speech: SpeechSynthesisClient::new(context, SpeechSettings::default()),
            },
            PipelineCollaborators {
                status: Arc::clone(&status) as Arc<dyn StatusSink>,
                activity: Arc::clone(&activity) as Arc<dyn ActivityNotifier>,
                fallback: Arc::new(FixedFallback),
                credentials: Arc::clone(&credentials) as Arc<dyn CredentialStore>,
            },
            PipelineSettings {
                record_seconds: 1,
                turn_budget: budget,
                system_prompt: "You are kind.".to_string(),
                chat_enabled: true,
            },
        );

        Rig {
            pipeline,
            transport,
            status,
            activity,
            credentials,
            network,
            probe,
        }
    }

    fn rig() -> Rig {
        rig_with(happy_transport(), 10)
    }

    #[test]
    fn test_voice_turn_walks_every_stage() {
        let mut r = rig();
        assert!(r.pipeline.trigger_voice_interaction());
        assert_eq!(r.pipeline.state(), PipelineState::Recording);

        assert!(r.pipeline.step().is_none());
        assert_eq!(r.pipeline.state(), PipelineState::Transcribing);
        assert!(r.pipeline.step().is_none());
        assert_eq!(r.pipeline.state(), PipelineState::Thinking);
        assert!(r.pipeline.step().is_none());
        assert_eq!(r.pipeline.state(), PipelineState::Speaking);

        match r.pipeline.step() {
            Some(TurnOutcome::Spoken {
                transcript,
                reply,
                closing,
            }) => {
                assert_eq!(transcript.as_deref(), Some("why is the sky blue"));
                assert_eq!(reply, "Because of sunlight scattering!");
                assert!(!closing);
            }
            other => panic!("Expected Spoken, got {:?}", other),
        }
        assert_eq!(r.pipeline.state(), PipelineState::Idle);
        assert_eq!(r.pipeline.turns().used(), 1);
        assert_eq!(r.pipeline.last_recording().len(), 32000);
        assert_eq!(
            r.status.messages(),
            vec!["Listening...", "Transcribing...", "Thinking...", "Speaking..."]
        );
        assert_eq!(r.activity.count(Activity::Started), 1);
        assert_eq!(r.activity.count(Activity::Idle), 1);
        assert!(!r.probe.amplifier_on());
    }

    #[test]
    fn test_chat_uses_transcript_and_system_prompt() {
        let mut r = rig();
        r.pipeline.trigger_voice_interaction();
        r.pipeline.run_to_idle();

        let body = r.transport.last_for("/chat/completions").unwrap().json().unwrap();
        assert_eq!(body["messages"][0]["content"], "You are kind.");
        assert_eq!(body["messages"][1]["content"], "why is the sky blue");
    }

    #[test]
    fn test_trigger_while_busy_is_rejected() {
        let mut r = rig();
        assert!(r.pipeline.trigger_voice_interaction());
        r.pipeline.step();
        r.pipeline.step();
        assert_eq!(r.pipeline.state(), PipelineState::Thinking);
        let requests_before = r.transport.request_count();
        let turns_before = r.pipeline.turns();

        assert!(!r.pipeline.trigger_voice_interaction());
        assert!(!r.pipeline.trigger_text_chat("hello"));

        assert_eq!(r.pipeline.state(), PipelineState::Thinking);
        assert_eq!(r.pipeline.turns(), turns_before);
        assert_eq!(r.transport.request_count(), requests_before);
        assert_eq!(r.activity.count(Activity::Started), 1);
    }

    #[test]
    fn test_text_chat_skips_recording() {
        let mut r = rig();
        assert!(r.pipeline.trigger_text_chat("tell me a joke"));
        assert_eq!(r.pipeline.state(), PipelineState::Thinking);

        match r.pipeline.run_to_idle() {
            Some(TurnOutcome::Spoken { transcript, .. }) => assert_eq!(transcript, None),
            other => panic!("Expected Spoken, got {:?}", other),
        }
        assert_eq!(r.probe.bytes_read(), 0);
        assert_eq!(r.transport.count_for("/audio/transcriptions"), 0);
    }

    #[test]
    fn test_budget_exhaustion_speaks_closing_without_chat_call() {
        let mut r = rig_with(happy_transport(), 2);
        for _ in 0..2 {
            r.pipeline.trigger_text_chat("again");
            assert!(r.pipeline.run_to_idle().unwrap().is_spoken());
        }
        assert_eq!(r.transport.count_for("/chat/completions"), 2);

        r.pipeline.trigger_text_chat("one more");
        match r.pipeline.run_to_idle() {
            Some(TurnOutcome::Spoken { reply, closing, .. }) => {
                assert!(closing);
                assert_eq!(reply, crate::defaults::CLOSING_MESSAGE);
            }
            other => panic!("Expected closing Spoken, got {:?}", other),
        }
        assert_eq!(r.transport.count_for("/chat/completions"), 2);
        assert_eq!(r.pipeline.turns().used(), 2);

        r.pipeline.reset();
        r.pipeline.trigger_text_chat("fresh start");
        r.pipeline.run_to_idle();
        assert_eq!(r.transport.count_for("/chat/completions"), 3);
    }

    #[test]
    fn test_empty_text_fails_without_calls() {
        let mut r = rig();
        r.pipeline.trigger_text_chat("   ");

        assert!(r.pipeline.step().is_none());
        assert_eq!(r.pipeline.state(), PipelineState::Failed);
        match r.pipeline.step() {
            Some(TurnOutcome::Failed { error, message }) => {
                assert!(matches!(error, VoltError::EmptyInput { .. }));
                assert_eq!(message, "fallback: EmptyInput");
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
        assert_eq!(r.pipeline.state(), PipelineState::Idle);
        assert_eq!(r.transport.request_count(), 0);
        assert_eq!(r.activity.count(Activity::Failed), 1);
        assert_eq!(r.status.last().as_deref(), Some("fallback: EmptyInput"));
    }

    #[test]
    fn test_transcription_connect_timeout_fails_cleanly() {
        let transport = MockTransport::new().with_transcription(MockReply::ConnectTimeout);
        let mut r = rig_with(transport, 10);
        r.pipeline.trigger_voice_interaction();

        match r.pipeline.run_to_idle() {
            Some(TurnOutcome::Failed { error, .. }) => {
                assert!(matches!(error, VoltError::Timeout { .. }))
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
        assert_eq!(r.pipeline.state(), PipelineState::Idle);
        assert_eq!(r.transport.count_for("/chat/completions"), 0);
    }

    #[test]
    fn test_auth_failure_latches_chat_off() {
        let transport = MockTransport::new()
            .with_transcription(MockReply::transcript("hi"))
            .with_chat(MockReply::status(401))
            .with_speech(MockReply::audio(100));
        let mut r = rig_with(transport, 10);

        r.pipeline.trigger_text_chat("hi");
        match r.pipeline.run_to_idle() {
            Some(TurnOutcome::Failed { error, .. }) => {
                assert!(matches!(error, VoltError::Auth { .. }))
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
        assert!(r.pipeline.auth_latched());
        assert_eq!(r.transport.count_for("/chat/completions"), 1);

        r.pipeline.trigger_voice_interaction();
        assert!(!r.pipeline.run_to_idle().unwrap().is_spoken());
        r.pipeline.trigger_text_chat("still there?");
        r.pipeline.run_to_idle();
        assert_eq!(r.transport.count_for("/chat/completions"), 1);

        r.pipeline.clear_auth_latch();
        r.pipeline.trigger_text_chat("now?");
        r.pipeline.run_to_idle();
        assert_eq!(r.transport.count_for("/chat/completions"), 2);
    }

    #[test]
    fn test_auth_latch_clears_when_key_changes() {
        let transport = MockTransport::new().with_chat(MockReply::status(401));
        let mut r = rig_with(transport, 10);
        r.pipeline.trigger_text_chat("hi");
        r.pipeline.run_to_idle();
        assert!(r.pipeline.auth_latched());

        r.credentials.set_key(Some("sk-replaced-9876543210".to_string()));
        assert!(!r.pipeline.auth_latched());
    }

    #[test]
    fn test_offline_fails_before_any_request() {
        let mut r = rig();
        r.network.set_connected(false);
        r.pipeline.trigger_voice_interaction();

        match r.pipeline.run_to_idle() {
            Some(TurnOutcome::Failed { error, .. }) => {
                assert!(matches!(error, VoltError::NetworkUnavailable { .. }))
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
        assert_eq!(r.transport.request_count(), 0);
        assert!(!r.pipeline.auth_latched());
    }

    #[test]
    fn test_failed_chat_does_not_count_turn() {
        let transport = MockTransport::new().with_chat(MockReply::status(500));
        let mut r = rig_with(transport, 10);
        r.pipeline.trigger_text_chat("hi");
        r.pipeline.run_to_idle();
        assert_eq!(r.pipeline.turns().used(), 0);
    }

    #[test]
    fn test_speech_failure_after_chat_keeps_turn() {
        let transport = MockTransport::new()
            .with_chat(MockReply::chat("hello"))
            .with_speech(MockReply::status(503));
        let mut r = rig_with(transport, 10);
        r.pipeline.trigger_text_chat("hi");

        match r.pipeline.run_to_idle() {
            Some(TurnOutcome::Failed { error, .. }) => {
                assert!(matches!(error, VoltError::Server { status: 503, .. }))
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
        assert_eq!(r.pipeline.turns().used(), 1);
        assert!(!r.probe.amplifier_on());
    }

    #[test]
    fn test_disabled_chat_rejects_triggers() {
        let mut r = rig();
        r.pipeline.settings.chat_enabled = false;

        assert!(!r.pipeline.trigger_voice_interaction());
        assert!(!r.pipeline.trigger_text_chat("hi"));
        assert_eq!(r.pipeline.state(), PipelineState::Idle);
        assert_eq!(r.status.last().as_deref(), Some("Chat is disabled"));
        assert_eq!(r.activity.count(Activity::Started), 0);
    }

    #[test]
    fn test_step_when_idle_does_nothing() {
        let mut r = rig();
        assert!(r.pipeline.step().is_none());
        assert!(r.pipeline.run_to_idle().is_none());
        assert!(r.status.messages().is_empty());
    }
}
