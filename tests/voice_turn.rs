use std::sync::Arc;
use volt_voice::audio::driver::Direction;
use volt_voice::audio::duplex::{AudioDuplexController, DuplexSettings};
use volt_voice::audio::mock::{MockDriverProbe, MockI2sDriver};
use volt_voice::audio::pcm::PcmBuffer;
use volt_voice::audio::player::{Player, PlayerConfig};
use volt_voice::audio::recorder::{Recorder, RecorderConfig};
use volt_voice::clock::MockClock;
use volt_voice::net::{MockReply, MockTransport};
use volt_voice::persona::{Persona, PersonaFallback};
use volt_voice::pipeline::{
    Activity, CountingNotifier, PipelineCollaborators, PipelineResources, PipelineServices,
    PipelineSettings, PipelineState, RecordingStatusSink, StaticCredentials, StaticNetwork,
    TurnOutcome, VoicePipeline,
};
use volt_voice::services::{
    ChatSettings, ConversationClient, ServiceContext, SpeechSettings, SpeechSynthesisClient,
    TranscriptionClient, TranscriptionSettings,
};
use volt_voice::{ErrorKind, VoltError};

struct Harness {
    pipeline: VoicePipeline<MockI2sDriver, MockClock>,
    transport: Arc<MockTransport>,
    status: Arc<RecordingStatusSink>,
    activity: Arc<CountingNotifier>,
    probe: MockDriverProbe,
}

fn harness(transport: MockTransport, turn_budget: u32) -> Harness {
    harness_with_driver(
        transport,
        turn_budget,
        MockI2sDriver::new().with_samples(&[1200, 600, 0, -600, -1200]),
    )
}

fn harness_with_driver(transport: MockTransport, turn_budget: u32, driver: MockI2sDriver) -> Harness {
    let transport = Arc::new(transport);
    let credentials = Arc::new(StaticCredentials::new(Some("sk-integration-0123".to_string())));
    let context = ServiceContext::new(
        transport.clone(),
        Arc::new(StaticNetwork::new(true)),
        credentials.clone(),
        "https://api.example.test/v1",
    );
    let clock = MockClock::new();
    let probe = driver.probe();
    let status = Arc::new(RecordingStatusSink::new());
    let activity = Arc::new(CountingNotifier::new());
    let persona = Persona::default();

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
            status: status.clone(),
            activity: activity.clone(),
            fallback: Arc::new(PersonaFallback::new(persona.clone())),
            credentials,
        },
        PipelineSettings {
            record_seconds: 1,
            turn_budget,
            system_prompt: persona.system_prompt(),
            chat_enabled: true,
        },
    );

    Harness {
        pipeline,
        transport,
        status,
        activity,
        probe,
    }
}

fn scripted() -> MockTransport {
    MockTransport::new()
        .with_transcription(MockReply::transcript("can you tell me a story"))
        .with_chat(MockReply::chat("Once upon a time there was a brave little robot."))
        .with_speech(MockReply::chunked_audio(24_000))
}

#[test]
fn full_voice_turn_uploads_exact_wav_and_plays_reply() {
    let mut h = harness(scripted(), 10);

    assert!(h.pipeline.trigger_voice_interaction());
    let outcome = h.pipeline.run_to_idle();

    match outcome {
        Some(TurnOutcome::Spoken {
            transcript, reply, ..
        }) => {
            assert_eq!(transcript.as_deref(), Some("can you tell me a story"));
            assert!(reply.starts_with("Once upon a time"));
        }
        other => panic!("Expected Spoken, got {:?}", other),
    }

    let upload = h.transport.last_for("/audio/transcriptions").unwrap();
    assert!(upload.content_type.starts_with("multipart/form-data; boundary=----VoltFormBoundary"));
    assert_eq!(upload.declared_len, upload.body.len() as u64);
    assert_eq!(upload.api_key, "sk-integration-0123");
    let riff = upload
        .body
        .windows(4)
        .position(|w| w == b"RIFF")
        .unwrap();
    let wav_len = u32::from_le_bytes(upload.body[riff + 40..riff + 44].try_into().unwrap());
    assert_eq!(wav_len, 32_000);

    let chat = h.transport.last_for("/chat/completions").unwrap().json().unwrap();
    assert!(chat["messages"][0]["content"].as_str().unwrap().contains("VOLT"));

    assert_eq!(h.pipeline.state(), PipelineState::Idle);
    assert_eq!(h.pipeline.turns().used(), 1);
    assert_eq!(h.activity.count(Activity::Started), 1);
    assert_eq!(h.activity.count(Activity::Idle), 1);
    assert!(!h.probe.amplifier_on());
}

#[test]
fn busy_trigger_changes_nothing() {
    let mut h = harness(scripted(), 10);
    h.pipeline.trigger_voice_interaction();
    h.pipeline.step();

    let calls = h.transport.request_count();
    assert!(!h.pipeline.trigger_text_chat("interrupt!"));
    assert!(!h.pipeline.trigger_voice_interaction());

    assert_eq!(h.pipeline.state(), PipelineState::Transcribing);
    assert_eq!(h.transport.request_count(), calls);
    assert_eq!(h.pipeline.turns().used(), 0);
}

#[test]
fn budget_reached_speaks_closing_message_without_chat() {
    let mut h = harness(scripted(), 3);
    for _ in 0..3 {
        h.pipeline.trigger_text_chat("more please");
        h.pipeline.run_to_idle();
    }
    let chat_calls = h.transport.count_for("/chat/completions");
    assert_eq!(chat_calls, 3);

    h.pipeline.trigger_text_chat("and another");
    match h.pipeline.run_to_idle() {
        Some(TurnOutcome::Spoken { closing, reply, .. }) => {
            assert!(closing);
            assert!(reply.contains("break"));
        }
        other => panic!("Expected closing message, got {:?}", other),
    }
    assert_eq!(h.transport.count_for("/chat/completions"), chat_calls);
    assert_eq!(h.transport.count_for("/audio/speech"), 4);
}

#[test]
fn transcription_timeout_ends_in_fallback() {
    let transport = MockTransport::new().with_transcription(MockReply::ConnectTimeout);
    let mut h = harness(transport, 10);
    h.pipeline.trigger_voice_interaction();

    match h.pipeline.run_to_idle() {
        Some(TurnOutcome::Failed { error, message }) => {
            assert_eq!(error.kind(), ErrorKind::Timeout);
            assert!(message.contains("too long"));
        }
        other => panic!("Expected Failed, got {:?}", other),
    }
    assert_eq!(h.status.last().as_deref(), Some("VOLT took too long to answer. Let's try again!"));
    assert_eq!(h.activity.count(Activity::Failed), 1);
    assert_eq!(h.pipeline.state(), PipelineState::Idle);
}

#[test]
fn unauthorized_chat_disables_chat_until_cleared() {
    let transport = MockTransport::new()
        .with_transcription(MockReply::transcript("hello"))
        .with_chat(MockReply::status(401))
        .with_speech(MockReply::audio(480));
    let mut h = harness(transport, 10);

    h.pipeline.trigger_voice_interaction();
    match h.pipeline.run_to_idle() {
        Some(TurnOutcome::Failed {
            error: VoltError::Auth { .. },
            ..
        }) => {}
        other => panic!("Expected Auth failure, got {:?}", other),
    }
    assert_eq!(h.pipeline.state(), PipelineState::Idle);

    for _ in 0..2 {
        h.pipeline.trigger_voice_interaction();
        h.pipeline.run_to_idle();
    }
    assert_eq!(h.transport.count_for("/chat/completions"), 1);
    assert_eq!(h.transport.count_for("/audio/speech"), 0);

    h.pipeline.clear_auth_latch();
    h.pipeline.trigger_text_chat("try again");
    h.pipeline.run_to_idle();
    assert_eq!(h.transport.count_for("/chat/completions"), 2);
}

#[test]
fn empty_text_chat_makes_no_calls() {
    let mut h = harness(scripted(), 10);
    h.pipeline.trigger_text_chat("");

    match h.pipeline.run_to_idle() {
        Some(TurnOutcome::Failed { error, .. }) => assert_eq!(error.kind(), ErrorKind::EmptyInput),
        other => panic!("Expected EmptyInput failure, got {:?}", other),
    }
    assert_eq!(h.transport.request_count(), 0);
}

#[test]
fn oversized_speech_stream_completes_with_fixed_chunk() {
    let total: u64 = 256 * 1024 * 1024;
    let transport = MockTransport::new()
        .with_chat(MockReply::chat("a very long answer"))
        .with_speech(MockReply::chunked_audio(total));
    let mut h = harness(transport, 10);

    h.pipeline.trigger_text_chat("talk forever");
    let outcome = h.pipeline.run_to_idle().unwrap();

    assert!(outcome.is_spoken());
    assert!(h.probe.bytes_written() >= total);
    assert!(h.probe.largest_write() <= 2048);
}

#[test]
fn capture_install_failure_fails_only_the_current_turn() {
    let driver = MockI2sDriver::new().with_install_failure(Direction::Capture);
    let mut h = harness_with_driver(scripted(), 10, driver);

    assert!(h.pipeline.trigger_voice_interaction());
    match h.pipeline.run_to_idle() {
        Some(TurnOutcome::Failed { error, message }) => {
            assert_eq!(error.kind(), ErrorKind::Hardware);
            assert_eq!(message, "VOLT can't hear or speak right now.");
        }
        other => panic!("Expected hardware failure, got {:?}", other),
    }
    assert_eq!(h.pipeline.state(), PipelineState::Idle);
    assert_eq!(h.transport.request_count(), 0);
    assert_eq!(h.activity.count(Activity::Failed), 1);
    assert!(!h.probe.amplifier_on());

    assert!(h.pipeline.trigger_text_chat("are you there?"));
    let outcome = h.pipeline.run_to_idle().unwrap();
    assert!(outcome.is_spoken());
    assert_eq!(h.pipeline.turns().used(), 1);
}

#[test]
fn playback_install_failure_after_speech_response_fails_the_turn() {
    let driver = MockI2sDriver::new().with_install_failure(Direction::Playback);
    let mut h = harness_with_driver(scripted(), 10, driver);

    assert!(h.pipeline.trigger_text_chat("sing me a song"));
    match h.pipeline.run_to_idle() {
        Some(TurnOutcome::Failed { error, .. }) => assert_eq!(error.kind(), ErrorKind::Hardware),
        other => panic!("Expected hardware failure, got {:?}", other),
    }
    assert_eq!(h.transport.count_for("/audio/speech"), 1);
    assert_eq!(h.pipeline.state(), PipelineState::Idle);
    assert_eq!(
        h.status.last().as_deref(),
        Some("VOLT can't hear or speak right now.")
    );
    assert!(!h.probe.amplifier_on());

    assert!(h.pipeline.trigger_voice_interaction());
    h.pipeline.run_to_idle();
    assert_eq!(h.transport.count_for("/audio/transcriptions"), 1);
    assert_eq!(h.transport.count_for("/audio/speech"), 2);
    assert_eq!(h.pipeline.state(), PipelineState::Idle);
}

#[test]
fn unreachable_host_ends_in_offline_message() {
    let transport = MockTransport::new().with_transcription(MockReply::Offline);
    let mut h = harness(transport, 10);
    h.pipeline.trigger_voice_interaction();

    match h.pipeline.run_to_idle() {
        Some(TurnOutcome::Failed { error, message }) => {
            assert_eq!(error.kind(), ErrorKind::NetworkUnavailable);
            assert!(message.contains("offline"));
        }
        other => panic!("Expected network failure, got {:?}", other),
    }
    assert_eq!(h.pipeline.state(), PipelineState::Idle);
}
