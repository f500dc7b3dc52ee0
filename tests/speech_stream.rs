//! Speech streaming over a real socket.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use volt_voice::audio::duplex::{AudioDuplexController, DuplexSettings};
use volt_voice::audio::mock::MockI2sDriver;
use volt_voice::audio::player::{Player, StreamEnd};
use volt_voice::config::Config;
use volt_voice::net::ReqwestTransport;
use volt_voice::pipeline::{StaticCredentials, StaticNetwork};
use volt_voice::services::{ServiceContext, SpeechSynthesisClient};
use volt_voice::SystemClock;

/// Answers one request with a single 1024-byte chunk, then holds the
/// connection open without sending more until told to stop.
fn stalling_server() -> (String, mpsc::Sender<()>, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();

    let handle = thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        let mut request = [0u8; 8192];
        let _ = socket.read(&mut request).unwrap();
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: audio/pcm\r\ntransfer-encoding: chunked\r\n\r\n400\r\n",
            )
            .unwrap();
        socket.write_all(&[0x10; 1024]).unwrap();
        socket.write_all(b"\r\n").unwrap();
        socket.flush().unwrap();
        let _ = stop_rx.recv_timeout(Duration::from_secs(20));
    });

    (format!("http://{addr}/v1"), stop_tx, handle)
}

#[test]
fn stalled_speech_stream_ends_after_configured_idle_timeout() {
    let (base_url, stop, server) = stalling_server();

    let mut config = Config::default();
    config.api.base_url = base_url.clone();
    config.api.read_timeout_ms = 6_000;
    config.tts.idle_timeout_ms = 500;

    let transport = Arc::new(ReqwestTransport::new(config.speech_transport_settings()).unwrap());
    let context = ServiceContext::new(
        transport,
        Arc::new(StaticNetwork::new(true)),
        Arc::new(StaticCredentials::new(Some("sk-socket-test-0123".to_string()))),
        base_url,
    );
    let client = SpeechSynthesisClient::new(context, config.speech_settings());
    let mut audio = AudioDuplexController::new(MockI2sDriver::new(), DuplexSettings::default());
    let mut player = Player::new(config.player_config(), SystemClock);

    let started = Instant::now();
    let report = client.speak("hello there", &mut audio, &mut player).unwrap();
    let elapsed = started.elapsed();

    stop.send(()).unwrap();
    server.join().unwrap();

    assert_eq!(report.bytes_played, 1024);
    assert_eq!(report.ended_by, StreamEnd::IdleTimeout);
    assert!(
        elapsed < Duration::from_secs(3),
        "stream should end near the 500ms idle timeout, took {:?}",
        elapsed
    );
}

#[test]
fn speech_transport_reads_time_out_on_idle_interval() {
    let mut config = Config::default();
    config.api.read_timeout_ms = 15_000;
    config.tts.idle_timeout_ms = 2_000;

    let speech = config.speech_transport_settings();
    assert_eq!(speech.read_timeout, Duration::from_secs(2));
    assert_eq!(speech.connect_timeout, config.transport_settings().connect_timeout);
    assert_eq!(config.transport_settings().read_timeout, Duration::from_secs(15));
}
