//! Shared helpers for the Wyoming server tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tts_core::{SharedModel, Waveform};

use wyoming_server::error::ServerError;
use wyoming_server::handler::{EventHandler, SynthesisContext};
use wyoming_server::protocol::{
    Event, WyomingCodec, AUDIO_CHUNK, AUDIO_START, AUDIO_STOP, SYNTHESIZE,
};
use wyoming_server::server::serve_connection;

pub const SAMPLE_RATE: u32 = 24_000;

/// Samples generated per character of input text
pub const SAMPLES_PER_CHAR: usize = 2400;

pub type Client = Framed<DuplexStream, WyomingCodec>;

/// Deterministic stand-in for the real model: a quiet sine wave whose
/// length depends on the text.
pub fn tone(text: &str) -> Waveform {
    let n = text.chars().count() * SAMPLES_PER_CHAR;
    let samples = (0..n)
        .map(|i| 0.1 * (i as f32 * 440.0 * std::f32::consts::TAU / SAMPLE_RATE as f32).sin())
        .collect();
    Waveform::from_vec(samples, SAMPLE_RATE)
}

pub fn tone_model() -> SharedModel {
    SharedModel::new(|text: &str, _: &Path| -> anyhow::Result<Waveform> { Ok(tone(text)) })
}

/// Fails for the text "fail", otherwise behaves like [`tone_model`].
pub fn flaky_model() -> SharedModel {
    SharedModel::new(|text: &str, _: &Path| -> anyhow::Result<Waveform> {
        if text == "fail" {
            anyhow::bail!("CUDA out of memory");
        }
        Ok(tone(text))
    })
}

/// Records how many generations ran at once.
pub struct ConcurrencyProbe {
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
}

pub fn slow_model(delay: Duration) -> (SharedModel, Arc<ConcurrencyProbe>) {
    let probe = Arc::new(ConcurrencyProbe {
        active: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let seen = Arc::clone(&probe);
    let model = SharedModel::new(move |text: &str, _: &Path| -> anyhow::Result<Waveform> {
        let now = seen.active.fetch_add(1, Ordering::SeqCst) + 1;
        seen.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(delay);
        seen.active.fetch_sub(1, Ordering::SeqCst);
        Ok(tone(text))
    });
    (model, probe)
}

pub fn context(model: SharedModel) -> Arc<SynthesisContext> {
    Arc::new(SynthesisContext::new(model, "voice.wav"))
}

/// Serve one connection over an in-memory pipe.
pub fn connect(ctx: Arc<SynthesisContext>) -> (Client, JoinHandle<Result<(), ServerError>>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let handle = tokio::spawn(serve_connection(server, EventHandler::new(ctx)));
    (Framed::new(client, WyomingCodec::new()), handle)
}

pub fn synthesize_event(text: &str) -> Event {
    Event::new(SYNTHESIZE)
        .with_data(&json!({ "text": text }))
        .unwrap()
}

pub async fn send(client: &mut Client, event: Event) {
    client.send(event).await.unwrap();
}

pub async fn recv(client: &mut Client) -> Event {
    tokio::time::timeout(Duration::from_secs(10), client.next())
        .await
        .expect("timed out waiting for an event")
        .expect("connection closed")
        .expect("failed to decode event")
}

/// Read events up to and including `audio-stop`.
pub async fn collect_audio(client: &mut Client) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        let event = recv(client).await;
        let done = event.event_type == AUDIO_STOP;
        events.push(event);
        if done {
            return events;
        }
    }
}

/// Concatenated chunk payloads of one audio sequence.
pub fn pcm_of(events: &[Event]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| e.payload.as_deref())
        .flatten()
        .copied()
        .collect()
}

pub fn event_types(events: &[Event]) -> Vec<&str> {
    events.iter().map(|e| e.event_type.as_str()).collect()
}

/// `audio-start`, `chunks` x `audio-chunk`, `audio-stop`
pub fn audio_sequence(chunks: usize) -> Vec<&'static str> {
    let mut types = vec![AUDIO_START];
    types.extend(std::iter::repeat(AUDIO_CHUNK).take(chunks));
    types.push(AUDIO_STOP);
    types
}
