//! Event dispatch and the synthesis request lifecycle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{Sink, SinkExt};
use tracing::{debug, error, info, warn};
use tts_core::{frame_sequence, postprocess, AudioFormat, SharedModel, DEFAULT_GAIN};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::info::describe;
use crate::metrics::SynthesisMetrics;
use crate::protocol::{Event, ProtocolError, Synthesize, DESCRIBE, SYNTHESIZE};

/// Process-wide state every request reads: built once at startup, never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct SynthesisContext {
    pub model: SharedModel,
    pub voice_ref: PathBuf,
    pub gain: f32,
    pub format: AudioFormat,
    pub frame_ms: u32,
    pub metrics: SynthesisMetrics,
}

impl SynthesisContext {
    pub fn new(model: SharedModel, voice_ref: impl Into<PathBuf>) -> Self {
        Self {
            model,
            voice_ref: voice_ref.into(),
            gain: DEFAULT_GAIN,
            format: AudioFormat::SPEECH_24K,
            frame_ms: 100,
            metrics: SynthesisMetrics::new(),
        }
    }

    pub fn from_config(config: &ServerConfig, model: SharedModel) -> Self {
        Self {
            gain: config.gain,
            format: config.format,
            frame_ms: config.frame_ms,
            ..Self::new(model, config.voice_ref.clone())
        }
    }

    /// Run one generation with the voice reference and discard the audio.
    pub async fn warm_up(&self, text: &str) -> Result<Duration, ServerError> {
        let started = Instant::now();
        let model = self.model.clone();
        let voice_ref = self.voice_ref.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || model.generate_blocking(&text, &voice_ref))
            .await?
            .map_err(ServerError::Synthesis)?;
        Ok(started.elapsed())
    }
}

/// Handles the events of one connection, strictly in arrival order.
#[derive(Debug, Clone)]
pub struct EventHandler {
    ctx: Arc<SynthesisContext>,
}

impl EventHandler {
    pub fn new(ctx: Arc<SynthesisContext>) -> Self {
        Self { ctx }
    }

    pub fn metrics(&self) -> &SynthesisMetrics {
        &self.ctx.metrics
    }

    /// Dispatch one inbound event.
    ///
    /// Request-scoped failures are reported to the client as an `error`
    /// event; only transport failures come back as `Err`, which ends the
    /// connection.
    pub async fn handle_event<S>(&self, event: Event, out: &mut S) -> Result<(), ServerError>
    where
        S: Sink<Event, Error = ProtocolError> + Unpin,
    {
        match event.event_type.as_str() {
            DESCRIBE => {
                out.send(describe().event()?).await?;
                debug!("Sent info");
            }
            SYNTHESIZE => {
                let result = match event.parse_data::<Synthesize>() {
                    Ok(request) => self.synthesize(&request.text, out).await,
                    Err(e) => Err(ServerError::InvalidRequest(e.to_string())),
                };
                if let Err(e) = result {
                    if !e.is_request_scoped() {
                        return Err(e);
                    }
                    error!("{e}");
                    self.ctx.metrics.record_error();
                    out.send(e.to_event()).await?;
                }
            }
            other => debug!("Ignoring event: {other}"),
        }
        Ok(())
    }

    /// Generate speech for `text` and write the full start / chunk* / stop
    /// sequence to `out`.
    ///
    /// Nothing is written until the model has finished, so a failed
    /// generation never leaves a half-open audio stream.
    pub async fn synthesize<S>(&self, text: &str, out: &mut S) -> Result<(), ServerError>
    where
        S: Sink<Event, Error = ProtocolError> + Unpin,
    {
        info!("Synthesizing: {}", text);
        let started = Instant::now();

        let ctx = Arc::clone(&self.ctx);
        let request_text = text.to_string();
        let (pcm, samples, model_rate) = tokio::task::spawn_blocking(move || {
            let waveform = ctx.model.generate_blocking(&request_text, &ctx.voice_ref)?;
            let pcm = postprocess(&waveform.samples, ctx.gain);
            Ok::<_, anyhow::Error>((pcm, waveform.len(), waveform.sample_rate))
        })
        .await?
        .map_err(ServerError::Synthesis)?;

        let format = self.ctx.format;
        if model_rate != 0 && model_rate != format.rate {
            warn!(
                "Model produced {} Hz audio, streaming it labelled as {} Hz",
                model_rate, format.rate
            );
        }
        debug!(
            "Generated {} samples ({} bytes) in {:.2}s",
            samples,
            pcm.len(),
            started.elapsed().as_secs_f64()
        );

        for frame in frame_sequence(&pcm, format, self.ctx.frame_ms) {
            out.send(Event::from(frame)).await?;
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        self.ctx.metrics.record_synthesis(latency_ms, samples);
        info!("Synthesis complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tts_core::Waveform;

    fn context<F>(model: F) -> Arc<SynthesisContext>
    where
        F: FnMut(&str, &Path) -> anyhow::Result<Waveform> + Send + 'static,
    {
        Arc::new(SynthesisContext::new(SharedModel::new(model), "voice.wav"))
    }

    #[test]
    fn test_context_from_config() {
        let config = ServerConfig {
            gain: 1.25,
            frame_ms: 40,
            ..Default::default()
        };
        let model = SharedModel::new(|_: &str, _: &Path| -> anyhow::Result<Waveform> {
            Ok(Waveform::from_vec(vec![], 24_000))
        });
        let ctx = SynthesisContext::from_config(&config, model);
        assert_eq!(ctx.gain, 1.25);
        assert_eq!(ctx.frame_ms, 40);
        assert_eq!(ctx.voice_ref, config.voice_ref);
    }

    #[tokio::test]
    async fn test_warm_up_uses_voice_ref() {
        let ctx = context(|text: &str, reference: &Path| {
            assert_eq!(text, "Ready.");
            assert_eq!(reference, Path::new("voice.wav"));
            Ok(Waveform::from_vec(vec![0.0; 10], 24_000))
        });
        assert!(ctx.warm_up("Ready.").await.is_ok());
    }

    #[tokio::test]
    async fn test_handle_event_reports_request_errors_in_band() {
        let handler = EventHandler::new(context(|_: &str, _: &Path| {
            Err(anyhow::anyhow!("model crashed"))
        }));
        let mut out = Vec::<Event>::new()
            .sink_map_err(|never: std::convert::Infallible| -> ProtocolError { match never {} });

        handler.handle_event(Event::new(DESCRIBE), &mut out).await.unwrap();
        handler.handle_event(Event::new("ping"), &mut out).await.unwrap();
        handler
            .handle_event(Event::new(SYNTHESIZE), &mut out)
            .await
            .unwrap();

        let types: Vec<&str> = out.get_ref().iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec![crate::protocol::INFO, crate::protocol::ERROR]);
        assert_eq!(handler.metrics().snapshot().error_count, 1);
    }

    #[tokio::test]
    async fn test_warm_up_failure() {
        let ctx = context(|_: &str, _: &Path| Err(anyhow::anyhow!("weights missing")));
        let err = ctx.warm_up("Ready.").await.unwrap_err();
        assert!(matches!(err, ServerError::Synthesis(_)));
    }
}
