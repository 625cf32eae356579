//! The speech generation capability and the handles the server uses to
//! reach it.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use anyhow::{bail, Context};
use tracing::debug;

use crate::{wav, Waveform};

/// A voice-cloning generator: text plus a reference recording in, one
/// complete waveform out.
///
/// Calls are blocking and may take seconds. `&mut self` means a model is
/// never entered twice at once; share it through [`SharedModel`].
pub trait SpeechModel: Send + 'static {
    fn generate(&mut self, text: &str, reference: &Path) -> anyhow::Result<Waveform>;
}

impl<F> SpeechModel for F
where
    F: FnMut(&str, &Path) -> anyhow::Result<Waveform> + Send + 'static,
{
    fn generate(&mut self, text: &str, reference: &Path) -> anyhow::Result<Waveform> {
        self(text, reference)
    }
}

/// Process-wide model handle. Generation is serialised behind a mutex, so
/// concurrent requests queue instead of entering the model together.
#[derive(Clone)]
pub struct SharedModel {
    inner: Arc<Mutex<Box<dyn SpeechModel>>>,
}

impl SharedModel {
    pub fn new<M: SpeechModel>(model: M) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(model))),
        }
    }

    /// Run one generation on the calling thread, waiting for the model if
    /// another request holds it. Call from a blocking context.
    pub fn generate_blocking(&self, text: &str, reference: &Path) -> anyhow::Result<Waveform> {
        let mut model = self.inner.lock().map_err(|_| {
            anyhow::anyhow!(
                "Model lock poisoned - a previous generation panicked. Please restart the server."
            )
        })?;
        model.generate(text, reference)
    }
}

impl std::fmt::Debug for SharedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedModel")
            .field("model", &"<dyn SpeechModel>")
            .finish()
    }
}

/// Drives an external generator program.
///
/// The program is run as `PROGRAM [ARGS...] --voice-ref PATH --device DEVICE`,
/// receives the text on stdin and must write a WAV file to stdout.
#[derive(Debug, Clone)]
pub struct CommandModel {
    program: PathBuf,
    args: Vec<OsString>,
    device: String,
}

/// Bytes of stderr kept for error messages.
const STDERR_TAIL: usize = 2048;

impl CommandModel {
    pub fn new<P: Into<PathBuf>>(program: P, device: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            device: device.into(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

impl SpeechModel for CommandModel {
    fn generate(&mut self, text: &str, reference: &Path) -> anyhow::Result<Waveform> {
        let started = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--voice-ref")
            .arg(reference)
            .arg("--device")
            .arg(&self.device)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start model command {}", self.program.display()))?;

        // stdin is fed concurrently with draining stdout/stderr
        let writer = child.stdin.take().map(|mut stdin| {
            let text = text.as_bytes().to_vec();
            thread::spawn(move || stdin.write_all(&text))
        });

        let output = child
            .wait_with_output()
            .context("Failed to wait for model command")?;

        let write_result = match writer {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow::anyhow!("stdin writer for model command panicked"))?,
            None => Ok(()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail_start = stderr.len().saturating_sub(STDERR_TAIL);
            let tail_start = (tail_start..stderr.len())
                .find(|&i| stderr.is_char_boundary(i))
                .unwrap_or(stderr.len());
            bail!(
                "model command exited with {}: {}",
                output.status,
                stderr[tail_start..].trim()
            );
        }
        if let Err(e) = write_result {
            // the generator succeeded without reading all of its input
            debug!("Model command did not read the full text: {e}");
        }
        if output.stdout.is_empty() {
            bail!("model command produced no audio");
        }

        let waveform = wav::decode_wav(&output.stdout)?;
        debug!(
            "Model command produced {} samples at {} Hz in {:.2}s",
            waveform.len(),
            waveform.sample_rate,
            started.elapsed().as_secs_f64()
        );
        Ok(waveform)
    }
}
