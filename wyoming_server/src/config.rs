// Command line / environment configuration for the server

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use tts_core::{AudioFormat, DEFAULT_GAIN};

use crate::error::ServerError;

/// Wyoming server for a voice-cloning TTS model
#[derive(Parser, Debug, Clone)]
#[command(name = "wyoming-voice-clone")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Server URI (e.g., tcp://0.0.0.0:10201)
    #[arg(long, env = "WYOMING_URI")]
    pub uri: String,

    /// Path to voice reference WAV file (10-30s of speech)
    #[arg(long, env = "VOICE_REF")]
    pub voice_ref: PathBuf,

    /// Output volume multiplier
    #[arg(long, default_value_t = DEFAULT_GAIN, env = "VOLUME_BOOST")]
    pub volume_boost: f32,

    /// Compute device passed to the model: cuda or cpu
    #[arg(long, default_value = "cuda", env = "TTS_DEVICE")]
    pub device: String,

    /// Generator program: reads text on stdin, writes WAV to stdout
    #[arg(long, env = "MODEL_COMMAND")]
    pub model_command: PathBuf,

    /// Extra argument for the generator program (repeatable)
    #[arg(long = "model-arg", allow_hyphen_values = true)]
    pub model_args: Vec<String>,

    /// Output sample rate in Hz
    #[arg(long, default_value_t = 24_000, env = "SAMPLE_RATE")]
    pub sample_rate: u32,

    /// Duration of each audio chunk in milliseconds
    #[arg(long, default_value_t = 100, env = "FRAME_MS",
          value_parser = clap::value_parser!(u32).range(1..))]
    pub frame_ms: u32,

    /// Text synthesized once at startup to warm the model up
    #[arg(long, default_value = "Ready.")]
    pub warmup_text: String,

    /// Skip the startup warm-up
    #[arg(long)]
    pub no_warmup: bool,

    /// Address for the HTTP health/metrics endpoint (disabled when unset)
    #[arg(long, env = "METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

/// Where the Wyoming listener binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port`
    Tcp(String),
    #[cfg(unix)]
    Unix(PathBuf),
}

impl FromStr for Endpoint {
    type Err = ServerError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let uri = uri.trim();
        if let Some(addr) = uri.strip_prefix("tcp://") {
            let (host, port) = addr
                .rsplit_once(':')
                .ok_or_else(|| ServerError::Config(format!("missing port in URI: {uri}")))?;
            if host.is_empty() {
                return Err(ServerError::Config(format!("missing host in URI: {uri}")));
            }
            port.parse::<u16>()
                .map_err(|_| ServerError::Config(format!("invalid port in URI: {uri}")))?;
            return Ok(Endpoint::Tcp(addr.to_string()));
        }
        if let Some(path) = uri.strip_prefix("unix://") {
            return unix_endpoint(uri, path);
        }
        Err(ServerError::Config(format!(
            "unsupported URI: {uri} (expected tcp://HOST:PORT or unix://PATH)"
        )))
    }
}

#[cfg(unix)]
fn unix_endpoint(uri: &str, path: &str) -> Result<Endpoint, ServerError> {
    if path.is_empty() {
        return Err(ServerError::Config(format!("missing socket path in URI: {uri}")));
    }
    Ok(Endpoint::Unix(PathBuf::from(path)))
}

#[cfg(not(unix))]
fn unix_endpoint(uri: &str, _path: &str) -> Result<Endpoint, ServerError> {
    Err(ServerError::Config(format!("unix sockets are not supported on this platform: {uri}")))
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub endpoint: Endpoint,
    pub voice_ref: PathBuf,
    pub gain: f32,
    pub device: String,
    pub model_command: PathBuf,
    pub model_args: Vec<String>,
    pub format: AudioFormat,
    pub frame_ms: u32,
    pub warmup_text: Option<String>,
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Tcp("0.0.0.0:10201".into()),
            voice_ref: PathBuf::from("voice.wav"),
            gain: DEFAULT_GAIN,
            device: "cuda".into(),
            model_command: PathBuf::from("chatterbox-generate"),
            model_args: Vec::new(),
            format: AudioFormat::SPEECH_24K,
            frame_ms: 100,
            warmup_text: Some("Ready.".into()),
            metrics_addr: None,
        }
    }
}

impl ServerConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, ServerError> {
        let endpoint = cli.uri.parse()?;
        Ok(Self {
            endpoint,
            voice_ref: cli.voice_ref,
            gain: cli.volume_boost,
            device: cli.device,
            model_command: cli.model_command,
            model_args: cli.model_args,
            format: AudioFormat {
                rate: cli.sample_rate,
                ..AudioFormat::SPEECH_24K
            },
            frame_ms: cli.frame_ms,
            warmup_text: (!cli.no_warmup).then_some(cli.warmup_text),
            metrics_addr: cli.metrics_addr,
        })
    }

    /// Checks that must pass before the model is loaded.
    pub fn validate(&self) -> Result<(), ServerError> {
        if !self.voice_ref.exists() {
            return Err(ServerError::Config(format!(
                "Voice reference file not found: {}",
                self.voice_ref.display()
            )));
        }
        if !self.gain.is_finite() || self.gain < 0.0 {
            return Err(ServerError::Config(format!(
                "Volume boost must be a non-negative number, got {}",
                self.gain
            )));
        }
        if self.format.rate == 0 {
            return Err(ServerError::Config("Sample rate must be positive".into()));
        }
        if self.frame_ms == 0 {
            return Err(ServerError::Config("Frame duration must be positive".into()));
        }
        Ok(())
    }
}
