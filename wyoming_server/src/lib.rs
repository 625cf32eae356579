//! Wyoming protocol server for a voice-cloning text-to-speech model.
//!
//! Clients send `describe` and `synthesize` events; every synthesis is
//! answered with `audio-start`, a run of `audio-chunk` events carrying
//! 16-bit PCM, and `audio-stop`.

pub mod config;
pub mod error;
pub mod handler;
pub mod info;
pub mod metrics;
pub mod protocol;
pub mod server;

pub use config::{Cli, Endpoint, ServerConfig};
pub use error::ServerError;
pub use handler::{EventHandler, SynthesisContext};
pub use protocol::{Event, WyomingCodec};
