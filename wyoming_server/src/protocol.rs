//! Wyoming protocol events and their framing.
//!
//! Each event is one line of JSON (the header), optionally followed by
//! `data_length` bytes of JSON data and `payload_length` bytes of binary
//! payload.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use tts_core::{AudioFormat, AudioFrame};

/// Protocol version written into outbound headers.
pub const PROTOCOL_VERSION: &str = "1.5.2";

/// Upper bound for one header line.
pub const MAX_HEADER_LENGTH: usize = 1024 * 1024;

/// Upper bound for the JSON data segment of one event.
pub const MAX_DATA_LENGTH: usize = 1024 * 1024;

/// Upper bound for the binary payload of one event.
pub const MAX_PAYLOAD_LENGTH: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Header exceeds {MAX_HEADER_LENGTH} bytes")]
    HeaderTooLong,

    #[error("Event {part} of {length} bytes exceeds the {limit} byte limit")]
    BodyTooLarge {
        part: &'static str,
        length: usize,
        limit: usize,
    },

    #[error("Malformed event: {0}")]
    Malformed(String),
}

/// A decoded protocol event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Event {
    pub event_type: String,
    pub data: Map<String, Value>,
    pub payload: Option<Vec<u8>>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Default::default()
        }
    }

    pub fn with_data<T: Serialize>(mut self, data: &T) -> Result<Self, ProtocolError> {
        match serde_json::to_value(data)? {
            Value::Object(map) => self.data = map,
            Value::Null => self.data.clear(),
            other => {
                return Err(ProtocolError::Malformed(format!(
                    "event data must be an object, got {other}"
                )))
            }
        }
        Ok(self)
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Deserialize the data object into a typed event body.
    pub fn parse_data<T: for<'de> Deserialize<'de>>(&self) -> Result<T, ProtocolError> {
        Ok(serde_json::from_value(Value::Object(self.data.clone()))?)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload_length: Option<usize>,
}

/// Codec for a byte stream carrying Wyoming events.
#[derive(Debug, Default)]
pub struct WyomingCodec {
    pending: Option<Header>,
}

impl WyomingCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for WyomingCodec {
    type Item = Event;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Event>, ProtocolError> {
        if self.pending.is_none() {
            let Some(header) = next_header(src)? else {
                return Ok(None);
            };
            check_length("data", header.data_length, MAX_DATA_LENGTH)?;
            check_length("payload", header.payload_length, MAX_PAYLOAD_LENGTH)?;
            self.pending = Some(header);
        }

        let Some(header) = self.pending.as_ref() else {
            return Ok(None);
        };
        let data_length = header.data_length.unwrap_or(0);
        let payload_length = header.payload_length.unwrap_or(0);
        let body_length = data_length
            .checked_add(payload_length)
            .ok_or(ProtocolError::BodyTooLarge {
                part: "body",
                length: usize::MAX,
                limit: MAX_DATA_LENGTH + MAX_PAYLOAD_LENGTH,
            })?;
        if src.len() < body_length {
            src.reserve(body_length - src.len());
            return Ok(None);
        }

        let Some(header) = self.pending.take() else {
            return Ok(None);
        };
        let mut data = header.data.unwrap_or_default();
        if data_length > 0 {
            let raw = src.split_to(data_length);
            match serde_json::from_slice::<Value>(&raw)? {
                Value::Object(extra) => data.extend(extra),
                _ => return Err(ProtocolError::Malformed("data segment is not an object".into())),
            }
        }
        let payload = (payload_length > 0).then(|| src.split_to(payload_length).to_vec());

        Ok(Some(Event {
            event_type: header.event_type,
            data,
            payload,
        }))
    }
}

/// Take the next header line off `src`, skipping blank keep-alive lines.
fn next_header(src: &mut BytesMut) -> Result<Option<Header>, ProtocolError> {
    loop {
        let Some(newline) = src.iter().position(|b| *b == b'\n') else {
            if src.len() > MAX_HEADER_LENGTH {
                return Err(ProtocolError::HeaderTooLong);
            }
            return Ok(None);
        };
        if newline > MAX_HEADER_LENGTH {
            return Err(ProtocolError::HeaderTooLong);
        }
        let line = src.split_to(newline + 1);
        let line = &line[..newline];
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        return Ok(Some(serde_json::from_slice(line)?));
    }
}

fn check_length(
    part: &'static str,
    length: Option<usize>,
    limit: usize,
) -> Result<(), ProtocolError> {
    match length {
        Some(length) if length > limit => Err(ProtocolError::BodyTooLarge { part, length, limit }),
        _ => Ok(()),
    }
}

impl Encoder<Event> for WyomingCodec {
    type Error = ProtocolError;

    fn encode(&mut self, event: Event, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let data_bytes = if event.data.is_empty() {
            Vec::new()
        } else {
            serde_json::to_vec(&event.data)?
        };
        let header = Header {
            event_type: event.event_type,
            version: Some(PROTOCOL_VERSION.to_string()),
            data: None,
            data_length: (!data_bytes.is_empty()).then_some(data_bytes.len()),
            payload_length: event.payload.as_ref().map(Vec::len).filter(|n| *n > 0),
        };
        let header_bytes = serde_json::to_vec(&header)?;

        let payload = event.payload.unwrap_or_default();
        dst.reserve(header_bytes.len() + 1 + data_bytes.len() + payload.len());
        dst.put_slice(&header_bytes);
        dst.put_u8(b'\n');
        dst.put_slice(&data_bytes);
        dst.put_slice(&payload);
        Ok(())
    }
}

// Typed event bodies -------------------------------------------------------

pub const DESCRIBE: &str = "describe";
pub const INFO: &str = "info";
pub const SYNTHESIZE: &str = "synthesize";
pub const AUDIO_START: &str = "audio-start";
pub const AUDIO_CHUNK: &str = "audio-chunk";
pub const AUDIO_STOP: &str = "audio-stop";
pub const ERROR: &str = "error";

/// Voice hint a client may attach to a synthesize request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesizeVoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// Body of a `synthesize` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Synthesize {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<SynthesizeVoice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioParams {
    pub rate: u32,
    pub width: u16,
    pub channels: u16,
}

impl From<AudioFormat> for AudioParams {
    fn from(f: AudioFormat) -> Self {
        Self {
            rate: f.rate,
            width: f.width,
            channels: f.channels,
        }
    }
}

/// Body of an `error` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<AudioFrame> for Event {
    fn from(frame: AudioFrame) -> Self {
        match frame {
            AudioFrame::Start(format) => Event::new(AUDIO_START).with_params(format),
            AudioFrame::Chunk { format, audio } => Event::new(AUDIO_CHUNK)
                .with_params(format)
                .with_payload(audio),
            AudioFrame::Stop => Event::new(AUDIO_STOP),
        }
    }
}

impl Event {
    fn with_params(mut self, format: AudioFormat) -> Self {
        let params = AudioParams::from(format);
        self.data.insert("rate".into(), params.rate.into());
        self.data.insert("width".into(), params.width.into());
        self.data.insert("channels".into(), params.channels.into());
        self
    }

    pub fn error(text: impl Into<String>, code: &str) -> Self {
        let mut event = Event::new(ERROR);
        event.data.insert("text".into(), Value::String(text.into()));
        event.data.insert("code".into(), Value::String(code.to_string()));
        event
    }
}
