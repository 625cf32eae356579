//! Capability descriptor returned for `describe` requests.

use serde::{Deserialize, Serialize};

use crate::protocol::{Event, ProtocolError, INFO};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsVoice {
    pub name: String,
    pub description: Option<String>,
    pub attribution: Attribution,
    pub installed: bool,
    pub version: Option<String>,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsProgram {
    pub name: String,
    pub description: Option<String>,
    pub attribution: Attribution,
    pub installed: bool,
    pub version: Option<String>,
    pub voices: Vec<TtsVoice>,
}

/// Body of an `info` event. Only the TTS section is populated; the other
/// service lists are sent empty for clients that expect them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub asr: Vec<serde_json::Value>,
    #[serde(default)]
    pub tts: Vec<TtsProgram>,
    #[serde(default)]
    pub handle: Vec<serde_json::Value>,
    #[serde(default)]
    pub intent: Vec<serde_json::Value>,
    #[serde(default)]
    pub wake: Vec<serde_json::Value>,
}

impl Info {
    pub fn event(&self) -> Result<Event, ProtocolError> {
        Event::new(INFO).with_data(self)
    }
}

/// The single cloned voice this server offers.
pub fn describe() -> Info {
    let version = Some(env!("CARGO_PKG_VERSION").to_string());
    Info {
        tts: vec![TtsProgram {
            name: "chatterbox".into(),
            description: Some("Chatterbox TTS with voice cloning".into()),
            attribution: Attribution {
                name: "Resemble AI".into(),
                url: "https://github.com/resemble-ai/chatterbox".into(),
            },
            installed: true,
            version: version.clone(),
            voices: vec![TtsVoice {
                name: "custom".into(),
                description: Some("Custom cloned voice".into()),
                attribution: Attribution {
                    name: "Custom".into(),
                    url: String::new(),
                },
                installed: true,
                version,
                languages: vec!["en".into()],
            }],
        }],
        ..Default::default()
    }
}
