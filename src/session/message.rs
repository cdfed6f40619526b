//! Typed view of streaming-service messages.
//!
//! The wire shape mirrors the service's JSON: optional transcription
//! fragments for either side of the conversation, optional inline audio
//! parts, and a turn-completion marker.

use serde::{Deserialize, Serialize};

/// Which side of the conversation produced a transcription fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Model,
}

/// A partial or final transcription fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptionFragment {
    pub text: String,
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct InlineData {
    /// Base64-encoded PCM payload.
    pub data: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Part {
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelTurn {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    pub input_transcription: Option<TranscriptionFragment>,
    pub output_transcription: Option<TranscriptionFragment>,
    pub model_turn: Option<ModelTurn>,
    pub turn_complete: bool,
}

/// One inbound message from the streaming session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    pub server_content: Option<ServerContent>,
}

impl ServerMessage {
    /// Parses a raw JSON message from the transport.
    pub fn parse(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The user-side transcription fragment, when present.
    pub fn input_transcription(&self) -> Option<&TranscriptionFragment> {
        self.server_content
            .as_ref()?
            .input_transcription
            .as_ref()
    }

    /// The model-side transcription fragment, when present.
    pub fn output_transcription(&self) -> Option<&TranscriptionFragment> {
        self.server_content
            .as_ref()?
            .output_transcription
            .as_ref()
    }

    /// Base64 audio payload of the first inline part, when present.
    pub fn audio_data(&self) -> Option<&str> {
        self.server_content
            .as_ref()?
            .model_turn
            .as_ref()?
            .parts
            .first()?
            .inline_data
            .as_ref()
            .map(|d| d.data.as_str())
    }

    /// True for the terminal marker of the current turn.
    pub fn is_turn_complete(&self) -> bool {
        self.server_content
            .as_ref()
            .map(|c| c.turn_complete)
            .unwrap_or(false)
    }

    /// Constructs a transcription message (test/integration helper).
    pub fn transcription(speaker: Speaker, text: &str, is_final: bool) -> Self {
        let fragment = Some(TranscriptionFragment {
            text: text.to_string(),
            is_final,
        });
        let mut content = ServerContent::default();
        match speaker {
            Speaker::User => content.input_transcription = fragment,
            Speaker::Model => content.output_transcription = fragment,
        }
        Self {
            server_content: Some(content),
        }
    }

    /// Constructs an audio message from a base64 payload.
    pub fn audio(data: &str) -> Self {
        Self {
            server_content: Some(ServerContent {
                model_turn: Some(ModelTurn {
                    parts: vec![Part {
                        inline_data: Some(InlineData {
                            data: data.to_string(),
                            mime_type: Some("audio/pcm;rate=24000".to_string()),
                        }),
                    }],
                }),
                ..ServerContent::default()
            }),
        }
    }

    /// Constructs the turn-completion marker.
    pub fn turn_complete() -> Self {
        Self {
            server_content: Some(ServerContent {
                turn_complete: true,
                ..ServerContent::default()
            }),
        }
    }
}
