//! Inbound ingestion messages and the push response

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::stage::StageError;
use crate::error::{Error, Result};

/// Unit of input for one ingestion run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum IngestInput {
    /// A stored object to download, e.g. a GCS finalize notification
    Object { bucket: String, name: String },
    /// Submitted text, chunked directly
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
}

impl IngestInput {
    pub fn object(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Object {
            bucket: bucket.into(),
            name: name.into(),
        }
    }

    pub fn text(text: impl Into<String>, filename: Option<String>) -> Self {
        Self::Text {
            text: text.into(),
            filename,
        }
    }

    /// Reject descriptors with blank fields
    pub fn validate(&self) -> Result<()> {
        match self {
            IngestInput::Object { bucket, name } => {
                if bucket.trim().is_empty() {
                    return Err(Error::invalid_input("bucket must not be empty"));
                }
                if name.trim().is_empty() {
                    return Err(Error::invalid_input("name must not be empty"));
                }
            }
            IngestInput::Text { text, .. } => {
                if text.trim().is_empty() {
                    return Err(Error::invalid_input("text must not be empty"));
                }
            }
        }
        Ok(())
    }

    /// Short label for logs
    pub fn describe(&self) -> String {
        match self {
            IngestInput::Object { bucket, name } => format!("gs://{}/{}", bucket, name),
            IngestInput::Text { filename, text } => match filename {
                Some(f) => format!("text:{}", f),
                None => format!("text:{} chars", text.chars().count()),
            },
        }
    }
}

/// Pub/Sub message as delivered inside a push envelope
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubSubMessage {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub publish_time: Option<String>,
}

/// Pub/Sub push request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEnvelope {
    pub message: PubSubMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

/// Decode a base64 Pub/Sub payload into an ingest descriptor
pub fn decode_payload(data: Option<&str>) -> Result<IngestInput> {
    let data = match data {
        Some(d) if !d.trim().is_empty() => d.trim(),
        _ => return Err(Error::invalid_input("No data in Pub/Sub message")),
    };

    let bytes = STANDARD
        .decode(data)
        .map_err(|e| Error::invalid_input(format!("invalid base64 payload: {}", e)))?;
    decode_json_payload(&bytes)
}

/// Decode already-unwrapped JSON bytes into an ingest descriptor
pub fn decode_json_payload(bytes: &[u8]) -> Result<IngestInput> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::invalid_input(format!("payload is not UTF-8: {}", e)))?;
    let input: IngestInput = serde_json::from_str(text).map_err(|e| {
        Error::invalid_input(format!(
            "payload must describe {{bucket, name}} or {{text, filename}}: {}",
            e
        ))
    })?;
    input.validate()?;
    Ok(input)
}

/// Synchronous push response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestResponse {
    pub acknowledged: bool,
    pub errors: Vec<StageError>,
    pub stored: usize,
}
