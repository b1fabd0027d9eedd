//! Push-channel events for one generation turn.
//!
//! These are the named server-push events the canvas client consumes.
//! Chunks are always suffixes: the portion of a growing string not yet
//! sent to the subscriber.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use loomboard_types::RecordId;

/// One event in a turn's ordered push stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum TurnEvent {
    /// The turn was accepted and generation is starting.
    Processing,

    /// Suffix of the top-level explanation text.
    MessageChunk(String),

    /// Suffix of one node's text.
    NodeChunk {
        id: RecordId,
        chunk: String,
        #[serde(rename = "parentId", default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<RecordId>,
    },

    /// Suffix of one prediction's text. `parent_id` is the owning node.
    PredictionChunk {
        id: RecordId,
        chunk: String,
        #[serde(rename = "parentId")]
        parent_id: RecordId,
    },

    /// A previously shown pending suggestion was superseded by real
    /// content; the client must remove it. At most one per turn.
    DeletePrediction { id: RecordId },

    /// Generation finished and every finalized record is committed.
    Complete {
        message: String,
        nodes: Vec<FinalNode>,
    },

    /// The turn failed; nothing was committed.
    Error { error: String },
}

impl TurnEvent {
    /// Wire name for server-push framing.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::MessageChunk(_) => "message-chunk",
            Self::NodeChunk { .. } => "node-chunk",
            Self::PredictionChunk { .. } => "prediction-chunk",
            Self::DeletePrediction { .. } => "delete-prediction",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// JSON payload for server-push framing (the data half of the frame).
    pub fn payload(&self) -> Value {
        match self {
            Self::Processing => Value::Null,
            Self::MessageChunk(chunk) => Value::String(chunk.clone()),
            Self::NodeChunk {
                id,
                chunk,
                parent_id,
            } => json!({ "id": id, "chunk": chunk, "parentId": parent_id }),
            Self::PredictionChunk {
                id,
                chunk,
                parent_id,
            } => json!({ "id": id, "chunk": chunk, "parentId": parent_id }),
            Self::DeletePrediction { id } => json!({ "id": id }),
            Self::Complete { message, nodes } => json!({ "message": message, "nodes": nodes }),
            Self::Error { error } => json!({ "error": error }),
        }
    }

    /// Check if this event ends the turn (`complete` or `error`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// Extract the chunk text if this is a suffix event.
    pub fn as_chunk(&self) -> Option<&str> {
        match self {
            Self::MessageChunk(chunk) => Some(chunk),
            Self::NodeChunk { chunk, .. } | Self::PredictionChunk { chunk, .. } => Some(chunk),
            _ => None,
        }
    }
}

/// A finalized node: the committed form of one generated node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalNode {
    pub id: RecordId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub title: String,
    pub text: String,
    #[serde(rename = "parentId", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RecordId>,
    #[serde(default)]
    pub predictions: Vec<FinalPrediction>,
}

/// A finalized follow-up suggestion attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalPrediction {
    pub id: RecordId,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(TurnEvent::Processing.name(), "processing");
        assert_eq!(TurnEvent::MessageChunk("x".into()).name(), "message-chunk");
        assert_eq!(
            TurnEvent::DeletePrediction {
                id: RecordId::from_raw("shape:p")
            }
            .name(),
            "delete-prediction"
        );
    }

    #[test]
    fn test_is_terminal() {
        assert!(TurnEvent::Error { error: "boom".into() }.is_terminal());
        assert!(TurnEvent::Complete {
            message: String::new(),
            nodes: vec![]
        }
        .is_terminal());
        assert!(!TurnEvent::Processing.is_terminal());
        assert!(!TurnEvent::MessageChunk("x".into()).is_terminal());
    }

    #[test]
    fn test_node_chunk_payload_shape() {
        let event = TurnEvent::NodeChunk {
            id: RecordId::from_raw("shape:n1"),
            chunk: "Ca".into(),
            parent_id: Some(RecordId::from_raw("shape:root")),
        };
        let payload = event.payload();
        assert_eq!(payload["id"], "shape:n1");
        assert_eq!(payload["chunk"], "Ca");
        assert_eq!(payload["parentId"], "shape:root");
    }

    #[test]
    fn test_message_chunk_payload_is_raw_string() {
        let event = TurnEvent::MessageChunk("Hi there".into());
        assert_eq!(event.payload(), Value::String("Hi there".into()));
        assert_eq!(event.as_chunk(), Some("Hi there"));
    }
}
