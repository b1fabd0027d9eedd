//! Drives one generation turn end to end.
//!
//! The coordinator owns nothing durable: it consumes a fragment stream
//! from the generative backend, feeds the per-turn diff state, pushes
//! events to one subscriber, and commits the finalized records through
//! the room actor before emitting `complete`.
//!
//! Cancellation policy: a subscriber that disconnects mid-turn stops
//! event emission, but the turn still runs to completion and commits —
//! fire-and-forget finalize. Ids the client already rendered therefore
//! always end up backed by committed records.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use loomboard_room::Room;
use loomboard_types::{JsonMap, Record, RecordId, ShapeRecord};

use crate::error::{BackendError, TurnError};
use crate::events::TurnEvent;
use crate::partial::parse_partial;
use crate::turn::{FinalizedTurn, TurnState};

/// A stream of raw completion text deltas.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, BackendError>> + Send>>;

/// One prior message in the conversation history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// A generation request for one turn.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    /// A pending suggestion shown to the user that this turn's real
    /// content should supersede.
    #[serde(rename = "existingPredictionId", default, skip_serializing_if = "Option::is_none")]
    pub existing_prediction_id: Option<RecordId>,
}

/// The upstream generative text collaborator.
///
/// Yields text deltas that, accumulated, form a growing JSON document.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn stream(&self, request: &GenerateRequest) -> Result<FragmentStream, BackendError>;
}

/// One-way event channel to exactly one HTTP subscriber.
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Send one event. Returns `false` once the subscriber is gone.
    async fn send(&self, event: &TurnEvent) -> bool;
}

/// Coordinates generation turns against one generative backend.
pub struct TurnCoordinator {
    backend: Arc<dyn GenerativeBackend>,
}

impl TurnCoordinator {
    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self { backend }
    }

    /// Run one turn: stream, diff, commit, complete.
    ///
    /// On upstream failure the subscriber receives a single terminal
    /// `error` event and nothing is committed.
    pub async fn run(
        &self,
        room: Arc<Room>,
        request: GenerateRequest,
        channel: Arc<dyn PushChannel>,
    ) -> Result<FinalizedTurn, TurnError> {
        let mut subscriber_gone = !channel.send(&TurnEvent::Processing).await;

        let mut stream = match self.backend.stream(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                channel.send(&TurnEvent::Error { error: e.to_string() }).await;
                return Err(e.into());
            }
        };

        let mut state = TurnState::new(request.existing_prediction_id.clone());
        let mut buffer = String::new();

        while let Some(item) = stream.next().await {
            match item {
                Ok(delta) => {
                    buffer.push_str(&delta);
                    // Unparsable so far: wait for the next fragment.
                    let Some(doc) = parse_partial(&buffer) else {
                        continue;
                    };
                    for event in state.apply(&doc) {
                        if !subscriber_gone && !channel.send(&event).await {
                            debug!("subscriber gone; continuing turn without emission");
                            subscriber_gone = true;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "generative backend failed mid-turn");
                    if !subscriber_gone {
                        channel.send(&TurnEvent::Error { error: e.to_string() }).await;
                    }
                    return Err(e.into());
                }
            }
        }

        let Some(doc) = parse_partial(&buffer) else {
            let err = TurnError::UnparsableCompletion;
            if !subscriber_gone {
                channel.send(&TurnEvent::Error { error: err.to_string() }).await;
            }
            return Err(err);
        };

        // Flush whatever the final parse adds beyond the last fragment,
        // so emitted chunks concatenate to exactly the final text.
        for event in state.apply(&doc) {
            if !subscriber_gone && !channel.send(&event).await {
                subscriber_gone = true;
            }
        }

        let finalized = state.finalize(&doc);

        // Commit before `complete`: a record that reached finalize is
        // never lost, even if nobody is listening anymore.
        room.add_records(build_records(&finalized)).await?;
        if let Some(stale) = state.superseded_prediction() {
            room.remove_prediction(stale).await?;
        }

        if !subscriber_gone {
            channel
                .send(&TurnEvent::Complete {
                    message: finalized.message.clone(),
                    nodes: finalized.nodes.clone(),
                })
                .await;
        }

        Ok(finalized)
    }
}

/// Build the committed records for a finalized turn: one shape per node,
/// and per prediction an arrow shape plus the prediction shape carrying
/// its `arrowId` (the referent of the prediction pair-delete).
fn build_records(finalized: &FinalizedTurn) -> Vec<Record> {
    let mut records = Vec::new();

    for node in &finalized.nodes {
        let mut props = JsonMap::new();
        if !node.title.is_empty() {
            props.insert("title".into(), json!(node.title));
        }
        props.insert("text".into(), json!(node.text));

        records.push(Record::Shape(ShapeRecord {
            id: node.id.clone(),
            shape_type: node.node_type.clone(),
            parent_id: node.parent_id.clone(),
            index: None,
            props,
        }));

        for prediction in &node.predictions {
            let arrow_id = RecordId::shape();
            let mut arrow_props = JsonMap::new();
            arrow_props.insert("start".into(), json!(node.id));
            arrow_props.insert("end".into(), json!(prediction.id));
            records.push(Record::Shape(ShapeRecord {
                id: arrow_id.clone(),
                shape_type: "arrow".into(),
                parent_id: node.parent_id.clone(),
                index: None,
                props: arrow_props,
            }));

            let mut pred_props = JsonMap::new();
            pred_props.insert("text".into(), json!(prediction.text));
            pred_props.insert("arrowId".into(), json!(arrow_id));
            records.push(Record::Shape(ShapeRecord {
                id: prediction.id.clone(),
                shape_type: "prediction".into(),
                parent_id: Some(node.id.clone()),
                index: None,
                props: pred_props,
            }));
        }
    }

    records
}
