//! Per-turn diff state: growing documents in, ordered suffix events out.
//!
//! One [`TurnState`] lives for exactly one generation request. It tracks,
//! per node index, the emitted text length and lazily assigned id, the
//! same per prediction index, and a FIFO queue of prediction chunks that
//! arrived before their node had any visible text — a suggestion must
//! never attach to a node the client has not seen yet.

use std::collections::VecDeque;

use loomboard_types::RecordId;

use crate::events::{FinalNode, FinalPrediction, TurnEvent};
use crate::partial::GeneratedDoc;

/// Shape type used for nodes whose generated document carries none.
pub const DEFAULT_NODE_TYPE: &str = "text";

#[derive(Debug, Default)]
struct PredictionProgress {
    id: RecordId,
    emitted_len: usize,
}

#[derive(Debug)]
struct PendingPrediction {
    id: RecordId,
    chunk: String,
}

#[derive(Debug, Default)]
struct NodeProgress {
    /// Assigned on the node's first non-empty text chunk.
    id: Option<RecordId>,
    emitted_len: usize,
    predictions: Vec<PredictionProgress>,
    /// Prediction chunks held back until the node itself is visible.
    pending: VecDeque<PendingPrediction>,
}

/// The result of finalizing a completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedTurn {
    /// The full explanation text.
    pub message: String,
    /// Every node with its streamed (or freshly minted) id.
    pub nodes: Vec<FinalNode>,
}

/// Diff state for one in-flight generation request.
///
/// Never persisted, never shared across requests.
#[derive(Debug, Default)]
pub struct TurnState {
    explanation_len: usize,
    nodes: Vec<NodeProgress>,
    /// A previously shown not-yet-accepted suggestion that real content
    /// must supersede.
    existing_prediction: Option<RecordId>,
    /// Guards re-emission: at most one delete-prediction per turn.
    deleted_past_prediction: bool,
}

impl TurnState {
    /// Start a turn. `existing_prediction` is the pending suggestion the
    /// caller wants superseded once real content arrives.
    pub fn new(existing_prediction: Option<RecordId>) -> Self {
        Self {
            existing_prediction,
            ..Default::default()
        }
    }

    /// Diff one parsed document against everything already emitted.
    ///
    /// Returns the ordered events to push. Fields that did not grow emit
    /// nothing — a parse that appears to shrink is treated as
    /// wait-for-more-data, never as a retraction.
    pub fn apply(&mut self, doc: &GeneratedDoc) -> Vec<TurnEvent> {
        let mut events = Vec::new();

        if doc.explanation.len() > self.explanation_len {
            events.push(TurnEvent::MessageChunk(
                doc.explanation[self.explanation_len..].to_string(),
            ));
            self.explanation_len = doc.explanation.len();
        }

        for (index, node) in doc.nodes.iter().enumerate() {
            while self.nodes.len() <= index {
                self.nodes.push(NodeProgress::default());
            }

            let mut node_chunk_this_round = false;
            if node.text.len() > self.nodes[index].emitted_len {
                let node_id = match self.nodes[index].id.clone() {
                    Some(id) => id,
                    None => {
                        // First content for this node: assign its id, and
                        // supersede the pending suggestion exactly once.
                        let minted = RecordId::shape();
                        self.nodes[index].id = Some(minted.clone());
                        if !self.deleted_past_prediction {
                            if let Some(stale) = self.existing_prediction.clone() {
                                events.push(TurnEvent::DeletePrediction { id: stale });
                                self.deleted_past_prediction = true;
                            }
                        }
                        minted
                    }
                };

                let progress = &mut self.nodes[index];
                events.push(TurnEvent::NodeChunk {
                    id: node_id.clone(),
                    chunk: node.text[progress.emitted_len..].to_string(),
                    parent_id: node.parent_id.clone().map(RecordId::from_raw),
                });
                progress.emitted_len = node.text.len();
                node_chunk_this_round = true;

                // The node just became (or stayed) visible: release any
                // predictions that were waiting on it.
                for pending in progress.pending.drain(..) {
                    events.push(TurnEvent::PredictionChunk {
                        id: pending.id,
                        chunk: pending.chunk,
                        parent_id: node_id.clone(),
                    });
                }
            }

            let progress = &mut self.nodes[index];
            for (pred_index, pred_text) in node.predictions.iter().enumerate() {
                while progress.predictions.len() <= pred_index {
                    progress.predictions.push(PredictionProgress {
                        id: RecordId::shape(),
                        emitted_len: 0,
                    });
                }

                let tracked = &mut progress.predictions[pred_index];
                if pred_text.len() <= tracked.emitted_len {
                    continue;
                }
                let chunk = pred_text[tracked.emitted_len..].to_string();
                tracked.emitted_len = pred_text.len();
                let pred_id = tracked.id.clone();

                // A node with emitted text always has an id; a node that
                // is not visible yet gets the chunk queued instead. The
                // tracked length advanced either way.
                match &progress.id {
                    Some(parent_id) if progress.emitted_len > 0 || node_chunk_this_round => {
                        events.push(TurnEvent::PredictionChunk {
                            id: pred_id,
                            chunk,
                            parent_id: parent_id.clone(),
                        });
                    }
                    _ => {
                        progress.pending.push_back(PendingPrediction {
                            id: pred_id,
                            chunk,
                        });
                    }
                }
            }
        }

        events
    }

    /// Convert the final document into committed form, reusing every id
    /// assigned during streaming and minting ids only for nodes or
    /// predictions that arrived whole at the end.
    pub fn finalize(&mut self, doc: &GeneratedDoc) -> FinalizedTurn {
        let mut nodes = Vec::with_capacity(doc.nodes.len());

        for (index, node) in doc.nodes.iter().enumerate() {
            while self.nodes.len() <= index {
                self.nodes.push(NodeProgress::default());
            }
            let progress = &mut self.nodes[index];
            let id = progress.id.get_or_insert_with(RecordId::shape).clone();

            let mut predictions = Vec::with_capacity(node.predictions.len());
            for (pred_index, pred_text) in node.predictions.iter().enumerate() {
                while progress.predictions.len() <= pred_index {
                    progress.predictions.push(PredictionProgress {
                        id: RecordId::shape(),
                        emitted_len: 0,
                    });
                }
                predictions.push(FinalPrediction {
                    id: progress.predictions[pred_index].id.clone(),
                    text: pred_text.clone(),
                });
            }

            nodes.push(FinalNode {
                id,
                node_type: node
                    .node_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_NODE_TYPE.to_string()),
                title: node.title.clone(),
                text: node.text.clone(),
                parent_id: node.parent_id.clone().map(RecordId::from_raw),
                predictions,
            });
        }

        FinalizedTurn {
            message: doc.explanation.clone(),
            nodes,
        }
    }

    /// The superseded pending suggestion, if this turn emitted its
    /// delete-prediction event.
    pub fn superseded_prediction(&self) -> Option<&RecordId> {
        if self.deleted_past_prediction {
            self.existing_prediction.as_ref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partial::{GeneratedNode, parse_partial};
    use std::collections::HashMap;

    fn doc(explanation: &str, nodes: Vec<GeneratedNode>) -> GeneratedDoc {
        GeneratedDoc {
            explanation: explanation.to_string(),
            nodes,
        }
    }

    fn node(text: &str, predictions: &[&str]) -> GeneratedNode {
        GeneratedNode {
            text: text.to_string(),
            predictions: predictions.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_end_to_end_event_order() {
        let mut state = TurnState::new(None);

        let events1 = state.apply(&doc("Hi", vec![node("Ca", &[])]));
        assert_eq!(events1.len(), 2);
        assert_eq!(events1[0], TurnEvent::MessageChunk("Hi".into()));
        let id1 = match &events1[1] {
            TurnEvent::NodeChunk { id, chunk, .. } => {
                assert_eq!(chunk, "Ca");
                id.clone()
            }
            other => panic!("expected node-chunk, got {other:?}"),
        };

        let events2 = state.apply(&doc("Hi there", vec![node("Cats are", &[])]));
        assert_eq!(events2[0], TurnEvent::MessageChunk(" there".into()));
        match &events2[1] {
            TurnEvent::NodeChunk { id, chunk, .. } => {
                assert_eq!(id, &id1);
                assert_eq!(chunk, " are");
            }
            other => panic!("expected node-chunk, got {other:?}"),
        }

        let final_doc = doc("Hi there", vec![node("Cats are great", &["Why?"])]);
        let events3 = state.apply(&final_doc);
        assert_eq!(events3.len(), 2);
        match &events3[0] {
            TurnEvent::NodeChunk { id, chunk, .. } => {
                assert_eq!(id, &id1);
                assert_eq!(chunk, " great");
            }
            other => panic!("expected node-chunk, got {other:?}"),
        }
        let pred_id = match &events3[1] {
            TurnEvent::PredictionChunk {
                id,
                chunk,
                parent_id,
            } => {
                assert_eq!(chunk, "Why?");
                assert_eq!(parent_id, &id1);
                id.clone()
            }
            other => panic!("expected prediction-chunk, got {other:?}"),
        };

        let finalized = state.finalize(&final_doc);
        assert_eq!(finalized.message, "Hi there");
        assert_eq!(finalized.nodes.len(), 1);
        assert_eq!(finalized.nodes[0].id, id1);
        assert_eq!(finalized.nodes[0].text, "Cats are great");
        assert_eq!(finalized.nodes[0].predictions.len(), 1);
        assert_eq!(finalized.nodes[0].predictions[0].id, pred_id);
        assert_eq!(finalized.nodes[0].predictions[0].text, "Why?");
    }

    #[test]
    fn test_no_premature_prediction_attachment() {
        let mut state = TurnState::new(None);

        // Prediction text arrives before the node has any text.
        let events = state.apply(&doc("", vec![node("", &["Why not"])]));
        assert!(
            events.is_empty(),
            "prediction must not surface before its node: {events:?}"
        );

        // More prediction text while the node is still invisible.
        let events = state.apply(&doc("", vec![node("", &["Why not?"])]));
        assert!(events.is_empty());

        // The node's first chunk releases the queue, node first.
        let events = state.apply(&doc("", vec![node("Dogs", &["Why not?"])]));
        assert_eq!(events.len(), 3);
        let node_id = match &events[0] {
            TurnEvent::NodeChunk { id, chunk, .. } => {
                assert_eq!(chunk, "Dogs");
                id.clone()
            }
            other => panic!("expected node-chunk first, got {other:?}"),
        };
        // Queued chunks flush in arrival order with the same pred id.
        match (&events[1], &events[2]) {
            (
                TurnEvent::PredictionChunk {
                    id: a,
                    chunk: c1,
                    parent_id: p1,
                },
                TurnEvent::PredictionChunk {
                    id: b,
                    chunk: c2,
                    parent_id: p2,
                },
            ) => {
                assert_eq!(a, b);
                assert_eq!(c1, "Why not");
                assert_eq!(c2, "?");
                assert_eq!(p1, &node_id);
                assert_eq!(p2, &node_id);
            }
            other => panic!("expected two prediction-chunks, got {other:?}"),
        }

        // Concatenation across queued + live chunks is exact.
        let all: String = [&events[1], &events[2]]
            .iter()
            .filter_map(|e| e.as_chunk())
            .collect();
        assert_eq!(all, "Why not?");
    }

    #[test]
    fn test_at_most_one_delete_prediction_per_turn() {
        let stale = RecordId::from_raw("shape:stale-pred");
        let mut state = TurnState::new(Some(stale.clone()));

        // Two nodes both produce their first chunk in one pass.
        let events = state.apply(&doc("", vec![node("One", &[]), node("Two", &[])]));
        let deletes: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, TurnEvent::DeletePrediction { .. }))
            .collect();
        assert_eq!(deletes.len(), 1);
        assert_eq!(
            deletes[0],
            &TurnEvent::DeletePrediction { id: stale.clone() }
        );
        // The delete precedes the first node chunk.
        assert!(matches!(events[0], TurnEvent::DeletePrediction { .. }));

        // A third node's first chunk in a later pass emits no second delete.
        let events = state.apply(&doc(
            "",
            vec![node("One", &[]), node("Two", &[]), node("Three", &[])],
        ));
        assert!(
            events
                .iter()
                .all(|e| !matches!(e, TurnEvent::DeletePrediction { .. }))
        );

        assert_eq!(state.superseded_prediction(), Some(&stale));
    }

    #[test]
    fn test_no_delete_prediction_without_existing() {
        let mut state = TurnState::new(None);
        let events = state.apply(&doc("", vec![node("One", &[])]));
        assert!(
            events
                .iter()
                .all(|e| !matches!(e, TurnEvent::DeletePrediction { .. }))
        );
        assert_eq!(state.superseded_prediction(), None);
    }

    #[test]
    fn test_shrinking_parse_emits_nothing() {
        let mut state = TurnState::new(None);
        state.apply(&doc("Hello world", vec![node("abc", &[])]));

        // A partial parse that appears shorter is wait-for-more-data.
        let events = state.apply(&doc("Hello", vec![node("a", &[])]));
        assert!(events.is_empty());

        // Growth past the high-water mark diffs from the mark.
        let events = state.apply(&doc("Hello world!", vec![node("abcd", &[])]));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], TurnEvent::MessageChunk("!".into()));
        assert_eq!(events[1].as_chunk(), Some("d"));
    }

    #[test]
    fn test_finalize_reuses_streamed_ids_and_mints_for_new() {
        let mut state = TurnState::new(None);
        let events = state.apply(&doc("", vec![node("Streamed", &[])]));
        let streamed_id = match &events[0] {
            TurnEvent::NodeChunk { id, .. } => id.clone(),
            other => panic!("expected node-chunk, got {other:?}"),
        };

        // The final document has the streamed node plus one that arrived
        // whole, never incrementally.
        let final_doc = doc(
            "done",
            vec![node("Streamed", &[]), node("Arrived whole", &["Really?"])],
        );
        let finalized = state.finalize(&final_doc);

        assert_eq!(finalized.nodes[0].id, streamed_id);
        assert_ne!(finalized.nodes[1].id, streamed_id);
        assert!(!finalized.nodes[1].id.as_str().is_empty());

        // Finalizing again reuses every id, minting nothing new.
        let again = state.finalize(&final_doc);
        assert_eq!(again, finalized);
    }

    /// Diff-suffix invariant: over every parsable prefix of a document,
    /// the concatenated chunks per field equal the final value exactly.
    #[test]
    fn test_diff_suffix_invariant_over_all_prefixes() {
        let full = r#"{"explanation":"Hi there, friend","nodes":[{"title":"Cats","text":"Cats are great","predictions":["Why?","How so?"]},{"text":"Dogs drool","predictions":["Ever?"]}]}"#;
        let final_doc = parse_partial(full).unwrap();

        let mut state = TurnState::new(None);
        let mut message = String::new();
        let mut by_id: HashMap<RecordId, String> = HashMap::new();

        let mut cuts: Vec<usize> = full.char_indices().map(|(i, _)| i).collect();
        cuts.push(full.len());
        for end in cuts {
            let Some(docu) = parse_partial(&full[..end]) else {
                continue;
            };
            for event in state.apply(&docu) {
                match event {
                    TurnEvent::MessageChunk(chunk) => message.push_str(&chunk),
                    TurnEvent::NodeChunk { id, chunk, .. }
                    | TurnEvent::PredictionChunk { id, chunk, .. } => {
                        by_id.entry(id).or_default().push_str(&chunk);
                    }
                    other => panic!("unexpected event {other:?}"),
                }
            }
        }

        let finalized = state.finalize(&final_doc);
        assert_eq!(message, final_doc.explanation);
        for (final_node, src) in finalized.nodes.iter().zip(&final_doc.nodes) {
            assert_eq!(by_id.get(&final_node.id), Some(&src.text));
            for (pred, text) in final_node.predictions.iter().zip(&src.predictions) {
                assert_eq!(by_id.get(&pred.id), Some(text));
            }
        }
    }
}
