//! Server-push channel adapter: turn events out over SSE.

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use warp::sse::Event;

use loomboard_stream::{PushChannel, TurnEvent};

/// Push-channel half handed to the turn coordinator.
///
/// Sends fail (returning `false`) once the SSE response side is dropped,
/// which is how the coordinator learns the subscriber is gone.
pub struct SsePushChannel {
    tx: mpsc::UnboundedSender<TurnEvent>,
}

impl SsePushChannel {
    /// Create a channel pair: the coordinator side and the event stream
    /// to mount into the SSE reply.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<TurnEvent>) {
        let (tx, rx) = mpsc::unbounded();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl PushChannel for SsePushChannel {
    async fn send(&self, event: &TurnEvent) -> bool {
        self.tx.unbounded_send(event.clone()).is_ok()
    }
}

/// Frame turn events as SSE events: named event + JSON data.
pub fn sse_events(
    rx: mpsc::UnboundedReceiver<TurnEvent>,
) -> impl futures::Stream<Item = Result<Event, std::convert::Infallible>> {
    rx.map(|event| {
        Ok(Event::default()
            .event(event.name())
            .data(event.payload().to_string()))
    })
}
