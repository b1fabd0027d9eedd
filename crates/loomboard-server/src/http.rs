//! HTTP route filters and handlers.

use std::convert::Infallible;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use warp::http::StatusCode;
use warp::{Filter, Reply};

use loomboard_room::{RoomError, RoomRegistry};
use loomboard_stream::{GenerateRequest, TurnCoordinator};
use loomboard_types::{Record, SessionCode, ShapePatch, UpdateShapesOptions};

use crate::push::{SsePushChannel, sse_events};

/// Shared server dependencies.
pub struct ServerState {
    pub registry: Arc<RoomRegistry>,
    pub coordinator: Arc<TurnCoordinator>,
}

/// All routes of the HTTP surface.
pub fn routes(
    state: Arc<ServerState>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    let healthz = warp::path!("healthz").and(warp::get()).map(|| "ok");

    let stream = warp::path!("workspace" / String / "stream")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(handle_stream);

    let snapshot = warp::path!("workspace" / String / "snapshot")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_snapshot);

    let records = warp::path!("workspace" / String / "records")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(handle_records);

    let shapes = warp::path!("workspace" / String / "shapes")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(handle_shapes);

    let cleanup = warp::path!("workspace" / String)
        .and(warp::delete())
        .and(with_state(state))
        .and_then(handle_cleanup);

    healthz
        .or(stream)
        .or(snapshot)
        .or(records)
        .or(shapes)
        .or(cleanup)
}

fn with_state(
    state: Arc<ServerState>,
) -> impl Filter<Extract = (Arc<ServerState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn error_reply(err: RoomError) -> Box<dyn Reply> {
    let status = match &err {
        RoomError::NotInitialized | RoomError::CodeMismatch { .. } => StatusCode::BAD_REQUEST,
        RoomError::Closed => StatusCode::GONE,
        RoomError::Blob(_) | RoomError::Snapshot(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    Box::new(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "error": err.to_string() })),
        status,
    ))
}

fn ok_reply() -> Box<dyn Reply> {
    Box::new(warp::reply::json(&serde_json::json!({ "ok": true })))
}

/// `POST /workspace/:code/stream` — start a generation turn, reply SSE.
async fn handle_stream(
    code: String,
    request: GenerateRequest,
    state: Arc<ServerState>,
) -> Result<Box<dyn Reply>, warp::Rejection> {
    let code = SessionCode::from_raw(code);
    let room = match state.registry.get_or_create(&code).await {
        Ok(room) => room,
        Err(e) => return Ok(error_reply(e)),
    };

    let (channel, rx) = SsePushChannel::pair();
    let coordinator = state.coordinator.clone();
    info!(%code, "starting generation turn");

    // Fire-and-forget: the turn commits its records even if the SSE
    // subscriber drops mid-stream.
    tokio::spawn(async move {
        if let Err(e) = coordinator.run(room, request, Arc::new(channel)).await {
            warn!(%code, error = %e, "generation turn failed");
        }
    });

    let reply = warp::sse::reply(warp::sse::keep_alive().stream(sse_events(rx)));
    Ok(Box::new(reply))
}

#[derive(Serialize)]
struct SnapshotEntry {
    record: Record,
    #[serde(rename = "lastChangedClock")]
    last_changed_clock: u64,
}

#[derive(Serialize)]
struct SnapshotResponse {
    clock: u64,
    records: Vec<SnapshotEntry>,
}

/// `GET /workspace/:code/snapshot` — full document export.
async fn handle_snapshot(
    code: String,
    state: Arc<ServerState>,
) -> Result<Box<dyn Reply>, warp::Rejection> {
    let code = SessionCode::from_raw(code);
    let room = match state.registry.get_or_create(&code).await {
        Ok(room) => room,
        Err(e) => return Ok(error_reply(e)),
    };

    let (snapshot, clock) = match (room.current_snapshot().await, room.current_clock().await) {
        (Ok(snapshot), Ok(clock)) => (snapshot, clock),
        (Err(e), _) | (_, Err(e)) => return Ok(error_reply(e)),
    };

    let response = SnapshotResponse {
        clock,
        records: snapshot
            .into_iter()
            .map(|(record, last_changed_clock)| SnapshotEntry {
                record,
                last_changed_clock,
            })
            .collect(),
    };
    Ok(Box::new(warp::reply::json(&response)))
}

/// `POST /workspace/:code/records` — unconditional record puts.
async fn handle_records(
    code: String,
    records: Vec<Record>,
    state: Arc<ServerState>,
) -> Result<Box<dyn Reply>, warp::Rejection> {
    let code = SessionCode::from_raw(code);
    let room = match state.registry.get_or_create(&code).await {
        Ok(room) => room,
        Err(e) => return Ok(error_reply(e)),
    };
    match room.add_records(records).await {
        Ok(()) => Ok(ok_reply()),
        Err(e) => Ok(error_reply(e)),
    }
}

#[derive(Deserialize)]
struct UpdateShapesBody {
    shapes: Vec<ShapePatch>,
    #[serde(default)]
    options: UpdateShapesOptions,
}

/// `POST /workspace/:code/shapes` — batched shape merges.
async fn handle_shapes(
    code: String,
    body: UpdateShapesBody,
    state: Arc<ServerState>,
) -> Result<Box<dyn Reply>, warp::Rejection> {
    let code = SessionCode::from_raw(code);
    let room = match state.registry.get_or_create(&code).await {
        Ok(room) => room,
        Err(e) => return Ok(error_reply(e)),
    };
    match room.update_shapes(body.shapes, body.options).await {
        Ok(()) => Ok(ok_reply()),
        Err(e) => Ok(error_reply(e)),
    }
}

/// `DELETE /workspace/:code` — close the session and delete its blob.
async fn handle_cleanup(
    code: String,
    state: Arc<ServerState>,
) -> Result<Box<dyn Reply>, warp::Rejection> {
    let code = SessionCode::from_raw(code);
    match state.registry.cleanup(&code).await {
        Ok(()) => Ok(ok_reply()),
        Err(e) => Ok(error_reply(e)),
    }
}
