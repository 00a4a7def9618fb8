//! Routes inbound client events to the canvas and fans frame contents out to
//! every connected client.
//!
//! Every function here returns an explicit result; [`dispatch_message`] is
//! the only place failures are logged and discarded, so a bad event never ends a
//! connection and is never reported back to the client.

use serde_json::Value;
use tracing::{debug, warn};
use tungstenite::Message;

use crate::{
    canvas::{parse_frame_index, StrokeAdded, StrokeData},
    server::{
        message::{create_frame_message, ClientEvent},
        middleware::{validate_frame, validate_stroke},
        ServerState,
    },
    utils::RelayError,
};

/// What a successfully handled event did.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// A stroke was appended to its frame.
    StrokeAdded(StrokeAdded),
    /// A frame was queued for `recipients` clients.
    FrameBroadcast {
        frame_index: usize,
        strokes: usize,
        recipients: usize,
    },
    /// The requested frame holds no strokes, so nothing was sent.
    EmptyFrame { frame_index: usize },
}

/// Validates, parses and dispatches one inbound data frame, logging and
/// discarding any failure. Only text frames carry events.
pub fn dispatch_message(state: &ServerState, msg: Message) -> Option<Dispatched> {
    state.metrics.events_received.inc();

    let event = match validate_frame(&msg, state.config.max_message_bytes)
        .and_then(|()| ClientEvent::try_from(msg))
    {
        Ok(event) => event,
        Err(e) => return discard(state, "unparsed", e.into()),
    };

    let name = event.name();
    match dispatch(state, event) {
        Ok(outcome) => Some(outcome),
        Err(e) => discard(state, name, e),
    }
}

fn discard(state: &ServerState, event: &str, error: RelayError) -> Option<Dispatched> {
    state.metrics.events_discarded.inc();
    warn!(event = event, "Discarded event: {}", error);
    None
}

/// Handles one decoded client event.
///
/// # Errors
/// Returns `RelayError::CanvasError` for malformed strokes and invalid
/// indices, or a serialization error if the outbound frame cannot be encoded.
pub fn dispatch(state: &ServerState, event: ClientEvent) -> Result<Dispatched, RelayError> {
    match event {
        ClientEvent::StrokeToServer(payload) => submit_stroke(state, payload),
        ClientEvent::RequestFrame(payload) => request_frame(state, &payload),
    }
}

fn submit_stroke(state: &ServerState, payload: Value) -> Result<Dispatched, RelayError> {
    let data = StrokeData::decode(payload)?;
    validate_stroke(&data, state.config.max_points_per_stroke)?;

    let added = state.canvas.add_stroke(data)?;
    state.metrics.strokes_added.inc();
    state.metrics.frames.set(state.canvas.frame_count() as i64);

    Ok(Dispatched::StrokeAdded(added))
}

fn request_frame(state: &ServerState, payload: &Value) -> Result<Dispatched, RelayError> {
    let num = payload.get("num").unwrap_or(&Value::Null);
    let frame_index = parse_frame_index(num)?;

    let strokes = state.canvas.get_or_create_frame(frame_index)?;
    state.metrics.frames.set(state.canvas.frame_count() as i64);

    if strokes.is_empty() {
        debug!(frame = frame_index, "Requested frame is empty");
        return Ok(Dispatched::EmptyFrame { frame_index });
    }

    let count = strokes.len();
    let recipients = state.clients.broadcast(create_frame_message(strokes)?);
    state.metrics.frames_broadcast.inc();

    debug!(frame = frame_index, strokes = count, recipients, "Sending frame");

    Ok(Dispatched::FrameBroadcast {
        frame_index,
        strokes: count,
        recipients,
    })
}
