use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tungstenite::Message;
use crate::{canvas::Stroke, utils::error::RelayError};

/// Inbound event carrying a stroke submission. Must match the serde tag below.
pub const STROKE_TO_SERVER: &str = "clientStrokeToServer";
/// Inbound event requesting a frame broadcast. Must match the serde tag below.
pub const REQUEST_FRAME: &str = "clientRequestFrame";

/// Represents different types of errors that can occur when decoding envelopes
#[derive(Error, Debug)]
pub enum MessageError {
    /// Error when the WebSocket frame is not a text frame.
    #[error("Invalid message format")]
    InvalidFormat,

    /// Error when the envelope cannot be deserialized or names an unknown event.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Error when the frame size exceeds the allowed limit.
    #[error("Message too long: {0} bytes")]
    MessageTooLong(usize),
}

/// The events a client can send, framed as `{"event": <name>, "data": <payload>}`.
///
/// Payloads stay as raw JSON here; the dispatcher owns their interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// A stroke, either as an object or as a JSON-encoded string.
    #[serde(rename = "clientStrokeToServer")]
    StrokeToServer(Value),

    /// A frame request carrying the frame number in `num`.
    #[serde(rename = "clientRequestFrame")]
    RequestFrame(Value),
}

/// The events the server sends to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Every buffered stroke of one frame, oldest first.
    #[serde(rename = "newFrameFromServer")]
    NewFrame(Vec<Stroke>),
}

impl ClientEvent {
    /// The wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::StrokeToServer(_) => STROKE_TO_SERVER,
            ClientEvent::RequestFrame(_) => REQUEST_FRAME,
        }
    }
}

impl std::str::FromStr for ClientEvent {
    type Err = MessageError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(text).map_err(|e| MessageError::SerializationError(e.to_string()))
    }
}

/// Converts a Tungstenite `Message` into a `ClientEvent`. Only text frames carry events.
impl TryFrom<Message> for ClientEvent {
    type Error = MessageError;

    fn try_from(msg: Message) -> Result<Self, Self::Error> {
        match msg {
            Message::Text(text) => text.parse(),
            _ => Err(MessageError::InvalidFormat),
        }
    }
}

/// Converts a `ServerEvent` into a Tungstenite text `Message`.
impl TryFrom<ServerEvent> for Message {
    type Error = RelayError;

    fn try_from(event: ServerEvent) -> Result<Self, Self::Error> {
        let json = serde_json::to_string(&event)?;
        Ok(Message::Text(json))
    }
}

/// Creates the `newFrameFromServer` message for a frame's strokes.
pub fn create_frame_message(strokes: Vec<Stroke>) -> Result<Message, RelayError> {
    ServerEvent::NewFrame(strokes).try_into()
}
