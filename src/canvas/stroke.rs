use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::CanvasError;

/// A stroke submission as decoded from a client, before the canvas has
/// accepted its frame index.
///
/// Only `color` and `points` are required at this stage. The `index` is kept
/// as raw JSON so the canvas can reject it with a precise reason, and any
/// field the relay does not know about is carried in `extra` untouched.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StrokeData {
    /// Raw frame index, validated by [`super::parse_frame_index`].
    #[serde(default)]
    pub index: Value,
    /// Opaque color string chosen by the client.
    pub color: String,
    /// Ordered point list, relayed as-is.
    pub points: Vec<Value>,
    /// Any other fields the client attached.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StrokeData {
    /// Builds a submission directly, mostly useful for tests and demos.
    pub fn new(index: impl Into<Value>, color: impl Into<String>, points: Vec<Value>) -> Self {
        Self {
            index: index.into(),
            color: color.into(),
            points,
            extra: Map::new(),
        }
    }

    /// Interprets an inbound `clientStrokeToServer` payload.
    ///
    /// Browser clients send the stroke as a JSON object while some native
    /// clients send a string holding the JSON-encoded stroke. A string payload
    /// is decoded once; if that fails the original value is interpreted as a
    /// structured object, which a bare string can never satisfy.
    ///
    /// # Errors
    /// Returns `CanvasError::MalformedStroke` if neither interpretation yields
    /// an object with a string `color` and an array of `points`.
    pub fn decode(payload: Value) -> Result<Self, CanvasError> {
        let structured = match payload {
            Value::String(text) => match serde_json::from_str::<Value>(&text) {
                Ok(decoded) => decoded,
                Err(_) => Value::String(text),
            },
            other => other,
        };

        serde_json::from_value(structured)
            .map_err(|e| CanvasError::MalformedStroke(e.to_string()))
    }
}

/// A single accepted pen stroke.
///
/// Serializes back to the shape clients sent it in: `index`, `color`,
/// `points` and whatever extra fields came along. The arrival time is
/// server-local and never leaves the process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stroke {
    #[serde(rename = "index")]
    frame_index: usize,
    color: String,
    points: Vec<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
    #[serde(skip)]
    received_at: SystemTime,
}

impl Stroke {
    pub(crate) fn accept(frame_index: usize, data: StrokeData) -> Self {
        Self {
            frame_index,
            color: data.color,
            points: data.points,
            extra: data.extra,
            received_at: SystemTime::now(),
        }
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn points(&self) -> &[Value] {
        &self.points
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    pub fn received_at(&self) -> SystemTime {
        self.received_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_structured_object() {
        let data = StrokeData::decode(json!({
            "index": 2,
            "color": "red",
            "points": [[0, 0], [1, 1]]
        }))
        .unwrap();

        assert_eq!(data.index, json!(2));
        assert_eq!(data.color, "red");
        assert_eq!(data.points.len(), 2);
        assert!(data.extra.is_empty());
    }

    #[test]
    fn decodes_json_encoded_string() {
        let encoded = json!({"index": 0, "color": "blue", "points": [{"x": 2, "y": 2}]}).to_string();
        let data = StrokeData::decode(Value::String(encoded)).unwrap();

        assert_eq!(data.color, "blue");
        assert_eq!(data.points, vec![json!({"x": 2, "y": 2})]);
    }

    #[test]
    fn undecodable_string_is_malformed() {
        let err = StrokeData::decode(Value::String("not json".into())).unwrap_err();
        assert!(matches!(err, CanvasError::MalformedStroke(_)));
    }

    #[test]
    fn missing_points_is_malformed() {
        let err = StrokeData::decode(json!({"index": 0, "color": "red"})).unwrap_err();
        assert!(matches!(err, CanvasError::MalformedStroke(_)));
    }

    #[test]
    fn non_object_payload_is_malformed() {
        for payload in [json!(42), json!(null), json!([1, 2, 3])] {
            assert!(StrokeData::decode(payload).is_err());
        }
    }

    #[test]
    fn missing_index_decodes_as_null() {
        let data = StrokeData::decode(json!({"color": "red", "points": []})).unwrap();
        assert_eq!(data.index, Value::Null);
    }

    #[test]
    fn accepted_stroke_serializes_in_client_shape() {
        let data = StrokeData::decode(json!({
            "index": 3,
            "color": "green",
            "points": [[5, 5]],
            "brush": 4
        }))
        .unwrap();
        let stroke = Stroke::accept(3, data);

        assert_eq!(
            serde_json::to_value(&stroke).unwrap(),
            json!({"index": 3, "color": "green", "points": [[5, 5]], "brush": 4})
        );
    }
}
