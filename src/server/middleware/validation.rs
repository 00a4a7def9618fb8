use tungstenite::Message;

use crate::canvas::{CanvasError, StrokeData};
use crate::server::message::MessageError;

/// Validates an inbound frame before it is parsed.
///
/// # Returns
///
/// * `Ok(())` if the frame is within the allowed size.
/// * `Err(MessageError::MessageTooLong)` if its payload exceeds `max_bytes`.
pub fn validate_frame(msg: &Message, max_bytes: usize) -> Result<(), MessageError> {
    if msg.len() > max_bytes {
        return Err(MessageError::MessageTooLong(msg.len()));
    }
    Ok(())
}

/// Validates a decoded stroke against the per-stroke limits.
///
/// # Returns
///
/// * `Ok(())` if the stroke is within allowed limits.
/// * `Err(CanvasError::MalformedStroke)` if it carries more than `max_points` points.
pub fn validate_stroke(stroke: &StrokeData, max_points: usize) -> Result<(), CanvasError> {
    if stroke.points.len() > max_points {
        return Err(CanvasError::MalformedStroke(format!(
            "{} points exceeds the limit of {}",
            stroke.points.len(),
            max_points
        )));
    }
    Ok(())
}
