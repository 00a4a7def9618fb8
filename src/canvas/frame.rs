use std::collections::VecDeque;

use super::Stroke;

/// The strokes buffered for one frame, oldest first.
///
/// Strokes are only ever appended at the back and evicted from the front.
#[derive(Debug, Default, Clone)]
pub struct FrameBuffer {
    strokes: VecDeque<Stroke>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stroke: Stroke) {
        self.strokes.push_back(stroke);
    }

    /// Removes and returns the oldest stroke, or `None` if the buffer is empty.
    pub fn evict_oldest(&mut self) -> Option<Stroke> {
        self.strokes.pop_front()
    }

    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    /// Copies the buffered strokes out in arrival order.
    pub fn snapshot(&self) -> Vec<Stroke> {
        self.strokes.iter().cloned().collect()
    }
}
