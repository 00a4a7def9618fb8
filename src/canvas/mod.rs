// src/canvas/mod.rs
pub mod eviction;
pub mod frame;
pub mod stroke;

pub use eviction::spawn_eviction;
pub use frame::FrameBuffer;
pub use stroke::{Stroke, StrokeData};

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

/// Upper bound on materialized frames unless configured otherwise.
pub const DEFAULT_MAX_FRAMES: usize = 10_000;

/// Errors raised at the canvas boundary. Each one is confined to the single
/// event that caused it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CanvasError {
    /// The frame index is missing, non-numeric, negative, fractional or
    /// beyond the frame cap.
    #[error("Invalid frame index: {0}")]
    InvalidIndex(String),

    /// The stroke payload lacks required fields or could not be decoded.
    #[error("Malformed stroke: {0}")]
    MalformedStroke(String),
}

/// Summary of a stroke the canvas accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeAdded {
    pub frame_index: usize,
    /// Number of strokes in the frame after the append.
    pub stroke_count: usize,
    pub color: String,
    pub point_count: usize,
}

/// Interprets a raw JSON frame index.
///
/// Only JSON numbers holding a finite, non-negative integer are accepted;
/// `3` and `3.0` both resolve to frame 3. Strings (numeric or not), null,
/// booleans, arrays and objects are rejected.
pub fn parse_frame_index(value: &Value) -> Result<usize, CanvasError> {
    let invalid = || CanvasError::InvalidIndex(format!("expected a non-negative integer, got {value}"));

    let Value::Number(number) = value else {
        return Err(invalid());
    };

    if let Some(index) = number.as_u64() {
        return usize::try_from(index).map_err(|_| invalid());
    }

    match number.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= usize::MAX as f64 => {
            Ok(f as usize)
        }
        _ => Err(invalid()),
    }
}

/// The shared drawing layer: a dense, append-only sequence of frame buffers.
///
/// Requesting frame `k` materializes every missing buffer in `0..=k`. Buffers
/// are never removed, only drained by eviction, so the number of frames only
/// grows. All access goes through one lock; an append and an eviction pass
/// never interleave.
#[derive(Debug)]
pub struct Canvas {
    frames: Mutex<Vec<FrameBuffer>>,
    max_frames: usize,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAMES)
    }
}

impl Canvas {
    /// Creates an empty canvas that accepts frame indices below `max_frames`.
    pub fn new(max_frames: usize) -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            max_frames,
        }
    }

    /// Number of frame indices the canvas accepts.
    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Number of materialized frame buffers.
    pub fn frame_count(&self) -> usize {
        self.lock().len()
    }

    /// Returns the strokes of frame `index`, creating it and every missing
    /// lower frame first.
    ///
    /// # Errors
    /// Returns `CanvasError::InvalidIndex` if `index` is at or above the
    /// frame cap. Nothing is materialized in that case.
    pub fn get_or_create_frame(&self, index: usize) -> Result<Vec<Stroke>, CanvasError> {
        self.check_bounds(index)?;
        let mut frames = self.lock();
        Ok(Self::materialize(&mut frames, index).snapshot())
    }

    /// Returns the strokes of frame `index` without materializing anything.
    pub fn strokes(&self, index: usize) -> Option<Vec<Stroke>> {
        self.lock().get(index).map(FrameBuffer::snapshot)
    }

    /// Validates a submission's frame index and appends it to that frame.
    ///
    /// The caller owns the failure policy: a rejected stroke is returned as an
    /// error and the canvas is left untouched.
    ///
    /// # Errors
    /// Returns `CanvasError::InvalidIndex` if the index is not a non-negative
    /// integer below the frame cap.
    pub fn add_stroke(&self, data: StrokeData) -> Result<StrokeAdded, CanvasError> {
        let frame_index = parse_frame_index(&data.index)?;
        self.check_bounds(frame_index)?;

        let stroke = Stroke::accept(frame_index, data);
        let color = stroke.color().to_owned();
        let point_count = stroke.points().len();

        let stroke_count = {
            let mut frames = self.lock();
            let buffer = Self::materialize(&mut frames, frame_index);
            buffer.push(stroke);
            buffer.len()
        };

        info!(
            frame = frame_index,
            strokes = stroke_count,
            color = %color,
            points = point_count,
            "Received a stroke"
        );

        Ok(StrokeAdded {
            frame_index,
            stroke_count,
            color,
            point_count,
        })
    }

    /// Removes the oldest stroke from every non-empty frame in one pass.
    ///
    /// Returns the number of strokes removed. Frames created after the pass
    /// takes the lock are not part of it.
    pub fn evict_oldest_from_all(&self) -> usize {
        let mut frames = self.lock();
        let mut evicted = 0;

        for (index, buffer) in frames.iter_mut().enumerate() {
            if buffer.evict_oldest().is_some() {
                debug!(frame = index, remaining = buffer.len(), "Removed oldest stroke");
                evicted += 1;
            }
        }

        evicted
    }

    fn check_bounds(&self, index: usize) -> Result<(), CanvasError> {
        if index >= self.max_frames {
            return Err(CanvasError::InvalidIndex(format!(
                "frame {index} exceeds the limit of {} frames",
                self.max_frames
            )));
        }
        Ok(())
    }

    fn materialize(frames: &mut Vec<FrameBuffer>, index: usize) -> &mut FrameBuffer {
        if frames.len() <= index {
            frames.resize_with(index + 1, FrameBuffer::new);
        }
        &mut frames[index]
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FrameBuffer>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::{collections::HashSet, sync::Arc, thread};

    fn stroke(index: impl Into<Value>, color: &str, points: Vec<Value>) -> StrokeData {
        StrokeData::new(index, color, points)
    }

    fn colors(strokes: &[Stroke]) -> Vec<&str> {
        strokes.iter().map(Stroke::color).collect()
    }

    #[test]
    fn frame_count_tracks_highest_index() {
        let canvas = Canvas::default();
        for index in [3, 0, 7, 2] {
            canvas.add_stroke(stroke(index, "red", vec![])).unwrap();
        }

        assert_eq!(canvas.frame_count(), 8);
        for index in 0..8 {
            assert!(canvas.strokes(index).is_some(), "frame {index} missing");
        }
        assert_eq!(canvas.strokes(4).unwrap().len(), 0);
    }

    #[test]
    fn get_or_create_fills_gaps_without_overwriting() {
        let canvas = Canvas::default();
        canvas.add_stroke(stroke(1, "red", vec![])).unwrap();

        assert!(canvas.get_or_create_frame(4).unwrap().is_empty());
        assert_eq!(canvas.frame_count(), 5);
        assert_eq!(colors(&canvas.get_or_create_frame(1).unwrap()), vec!["red"]);
        assert_eq!(canvas.frame_count(), 5);
    }

    #[test]
    fn strokes_keep_arrival_order() {
        let canvas = Canvas::default();
        canvas
            .add_stroke(stroke(0, "red", vec![json!([0, 0]), json!([1, 1])]))
            .unwrap();
        let added = canvas.add_stroke(stroke(0, "blue", vec![json!([2, 2])])).unwrap();

        assert_eq!(
            added,
            StrokeAdded {
                frame_index: 0,
                stroke_count: 2,
                color: "blue".into(),
                point_count: 1,
            }
        );

        let frame = canvas.get_or_create_frame(0).unwrap();
        assert_eq!(colors(&frame), vec!["red", "blue"]);
        assert_eq!(frame[0].points(), &[json!([0, 0]), json!([1, 1])]);
        assert!(frame.iter().all(|s| s.frame_index() == 0 && s.extra().is_empty()));
        assert!(frame[0].received_at() <= frame[1].received_at());
    }

    #[test]
    fn eviction_drains_from_the_front() {
        let canvas = Canvas::default();
        canvas.add_stroke(stroke(0, "red", vec![])).unwrap();
        canvas.add_stroke(stroke(0, "blue", vec![])).unwrap();

        assert_eq!(canvas.evict_oldest_from_all(), 1);
        assert_eq!(colors(&canvas.strokes(0).unwrap()), vec!["blue"]);

        assert_eq!(canvas.evict_oldest_from_all(), 1);
        assert!(canvas.strokes(0).unwrap().is_empty());

        assert_eq!(canvas.evict_oldest_from_all(), 0);
        assert!(canvas.strokes(0).unwrap().is_empty());
        assert_eq!(canvas.frame_count(), 1);
    }

    #[test]
    fn eviction_retains_the_newest_suffix() {
        let canvas = Canvas::default();
        let names = ["a", "b", "c", "d", "e"];
        for name in names {
            canvas.add_stroke(stroke(2, name, vec![])).unwrap();
        }
        canvas.add_stroke(stroke(0, "x", vec![])).unwrap();

        for k in 0..=names.len() + 1 {
            let frame = canvas.strokes(2).unwrap();
            let expected = &names[k.min(names.len())..];
            assert_eq!(colors(&frame), expected.to_vec(), "after {k} passes");
            canvas.evict_oldest_from_all();
        }

        assert!(canvas.strokes(0).unwrap().is_empty());
        assert!(canvas.strokes(1).unwrap().is_empty());
    }

    #[test]
    fn invalid_indices_never_touch_the_canvas() {
        let canvas = Canvas::new(16);
        canvas.add_stroke(stroke(1, "red", vec![])).unwrap();

        for index in [json!("abc"), json!(-1), json!(1.5), json!("3"), json!(null), json!(true), json!(16)] {
            let err = canvas.add_stroke(stroke(index.clone(), "red", vec![])).unwrap_err();
            assert!(matches!(err, CanvasError::InvalidIndex(_)), "{index} accepted");
        }

        assert_eq!(canvas.frame_count(), 2);
        assert_eq!(canvas.strokes(1).unwrap().len(), 1);
    }

    #[test]
    fn frame_request_beyond_cap_is_rejected() {
        let canvas = Canvas::new(4);
        assert_eq!(canvas.max_frames(), 4);
        assert!(canvas.get_or_create_frame(canvas.max_frames()).is_err());
        assert_eq!(canvas.frame_count(), 0);
        assert!(canvas.get_or_create_frame(3).is_ok());
        assert_eq!(canvas.frame_count(), 4);
    }

    #[test]
    fn parses_integral_numbers_only() {
        assert_eq!(parse_frame_index(&json!(0)), Ok(0));
        assert_eq!(parse_frame_index(&json!(12)), Ok(12));
        assert_eq!(parse_frame_index(&json!(4.0)), Ok(4));
        assert!(parse_frame_index(&json!(-3)).is_err());
        assert!(parse_frame_index(&json!(0.25)).is_err());
        assert!(parse_frame_index(&json!("7")).is_err());
        assert!(parse_frame_index(&json!({"num": 1})).is_err());
    }

    #[test]
    fn concurrent_appends_and_evictions_lose_nothing() {
        const WRITERS: usize = 4;
        const PER_WRITER: usize = 500;
        const FRAMES: usize = 3;

        let canvas = Arc::new(Canvas::default());
        let writers: Vec<_> = (0..WRITERS)
            .map(|writer| {
                let canvas = Arc::clone(&canvas);
                thread::spawn(move || {
                    for seq in 0..PER_WRITER {
                        let data = stroke(seq % FRAMES, &format!("{writer}:{seq}"), vec![]);
                        canvas.add_stroke(data).unwrap();
                    }
                })
            })
            .collect();
        let evictor = {
            let canvas = Arc::clone(&canvas);
            thread::spawn(move || (0..300).map(|_| canvas.evict_oldest_from_all()).sum::<usize>())
        };

        for handle in writers {
            handle.join().unwrap();
        }
        let evicted = evictor.join().unwrap();

        assert_eq!(canvas.frame_count(), FRAMES);
        let mut seen = HashSet::new();
        let mut remaining = 0;
        for frame in 0..FRAMES {
            let strokes = canvas.strokes(frame).unwrap();
            remaining += strokes.len();

            for writer in 0..WRITERS {
                let seqs: Vec<usize> = strokes
                    .iter()
                    .filter_map(|s| {
                        let (w, seq) = s.color().split_once(':')?;
                        if w.parse::<usize>().ok()? != writer {
                            return None;
                        }
                        seq.parse::<usize>().ok()
                    })
                    .collect();
                // Front eviction leaves each writer's newest strokes in order.
                assert!(seqs.windows(2).all(|pair| pair[1] == pair[0] + FRAMES), "{seqs:?}");
                if let Some(last) = seqs.last() {
                    let newest = (0..PER_WRITER).rev().find(|seq| seq % FRAMES == frame);
                    assert_eq!(Some(*last), newest);
                }
            }

            for s in &strokes {
                assert_eq!(s.frame_index(), frame);
                assert!(seen.insert(s.color().to_owned()), "duplicate {}", s.color());
            }
        }

        assert_eq!(remaining + evicted, WRITERS * PER_WRITER);
    }
}
