use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info};

use super::Canvas;
use crate::server::HealthMetrics;

/// Runs one eviction pass over the canvas every `period`, forever.
///
/// The first pass happens one full period after start. Passes are serialized
/// by the canvas lock, so a slow pass delays the next tick instead of
/// overlapping with it.
pub async fn run_eviction(canvas: Arc<Canvas>, period: Duration, metrics: HealthMetrics) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Evicting the oldest stroke of every frame every {:?}", period);

    loop {
        ticker.tick().await;

        let evicted = canvas.evict_oldest_from_all();
        metrics.strokes_evicted.inc_by(evicted as u64);
        metrics.frames.set(canvas.frame_count() as i64);

        debug!(evicted, frames = canvas.frame_count(), "Eviction pass complete");
    }
}

/// Spawns [`run_eviction`] on the current runtime. Abort the handle to stop it.
pub fn spawn_eviction(canvas: Arc<Canvas>, period: Duration, metrics: HealthMetrics) -> JoinHandle<()> {
    tokio::spawn(run_eviction(canvas, period, metrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Stroke, StrokeData};

    const PERIOD: Duration = Duration::from_secs(10);

    fn colors(canvas: &Canvas, index: usize) -> Vec<String> {
        canvas
            .strokes(index)
            .unwrap()
            .iter()
            .map(Stroke::color)
            .map(str::to_owned)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn evicts_once_per_period() {
        let canvas = Arc::new(Canvas::default());
        canvas.add_stroke(StrokeData::new(0, "red", vec![])).unwrap();
        canvas.add_stroke(StrokeData::new(0, "blue", vec![])).unwrap();
        canvas.add_stroke(StrokeData::new(1, "green", vec![])).unwrap();

        let metrics = HealthMetrics::new().unwrap();
        let handle = spawn_eviction(canvas.clone(), PERIOD, metrics.clone());

        time::sleep(PERIOD / 2).await;
        assert_eq!(colors(&canvas, 0), vec!["red", "blue"]);

        time::sleep(PERIOD / 2 + Duration::from_millis(1)).await;
        assert_eq!(colors(&canvas, 0), vec!["blue"]);
        assert!(colors(&canvas, 1).is_empty());
        assert_eq!(metrics.strokes_evicted.get(), 2);

        time::sleep(PERIOD * 2).await;
        assert!(colors(&canvas, 0).is_empty());
        assert_eq!(canvas.frame_count(), 2);
        assert_eq!(metrics.strokes_evicted.get(), 3);

        handle.abort();
    }
}
