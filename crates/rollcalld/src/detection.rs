//! The periodic detection loop.

use crate::engine::{EngineHandle, Observation};
use crate::frames::FrameSource;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Run detection-and-match cycles at a fixed tick.
///
/// Each cycle is awaited to completion before the next tick can fire,
/// and missed ticks are skipped rather than queued — there is never
/// more than one inference request in flight, no matter how slow a
/// cycle gets. When the spool has no fresh frame the loop idles.
pub async fn run_detection_loop(
    engine: EngineHandle,
    mut source: Box<dyn FrameSource>,
    tick: Duration,
    latest: Arc<Mutex<Vec<Observation>>>,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(tick_ms = tick.as_millis() as u64, "detection loop started");

    loop {
        interval.tick().await;

        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "frame source failed this tick");
                continue;
            }
        };

        match engine.observe(frame).await {
            Ok(observations) => {
                if let Ok(mut latest) = latest.lock() {
                    *latest = observations;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "detection cycle failed");
            }
        }
    }
}
