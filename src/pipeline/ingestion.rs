//! Unified consumer loop - event application plus periodic flushing
//!
//! One task performs every `apply` and every `drain` (single lock
//! acquisition per event / per flush), which is what makes the
//! drain-vs-apply boundary total: an event processed before a drain is
//! in that snapshot, an event processed after is in the next one.

use super::buffer::Aggregator;
use super::flush::FlushCoordinator;
use super::types::Event;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;

/// Run the aggregation/flush loop until the event channel closes.
///
/// Events are applied in the order they leave the queue. On every timer
/// tick the buffer is drained and the snapshot handed to the flush
/// coordinator; delivery happens on spawned tasks so a slow SMTP
/// conversation never delays the next apply or the next tick. When the
/// channel closes a final flush runs so buffered events still go out.
pub async fn run_pipeline(
    mut rx: mpsc::Receiver<Event>,
    aggregator: Arc<Mutex<Aggregator>>,
    mut coordinator: FlushCoordinator,
    flush_interval: Duration,
) {
    log::info!(
        "🚀 Aggregation loop started (flush every {}s)",
        flush_interval.as_secs()
    );

    let mut flush_timer = interval(flush_interval);
    // The first tick completes immediately; consume it so the first
    // flush covers a full interval.
    flush_timer.tick().await;

    let mut applied = 0u64;
    let mut last_log = Instant::now();

    loop {
        tokio::select! {
            maybe_event = rx.recv() => match maybe_event {
                Some(event) => {
                    {
                        let mut aggregator = aggregator.lock().unwrap();
                        aggregator.apply(event);
                    }
                    applied += 1;

                    if last_log.elapsed().as_secs() >= 10 {
                        let rate = applied as f64 / last_log.elapsed().as_secs_f64();
                        log::info!("📊 Ingestion rate: {:.1} events/sec", rate);
                        applied = 0;
                        last_log = Instant::now();
                    }
                }
                None => {
                    log::info!("🔄 Event channel closed, performing final flush...");
                    let snapshot = {
                        let mut aggregator = aggregator.lock().unwrap();
                        aggregator.drain()
                    };
                    coordinator.flush(snapshot);
                    coordinator.join_in_flight().await;
                    break;
                }
            },

            _ = flush_timer.tick() => {
                let flush_start = Instant::now();
                let snapshot = {
                    let mut aggregator = aggregator.lock().unwrap();
                    aggregator.drain()
                };
                let total = snapshot.total;
                let unique = snapshot.total_unique();
                coordinator.flush(snapshot);
                log::info!(
                    "📦 Flush complete: {} events, {} groups | channel: {} queued | {}ms",
                    total,
                    unique,
                    rx.len(),
                    flush_start.elapsed().as_millis()
                );
            }
        }
    }

    log::info!("✅ Aggregation loop stopped");
}
