//! UDP ingestion - receive datagrams, decode, forward to the aggregator
//!
//! The listener never aggregates and never blocks unboundedly: the
//! channel handoff uses a bounded wait, and anything that cannot be
//! decoded or enqueued in time is counted and dropped.

use super::decoder::Decoder;
use super::types::Event;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

/// Drop counters kept by the listener, readable from anywhere.
#[derive(Debug, Default)]
pub struct ListenerStats {
    received: AtomicU64,
    decode_failures: AtomicU64,
    backpressure_drops: AtomicU64,
}

impl ListenerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    pub fn backpressure_drops(&self) -> u64 {
        self.backpressure_drops.load(Ordering::Relaxed)
    }
}

/// Receive datagrams until the aggregation channel closes.
///
/// Per datagram: decode, then forward with a bounded wait. A decode
/// failure or a full queue past `send_timeout` drops the datagram and
/// bumps the matching counter; the receive path stays live either way.
pub async fn run_listener(
    socket: UdpSocket,
    decoder: Decoder,
    tx: mpsc::Sender<Event>,
    stats: Arc<ListenerStats>,
    send_timeout: Duration,
    max_datagram: usize,
) {
    log::info!(
        "📡 Listener started (max datagram {} bytes, handoff timeout {}ms)",
        max_datagram,
        send_timeout.as_millis()
    );

    let mut buf = vec![0u8; max_datagram];
    let mut last_log = Instant::now();

    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(err) => {
                log::error!("❌ Socket receive failed: {}", err);
                continue;
            }
        };
        stats.received.fetch_add(1, Ordering::Relaxed);

        match decoder.decode(&buf[..len]) {
            Ok(event) => match tx.send_timeout(event, send_timeout).await {
                Ok(()) => {}
                Err(SendTimeoutError::Timeout(_)) => {
                    stats.backpressure_drops.fetch_add(1, Ordering::Relaxed);
                    log::warn!("⚠️  Aggregation queue full, dropping event from {}", peer);
                }
                Err(SendTimeoutError::Closed(_)) => {
                    log::warn!("⚠️  Aggregation channel closed, stopping listener");
                    break;
                }
            },
            Err(err) => {
                stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("⚠️  Dropping undecodable datagram from {}: {}", peer, err);
            }
        }

        if last_log.elapsed().as_secs() >= 10 {
            log::info!(
                "📊 Listener: {} received, {} decode failures, {} backpressure drops",
                stats.received(),
                stats.decode_failures(),
                stats.backpressure_drops()
            );
            last_log = Instant::now();
        }
    }

    log::info!("✅ Listener stopped");
}
