//! Flush coordination - digest/alert decisions for each drained snapshot
//!
//! The coordinator never touches the live buffer. It receives the
//! drained snapshot from the consumer loop, decides what (if anything)
//! goes out, and hands deliveries to fire-and-forget send tasks so the
//! buffer-owning loop never waits on SMTP.

use super::mailer::{Mailer, Outgoing};
use super::rate::RateWindow;
use super::render::{render_alert, render_digest};
use super::types::Snapshot;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Addressing and routing knobs for digests and alerts.
#[derive(Debug, Clone)]
pub struct DigestRouting {
    pub server_name: String,
    pub report_to: String,
    pub report_from: String,
    pub reply_to: Option<String>,
    /// Recipient for digests made up entirely of monitoring noise.
    pub monitoring_report_to: Option<String>,
    pub pager_to: String,
    pub pager_from: String,
    pub pager_reply_to: Option<String>,
    /// Drop all-monitoring digests when no monitoring recipient exists.
    pub suppress_monitoring_digest: bool,
}

/// What one flush decided to send.
#[derive(Debug)]
pub struct FlushOutcome {
    pub digest: Option<Outgoing>,
    pub alert: Option<Outgoing>,
}

/// Drives the per-interval digest and alert emission path.
pub struct FlushCoordinator {
    rate: RateWindow,
    routing: DigestRouting,
    mailer: Arc<dyn Mailer>,
    in_flight: JoinSet<()>,
}

impl FlushCoordinator {
    pub fn new(rate: RateWindow, routing: DigestRouting, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            rate,
            routing,
            mailer,
            in_flight: JoinSet::new(),
        }
    }

    /// Handle one drained snapshot: decide, then dispatch.
    ///
    /// By the time this runs the next interval's buffer is already live,
    /// so a failed delivery can only ever lose this interval's digest.
    pub fn flush(&mut self, snapshot: Snapshot) {
        let outcome = self.evaluate(&snapshot);
        self.dispatch(outcome);
    }

    /// Decide what this interval sends, without performing any I/O.
    pub fn evaluate(&mut self, snapshot: &Snapshot) -> FlushOutcome {
        FlushOutcome {
            digest: self.plan_digest(snapshot),
            alert: self.plan_alert(snapshot.total),
        }
    }

    fn plan_digest(&self, snapshot: &Snapshot) -> Option<Outgoing> {
        if snapshot.total == 0 {
            return None;
        }

        let all_monitoring = snapshot.all_monitoring();
        let to = if all_monitoring {
            match &self.routing.monitoring_report_to {
                Some(to) => to.clone(),
                None if self.routing.suppress_monitoring_digest => {
                    log::debug!("Suppressing all-monitoring digest ({} events)", snapshot.total);
                    return None;
                }
                None => self.routing.report_to.clone(),
            }
        } else {
            self.routing.report_to.clone()
        };

        let rendered = match render_digest(snapshot, &self.routing.server_name) {
            Ok(rendered) => rendered,
            Err(err) => {
                log::error!("❌ Could not render digest, interval lost: {}", err);
                return None;
            }
        };

        Some(Outgoing {
            from: self.routing.report_from.clone(),
            to,
            reply_to: self.routing.reply_to.clone(),
            subject: rendered.subject,
            body: rendered.body,
        })
    }

    /// Record the interval total and raise a pager alert when the window
    /// sum exceeds the limit. The window is reset after an alert so one
    /// sustained burst pages once.
    fn plan_alert(&mut self, total: u64) -> Option<Outgoing> {
        self.rate.record(total);
        if !self.rate.is_over_threshold() {
            return None;
        }

        let windowed_total = self.rate.sum();
        self.rate.reset();
        log::warn!(
            "🚨 Error rate exceeded: {} events within the alert window",
            windowed_total
        );

        let rendered = render_alert(&self.routing.server_name, windowed_total);
        Some(Outgoing {
            from: self.routing.pager_from.clone(),
            to: self.routing.pager_to.clone(),
            reply_to: self.routing.pager_reply_to.clone(),
            subject: rendered.subject,
            body: rendered.body,
        })
    }

    /// Spawn each outgoing mail as its own task. Failures are logged;
    /// nothing is rolled back or re-queued.
    pub fn dispatch(&mut self, outcome: FlushOutcome) {
        for outgoing in [outcome.digest, outcome.alert].into_iter().flatten() {
            let mailer = self.mailer.clone();
            self.in_flight.spawn(async move {
                log::info!("📧 Sending \"{}\" to {}", outgoing.subject, outgoing.to);
                if let Err(err) = mailer.send(&outgoing).await {
                    log::error!(
                        "❌ Could not send \"{}\" to {}: {}",
                        outgoing.subject,
                        outgoing.to,
                        err
                    );
                }
            });
        }
        // Reap tasks that already finished; never block the flush path.
        while self.in_flight.try_join_next().is_some() {}
    }

    /// Wait for every spawned delivery. Called once at shutdown, after
    /// the final flush.
    pub async fn join_in_flight(&mut self) {
        while self.in_flight.join_next().await.is_some() {}
    }
}
