//! errflow daemon entry point
//!
//! Binds the inbound UDP socket, wires the pipeline together, and runs
//! until CTRL+C. Shutdown stops the listener first so the aggregation
//! loop can perform a final flush of whatever is still buffered.
//!
//! Usage:
//!   errflow
//!
//! All configuration comes from environment variables (see
//! `Config::from_env`); a `.env` file is honored.

use dotenv::dotenv;
use errflow::config::Config;
use errflow::pipeline::{
    buffer::Aggregator,
    flush::FlushCoordinator,
    ingestion::run_pipeline,
    listener::{run_listener, ListenerStats},
    mailer::{Mailer, SmtpMailer},
    rate::RateWindow,
    types::{Event, MonitoringMatcher},
    Decoder,
};
use log::{error, info};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Starting errflow...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("❌ Configuration error: {}", err);
            std::process::exit(1);
        }
    };

    info!("📊 Configuration:");
    info!("   ├─ Bind: {}", config.bind);
    info!("   ├─ Flush interval: {}s", config.flush_seconds);
    info!(
        "   ├─ Pager window: {} intervals, limit {}",
        config.pager_window_size, config.pager_limit
    );
    info!(
        "   ├─ Identity fields: {}",
        config
            .identity_fields
            .fields()
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(",")
    );
    info!("   ├─ Monitoring markers: {}", config.monitoring_markers.len());
    info!("   ├─ Digests to: {}", config.report_to);
    info!("   ├─ Pages to: {}", config.pager_to);
    info!("   └─ SMTP relay: {}:{}", config.smtp_host, config.smtp_port);

    let socket = match UdpSocket::bind(config.bind).await {
        Ok(socket) => socket,
        Err(err) => {
            error!("❌ Could not bind {}: {}", config.bind, err);
            std::process::exit(1);
        }
    };
    info!("📡 Listening on {}", config.bind);

    let credentials = match (&config.smtp_user, &config.smtp_password) {
        (Some(user), Some(password)) => Some((user.clone(), password.clone())),
        _ => None,
    };
    let mailer: Arc<dyn Mailer> =
        match SmtpMailer::new(&config.smtp_host, config.smtp_port, credentials) {
            Ok(mailer) => Arc::new(mailer),
            Err(err) => {
                error!("❌ Could not set up SMTP transport: {}", err);
                std::process::exit(1);
            }
        };

    let decoder = Decoder::new(config.identity_fields.clone(), config.source_field.clone());
    let aggregator = Arc::new(Mutex::new(Aggregator::new(
        config.identity_fields.clone(),
        MonitoringMatcher::new(config.monitoring_markers.clone()),
    )));
    let coordinator = FlushCoordinator::new(
        RateWindow::new(config.pager_window_size, config.pager_limit),
        config.routing(),
        mailer,
    );

    let (tx, rx) = mpsc::channel::<Event>(config.channel_buffer);
    let stats = Arc::new(ListenerStats::new());

    let listener = tokio::spawn(run_listener(
        socket,
        decoder,
        tx,
        stats.clone(),
        Duration::from_millis(config.send_timeout_ms),
        config.max_datagram,
    ));
    let pipeline = tokio::spawn(run_pipeline(
        rx,
        aggregator,
        coordinator,
        Duration::from_secs(config.flush_seconds),
    ));

    info!("✅ All tasks running, press CTRL+C to shut down");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
        Err(err) => error!("❌ Could not listen for CTRL+C: {}", err),
    }

    // Stopping the listener drops the channel sender; the aggregation
    // loop sees the close, flushes one last time, and exits.
    listener.abort();
    if let Err(err) = pipeline.await {
        error!("❌ Aggregation loop did not stop cleanly: {}", err);
    }

    info!(
        "✅ errflow stopped ({} received, {} decode failures, {} backpressure drops)",
        stats.received(),
        stats.decode_failures(),
        stats.backpressure_drops()
    );
}
