//! The ingestion-dedup-flush pipeline
//!
//! Inbound datagrams are decoded into events, deduplicated into an
//! in-memory buffer of groups, and flushed on a fixed interval into a
//! digest email; a sliding window over interval totals raises an
//! out-of-band pager alert on rate spikes.
//!
//! Data flow:
//!
//! ```text
//! datagram -> Decoder -> Event -> listener -> queue -> Aggregator.apply()
//! timer tick -> Aggregator.drain() -> Snapshot -> FlushCoordinator
//!     -> digest email (render + send)
//!     -> RateWindow.record() -> pager alert
//! ```
//!
//! Raw events are never persisted: the buffer is memory-resident and
//! intentionally lost on restart. Module organization:
//!
//! - `types` - events, dedup keys, groups, snapshots
//! - `decoder` - datagram payload to event
//! - `buffer` - the aggregator owning the live buffer
//! - `rate` - sliding window over interval totals
//! - `listener` - UDP receive path with drop counters
//! - `ingestion` - unified apply/flush consumer loop
//! - `flush` - digest/alert decisions per drained snapshot
//! - `render` - plain-text digest and alert bodies
//! - `mailer` - outbound mail trait and SMTP implementation

pub mod buffer;
pub mod decoder;
pub mod flush;
pub mod ingestion;
pub mod listener;
pub mod mailer;
pub mod rate;
pub mod render;
pub mod types;

// Re-export commonly used types
pub use buffer::Aggregator;
pub use decoder::{DecodeError, Decoder};
pub use flush::{DigestRouting, FlushCoordinator};
pub use ingestion::run_pipeline;
pub use listener::{run_listener, ListenerStats};
pub use mailer::{Mailer, Outgoing, SendError, SmtpMailer};
pub use rate::RateWindow;
pub use types::{DedupKey, Event, Group, IdentityField, IdentitySpec, MonitoringMatcher, Snapshot};
