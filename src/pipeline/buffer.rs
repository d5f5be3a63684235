//! The mutable dedup buffer and its owning aggregator
//!
//! Exactly one live buffer exists at a time. All `apply` and `drain`
//! calls are serialized by the consumer loop (single lock acquisition
//! per event / per flush), so an event lands in exactly one snapshot.

use super::types::{DedupKey, Event, Group, IdentitySpec, MonitoringMatcher, Snapshot};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Owns the live buffer of groups keyed by dedup identity.
pub struct Aggregator {
    buffer: HashMap<DedupKey, Group>,
    identity: IdentitySpec,
    monitoring: MonitoringMatcher,
}

impl Aggregator {
    pub fn new(identity: IdentitySpec, monitoring: MonitoringMatcher) -> Self {
        Self {
            buffer: HashMap::new(),
            identity,
            monitoring,
        }
    }

    /// Fold one event into the current buffer, creating a group on the
    /// first occurrence of a novel dedup key.
    pub fn apply(&mut self, event: Event) {
        let key = self.identity.key_for(&event.fields);
        let monitoring = self.monitoring.matches(&event.fields);
        match self.buffer.entry(key) {
            Entry::Occupied(mut entry) => entry.get_mut().absorb(&event, monitoring),
            Entry::Vacant(entry) => {
                entry.insert(Group::seed(&event, monitoring));
            }
        }
    }

    /// Atomically replace the live buffer with an empty one, returning
    /// a snapshot of everything accumulated since the previous drain.
    pub fn drain(&mut self) -> Snapshot {
        let buffer = std::mem::take(&mut self.buffer);
        let mut total = 0;
        let groups: Vec<Group> = buffer.into_values().collect();
        for group in &groups {
            total += group.total;
        }
        Snapshot { groups, total }
    }

    /// Number of groups pending in the live buffer.
    pub fn pending_groups(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{IdentityField, RecordFields};
    use chrono::Utc;

    fn make_aggregator() -> Aggregator {
        Aggregator::new(
            IdentitySpec::default_all(),
            MonitoringMatcher::new(vec!["canary-0000".to_string()]),
        )
    }

    fn make_event(message: &str, source: &str) -> Event {
        Event {
            fields: RecordFields {
                module: Some("app.views".to_string()),
                func_name: Some("checkout".to_string()),
                filename: Some("views.py".to_string()),
                pathname: Some("/srv/app/views.py".to_string()),
                lineno: Some(88),
                message: Some(message.to_string()),
                exc_text: None,
                kind: Some("web".to_string()),
            },
            source: source.to_string(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_identical_events_from_different_hosts_share_one_group() {
        let mut agg = make_aggregator();
        agg.apply(make_event("boom", "host-a"));
        agg.apply(make_event("boom", "host-b"));

        let snapshot = agg.drain();
        assert_eq!(snapshot.total_unique(), 1);
        assert_eq!(snapshot.total, 2);
        let group = &snapshot.groups[0];
        assert_eq!(group.per_source.get("host-a"), Some(&1));
        assert_eq!(group.per_source.get("host-b"), Some(&1));
    }

    #[test]
    fn test_same_host_repeats_accumulate_on_one_source() {
        let mut agg = make_aggregator();
        agg.apply(make_event("boom", "host-a"));
        agg.apply(make_event("boom", "host-a"));

        let snapshot = agg.drain();
        assert_eq!(snapshot.groups[0].per_source.get("host-a"), Some(&2));
    }

    #[test]
    fn test_distinct_messages_form_distinct_groups() {
        let mut agg = make_aggregator();
        agg.apply(make_event("boom", "host-a"));
        agg.apply(make_event("other failure", "host-a"));

        let snapshot = agg.drain();
        assert_eq!(snapshot.total_unique(), 2);
        assert_eq!(snapshot.total, 2);
    }

    #[test]
    fn test_narrow_identity_collapses_differing_messages() {
        let mut agg = Aggregator::new(
            IdentitySpec::new(vec![IdentityField::Module, IdentityField::Lineno]),
            MonitoringMatcher::default(),
        );
        agg.apply(make_event("first wording", "host-a"));
        agg.apply(make_event("second wording", "host-b"));

        let snapshot = agg.drain();
        assert_eq!(snapshot.total_unique(), 1);
        assert_eq!(snapshot.total, 2);
        // The representative is the first occurrence.
        assert_eq!(
            snapshot.groups[0].representative.message.as_deref(),
            Some("first wording")
        );
    }

    #[test]
    fn test_drain_resets_the_buffer_without_losing_events() {
        let mut agg = make_aggregator();
        for _ in 0..3 {
            agg.apply(make_event("boom", "host-a"));
        }
        let first = agg.drain();
        assert_eq!(first.total, 3);
        assert_eq!(agg.pending_groups(), 0);

        for _ in 0..2 {
            agg.apply(make_event("boom", "host-a"));
        }
        let second = agg.drain();
        assert_eq!(second.total, 2);
        assert_eq!(first.total + second.total, 5);
    }

    #[test]
    fn test_drain_on_empty_buffer_yields_zero_snapshot() {
        let mut agg = make_aggregator();
        let snapshot = agg.drain();
        assert_eq!(snapshot.total, 0);
        assert!(snapshot.groups.is_empty());
        assert!(!snapshot.all_monitoring());
    }

    #[test]
    fn test_monitoring_flag_is_and_of_all_instances() {
        let mut agg = make_aggregator();
        agg.apply(make_event("probe canary-0000", "mon"));
        agg.apply(make_event("probe canary-0000", "mon"));
        let snapshot = agg.drain();
        assert!(snapshot.groups[0].monitoring_only);

        // One real occurrence clears the flag for the whole group. The
        // identity is narrowed to module so both land in the same group.
        let mut agg = Aggregator::new(
            IdentitySpec::new(vec![IdentityField::Module]),
            MonitoringMatcher::new(vec!["canary-0000".to_string()]),
        );
        agg.apply(make_event("probe canary-0000", "mon"));
        agg.apply(make_event("boom", "host-a"));
        let snapshot = agg.drain();
        assert_eq!(snapshot.total_unique(), 1);
        assert!(!snapshot.groups[0].monitoring_only);
        assert!(!snapshot.all_monitoring());
    }
}
