//! Core data structures for the ingestion-dedup-flush pipeline

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// The recognized fields of an inbound error report.
///
/// Every field is optional on the wire; senders fill in what they have.
/// `func_name` arrives as `funcName` in the datagram payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFields {
    pub module: Option<String>,
    pub func_name: Option<String>,
    pub filename: Option<String>,
    pub pathname: Option<String>,
    pub lineno: Option<u32>,
    pub message: Option<String>,
    pub exc_text: Option<String>,
    pub kind: Option<String>,
}

impl RecordFields {
    /// Value of one identity field, rendered as a key component.
    pub fn component(&self, field: IdentityField) -> Option<String> {
        match field {
            IdentityField::Module => self.module.clone(),
            IdentityField::FuncName => self.func_name.clone(),
            IdentityField::Filename => self.filename.clone(),
            IdentityField::Pathname => self.pathname.clone(),
            IdentityField::Lineno => self.lineno.map(|n| n.to_string()),
            IdentityField::Message => self.message.clone(),
            IdentityField::ExcText => self.exc_text.clone(),
            IdentityField::Kind => self.kind.clone(),
        }
    }
}

/// One decoded inbound occurrence. Immutable once decoded.
#[derive(Debug, Clone)]
pub struct Event {
    pub fields: RecordFields,
    /// Originating host, `"unknown"` when the sender omitted it.
    pub source: String,
    /// Receipt timestamp, assigned by the decoder.
    pub received_at: DateTime<Utc>,
}

/// A field that can participate in the deduplication identity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityField {
    Module,
    FuncName,
    Filename,
    Pathname,
    Lineno,
    Message,
    ExcText,
    Kind,
}

impl IdentityField {
    /// Wire name of this field, as it appears in datagram payloads
    /// and in the `ERRFLOW_IDENTITY_FIELDS` configuration list.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityField::Module => "module",
            IdentityField::FuncName => "funcName",
            IdentityField::Filename => "filename",
            IdentityField::Pathname => "pathname",
            IdentityField::Lineno => "lineno",
            IdentityField::Message => "message",
            IdentityField::ExcText => "exc_text",
            IdentityField::Kind => "kind",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "module" => Some(IdentityField::Module),
            "funcName" => Some(IdentityField::FuncName),
            "filename" => Some(IdentityField::Filename),
            "pathname" => Some(IdentityField::Pathname),
            "lineno" => Some(IdentityField::Lineno),
            "message" => Some(IdentityField::Message),
            "exc_text" => Some(IdentityField::ExcText),
            "kind" => Some(IdentityField::Kind),
            _ => None,
        }
    }

    pub fn all() -> [IdentityField; 8] {
        [
            IdentityField::Module,
            IdentityField::FuncName,
            IdentityField::Filename,
            IdentityField::Pathname,
            IdentityField::Lineno,
            IdentityField::Message,
            IdentityField::ExcText,
            IdentityField::Kind,
        ]
    }
}

/// Ordered list of fields that make up the dedup identity of an event.
///
/// Resolved and validated once at startup. Source host and receipt
/// timestamp are never part of the identity, so the same logical error
/// from different hosts and times collapses into one group.
#[derive(Debug, Clone)]
pub struct IdentitySpec {
    fields: Vec<IdentityField>,
}

impl IdentitySpec {
    pub fn new(fields: Vec<IdentityField>) -> Self {
        Self { fields }
    }

    /// All eight recognized fields, the default identity tuple.
    pub fn default_all() -> Self {
        Self::new(IdentityField::all().to_vec())
    }

    pub fn fields(&self) -> &[IdentityField] {
        &self.fields
    }

    /// Derive the dedup key for a set of record fields.
    ///
    /// Absent fields contribute a `None` component, so two records
    /// missing the same field still collapse together.
    pub fn key_for(&self, fields: &RecordFields) -> DedupKey {
        DedupKey(self.fields.iter().map(|f| fields.component(*f)).collect())
    }

    /// True if at least one identity field carries a value.
    pub fn has_any_value(&self, fields: &RecordFields) -> bool {
        self.fields.iter().any(|f| fields.component(*f).is_some())
    }
}

impl Default for IdentitySpec {
    fn default() -> Self {
        Self::default_all()
    }
}

/// Derived identity of an event: the ordered identity-field values.
///
/// Two events with equal identity-field values always produce equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(Vec<Option<String>>);

/// Substring matcher for intentional health-check errors.
///
/// An event matches when any configured marker occurs in its message or
/// exception text. Matching events still count and still appear in
/// digests; the flag only controls digest routing and suppression.
#[derive(Debug, Clone, Default)]
pub struct MonitoringMatcher {
    markers: Vec<String>,
}

impl MonitoringMatcher {
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }

    pub fn matches(&self, fields: &RecordFields) -> bool {
        self.markers.iter().any(|marker| {
            fields
                .message
                .as_deref()
                .is_some_and(|text| text.contains(marker))
                || fields
                    .exc_text
                    .as_deref()
                    .is_some_and(|text| text.contains(marker))
        })
    }
}

/// Aggregate record for one dedup key within the current interval.
#[derive(Debug, Clone)]
pub struct Group {
    /// Fields of the first occurrence, used for display.
    pub representative: RecordFields,
    /// Instance count across all sources. Monotonic within an interval.
    pub total: u64,
    /// Instance count per originating host, ordered by host name.
    pub per_source: BTreeMap<String, u64>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// True only while every instance matched a monitoring marker.
    pub monitoring_only: bool,
}

impl Group {
    /// Group seeded from the first event carrying a novel dedup key.
    pub fn seed(event: &Event, monitoring: bool) -> Self {
        let mut per_source = BTreeMap::new();
        per_source.insert(event.source.clone(), 1);
        Self {
            representative: event.fields.clone(),
            total: 1,
            per_source,
            first_seen: event.received_at,
            last_seen: event.received_at,
            monitoring_only: monitoring,
        }
    }

    /// Fold one more occurrence into the group.
    ///
    /// Counts grow, timestamps widen (first = min, last = max), and the
    /// monitoring flag is the AND of all instances seen so far.
    pub fn absorb(&mut self, event: &Event, monitoring: bool) {
        self.total += 1;
        *self.per_source.entry(event.source.clone()).or_insert(0) += 1;
        if event.received_at < self.first_seen {
            self.first_seen = event.received_at;
        }
        if event.received_at > self.last_seen {
            self.last_seen = event.received_at;
        }
        self.monitoring_only = self.monitoring_only && monitoring;
    }
}

/// Immutable result of draining the buffer at flush time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub groups: Vec<Group>,
    /// Total instance count across all groups.
    pub total: u64,
}

impl Snapshot {
    pub fn total_unique(&self) -> usize {
        self.groups.len()
    }

    /// True when the snapshot is non-empty and every group consists
    /// solely of monitoring-marker noise.
    pub fn all_monitoring(&self) -> bool {
        !self.groups.is_empty() && self.groups.iter().all(|g| g.monitoring_only)
    }

    /// Distinct `kind` discriminators present in the snapshot.
    pub fn kinds(&self) -> BTreeSet<String> {
        self.groups
            .iter()
            .filter_map(|g| g.representative.kind.clone())
            .collect()
    }

    /// Groups in reverse order of count, for digest rendering.
    pub fn sorted_groups(&self) -> Vec<&Group> {
        let mut groups: Vec<&Group> = self.groups.iter().collect();
        groups.sort_by(|a, b| b.total.cmp(&a.total));
        groups
    }
}
