//! Datagram decoding - one inbound UDP payload to one structured event
//!
//! Decoding is a pure function over the payload bytes plus the startup
//! configuration (identity tuple, source field name). Failures never
//! reach the buffer; the listener counts and drops the datagram.

use super::types::{Event, IdentitySpec, RecordFields};
use chrono::Utc;
use serde_json::Value;

/// Why an inbound datagram could not be turned into an event.
#[derive(Debug)]
pub enum DecodeError {
    /// Payload was not valid JSON.
    Malformed(serde_json::Error),
    /// Payload was JSON but not an object.
    NotAnObject,
    /// Every configured identity field was absent from the record.
    NoIdentity,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Malformed(err) => write!(f, "payload is not valid JSON: {}", err),
            DecodeError::NotAnObject => write!(f, "payload is not a JSON object"),
            DecodeError::NoIdentity => write!(f, "record carries no identity field"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Malformed(err) => Some(err),
            DecodeError::NotAnObject | DecodeError::NoIdentity => None,
        }
    }
}

/// Parses inbound datagrams into [`Event`]s.
#[derive(Debug, Clone)]
pub struct Decoder {
    identity: IdentitySpec,
    source_field: String,
}

impl Decoder {
    pub fn new(identity: IdentitySpec, source_field: String) -> Self {
        Self {
            identity,
            source_field,
        }
    }

    /// Decode one datagram payload.
    ///
    /// Unrecognized fields in the payload are ignored. A record whose
    /// configured identity fields are all absent is rejected; individual
    /// absent fields are fine and become `None` key components.
    pub fn decode(&self, payload: &[u8]) -> Result<Event, DecodeError> {
        let value: Value = serde_json::from_slice(payload).map_err(DecodeError::Malformed)?;
        let record = value.as_object().ok_or(DecodeError::NotAnObject)?;

        let mut fields = RecordFields {
            module: string_field(record, "module"),
            func_name: string_field(record, "funcName"),
            filename: string_field(record, "filename"),
            pathname: string_field(record, "pathname"),
            lineno: record
                .get("lineno")
                .and_then(Value::as_u64)
                .map(|n| n as u32),
            message: string_field(record, "message"),
            exc_text: string_field(record, "exc_text"),
            kind: string_field(record, "kind"),
        };
        clip_multiline_message(&mut fields);

        if !self.identity.has_any_value(&fields) {
            return Err(DecodeError::NoIdentity);
        }

        let source =
            string_field(record, &self.source_field).unwrap_or_else(|| "unknown".to_string());

        Ok(Event {
            fields,
            source,
            received_at: Utc::now(),
        })
    }
}

/// Clip a multi-line message at its first newline, preserving the full
/// text as the exception text when none was supplied. Keeps dedup keys
/// stable for errors whose messages embed variable tracebacks.
fn clip_multiline_message(fields: &mut RecordFields) {
    let Some(message) = fields.message.take() else {
        return;
    };
    match message.find('\n') {
        Some(idx) => {
            let first_line = message[..idx].to_string();
            if fields.exc_text.as_deref().map_or(true, str::is_empty) {
                fields.exc_text = Some(message);
            }
            fields.message = Some(first_line);
        }
        None => fields.message = Some(message),
    }
}

fn string_field(record: &serde_json::Map<String, Value>, name: &str) -> Option<String> {
    record.get(name).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::IdentityField;

    fn make_decoder() -> Decoder {
        Decoder::new(IdentitySpec::default_all(), "source".to_string())
    }

    #[test]
    fn test_decode_full_record() {
        let payload = br#"{
            "module": "app.views",
            "funcName": "checkout",
            "filename": "views.py",
            "pathname": "/srv/app/views.py",
            "lineno": 88,
            "message": "payment declined",
            "exc_text": "Traceback: ...",
            "kind": "web",
            "source": "host-a"
        }"#;
        let event = make_decoder().decode(payload).unwrap();
        assert_eq!(event.fields.module.as_deref(), Some("app.views"));
        assert_eq!(event.fields.func_name.as_deref(), Some("checkout"));
        assert_eq!(event.fields.lineno, Some(88));
        assert_eq!(event.source, "host-a");
    }

    #[test]
    fn test_decode_missing_source_falls_back_to_unknown() {
        let payload = br#"{"message": "boom"}"#;
        let event = make_decoder().decode(payload).unwrap();
        assert_eq!(event.source, "unknown");
        assert_eq!(event.fields.module, None);
    }

    #[test]
    fn test_decode_respects_configured_source_field() {
        let decoder = Decoder::new(IdentitySpec::default_all(), "host".to_string());
        let payload = br#"{"message": "boom", "host": "web-3", "source": "ignored"}"#;
        let event = decoder.decode(payload).unwrap();
        assert_eq!(event.source, "web-3");
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        let err = make_decoder().decode(b"not json at all").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_decode_rejects_non_object_payload() {
        let err = make_decoder().decode(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject));
    }

    #[test]
    fn test_decode_rejects_record_with_no_identity_fields() {
        let err = make_decoder()
            .decode(br#"{"source": "host-a", "extra": true}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::NoIdentity));
    }

    #[test]
    fn test_multiline_message_is_clipped_into_exc_text() {
        let payload = br#"{"message": "boom\nTraceback (most recent call last):\n  ..."}"#;
        let event = make_decoder().decode(payload).unwrap();
        assert_eq!(event.fields.message.as_deref(), Some("boom"));
        assert!(event
            .fields
            .exc_text
            .as_deref()
            .unwrap()
            .starts_with("boom\nTraceback"));
    }

    #[test]
    fn test_multiline_message_keeps_existing_exc_text() {
        let payload = br#"{"message": "boom\nmore", "exc_text": "original trace"}"#;
        let event = make_decoder().decode(payload).unwrap();
        assert_eq!(event.fields.message.as_deref(), Some("boom"));
        assert_eq!(event.fields.exc_text.as_deref(), Some("original trace"));
    }

    #[test]
    fn test_partial_key_for_narrow_identity_tuple() {
        let decoder = Decoder::new(
            IdentitySpec::new(vec![IdentityField::Kind]),
            "source".to_string(),
        );
        // kind is absent but message is not part of the identity tuple,
        // so the record is rejected outright.
        let err = decoder.decode(br#"{"message": "boom"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::NoIdentity));
    }
}
