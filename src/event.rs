use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Event type
// ---------------------------------------------------------------------------

/// The `event` field of a journal line.
///
/// Only the event types that have a companion snapshot file are modelled
/// explicitly; everything else is carried through as `Other` so that new
/// event names never fail decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    Market,
    Outfitting,
    Shipyard,
    ModuleInfo,
    Other(String),
}

impl EventType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "Market" => EventType::Market,
            "Outfitting" => EventType::Outfitting,
            "Shipyard" => EventType::Shipyard,
            "ModuleInfo" => EventType::ModuleInfo,
            other => EventType::Other(other.to_string()),
        }
    }

    /// The event name exactly as it appears in the journal.
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Market => "Market",
            EventType::Outfitting => "Outfitting",
            EventType::Shipyard => "Shipyard",
            EventType::ModuleInfo => "ModuleInfo",
            EventType::Other(name) => name,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JournalEvent
// ---------------------------------------------------------------------------

/// One decoded journal event.
///
/// `payload` is the complete JSON object of the line, kept verbatim so that
/// persistence and equivalence checks see every field, not just the two the
/// decoder understands.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub payload: Value,
}

/// The two fields every journal object must carry.
#[derive(Debug, Deserialize)]
struct EventHeader {
    timestamp: DateTime<Utc>,
    event: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a json object")]
    NotAnObject,
    #[error("missing or invalid event header: {0}")]
    Header(serde_json::Error),
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode an already-parsed JSON value into a `JournalEvent`.
pub fn decode_event(payload: Value) -> Result<JournalEvent, DecodeError> {
    if !payload.is_object() {
        return Err(DecodeError::NotAnObject);
    }
    let header = EventHeader::deserialize(&payload).map_err(DecodeError::Header)?;
    Ok(JournalEvent {
        timestamp: header.timestamp,
        event_type: EventType::from_name(&header.event),
        payload,
    })
}

/// Parse a single journal line.
///
/// Returns `Err` for malformed JSON or a missing header. The caller decides
/// whether to skip or warn.
pub fn parse_event_line(line: &str) -> Result<JournalEvent, DecodeError> {
    let value: Value = serde_json::from_str(line)?;
    decode_event(value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_market_line() {
        let line = r#"{"timestamp":"2017-10-06T12:00:01Z","event":"Market","MarketID":128666762,"StationName":"Jameson Memorial"}"#;
        let ev = parse_event_line(line).unwrap();
        assert_eq!(ev.event_type, EventType::Market);
        assert_eq!(
            ev.timestamp,
            Utc.with_ymd_and_hms(2017, 10, 6, 12, 0, 1).unwrap()
        );
        assert_eq!(ev.payload["StationName"], "Jameson Memorial");
    }

    #[test]
    fn test_unknown_event_name_is_other() {
        let ev = parse_event_line(r#"{"timestamp":"2017-10-06T12:00:01Z","event":"FSDJump"}"#)
            .unwrap();
        assert_eq!(ev.event_type, EventType::Other("FSDJump".to_string()));
        assert_eq!(ev.event_type.as_str(), "FSDJump");
    }

    #[test]
    fn test_module_info_name_round_trips() {
        assert_eq!(EventType::from_name("ModuleInfo"), EventType::ModuleInfo);
        assert_eq!(EventType::ModuleInfo.to_string(), "ModuleInfo");
    }

    #[test]
    fn test_missing_timestamp_is_header_error() {
        let err = parse_event_line(r#"{"event":"Market"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Header(_)));
    }

    #[test]
    fn test_missing_event_is_header_error() {
        let err = parse_event_line(r#"{"timestamp":"2017-10-06T12:00:01Z"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Header(_)));
    }

    #[test]
    fn test_malformed_json() {
        let err = parse_event_line("{broken").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn test_non_object_rejected() {
        let err = parse_event_line("[1,2,3]").unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject));
    }

    #[test]
    fn test_offset_timestamp_normalised_to_utc() {
        let ev = parse_event_line(r#"{"timestamp":"2017-10-06T14:00:01+02:00","event":"Music"}"#)
            .unwrap();
        assert_eq!(
            ev.timestamp,
            Utc.with_ymd_and_hms(2017, 10, 6, 12, 0, 1).unwrap()
        );
    }
}
