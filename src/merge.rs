//! Companion snapshot enrichment.
//!
//! Some events are written to the journal in a minimal form while the full
//! record goes to a fixed-name snapshot file next to the journal (for
//! example `Market.json`). When such an event is ingested, the snapshot is
//! read and, if it describes the very same event (identical timestamp and
//! event name), it replaces the minimal entry.
//!
//! The game may still be writing the snapshot when we look at it, so reads
//! that fail to load or parse are retried according to a `RetryPolicy`. A
//! snapshot that parses but describes another event is re-read straight
//! away without waiting. Exhausted attempts fall back to the journal entry;
//! neither case is an error.

use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::event::{decode_event, EventType, JournalEvent};

/// How often and how patiently to re-read a companion file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(500),
        }
    }
}

/// The companion file holding the full version of `event_type`, if any.
pub fn companion_file_name(event_type: &EventType) -> Option<&'static str> {
    match event_type {
        EventType::Market => Some("Market.json"),
        EventType::Outfitting => Some("Outfitting.json"),
        EventType::Shipyard => Some("Shipyard.json"),
        EventType::ModuleInfo => Some("ModulesInfo.json"),
        EventType::Other(_) => None,
    }
}

enum Attempt {
    Enriched(JournalEvent),
    /// Unreadable or half-written; wait before the next attempt.
    Retry(String),
    /// A complete snapshot of some other event.
    Mismatch(String),
}

#[derive(Debug, Clone, Default)]
pub struct ExtraInfoMerger {
    policy: RetryPolicy,
}

impl ExtraInfoMerger {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Return the companion file's version of `event`, or `None` if the
    /// event type has no companion or no matching snapshot could be read.
    pub fn try_enrich(&self, event: &JournalEvent, journal_dir: &Path) -> Option<JournalEvent> {
        let name = companion_file_name(&event.event_type)?;
        let path = journal_dir.join(name);

        if !path.is_file() {
            debug!(companion = %path.display(), "companion file absent");
            return None;
        }

        let attempts = self.policy.attempts.max(1);
        for attempt in 1..=attempts {
            match read_companion(&path, event) {
                Attempt::Enriched(full) => {
                    debug!(companion = name, event = %event.event_type, "merged companion record");
                    return Some(full);
                }
                Attempt::Retry(reason) => {
                    debug!(companion = name, attempt, %reason, "companion not usable yet");
                    if attempt < attempts {
                        std::thread::sleep(self.policy.delay);
                    }
                }
                Attempt::Mismatch(reason) => {
                    debug!(companion = name, attempt, %reason, "companion describes another event");
                }
            }
        }

        warn!(
            companion = name,
            event = %event.event_type,
            timestamp = %event.timestamp,
            "companion file did not match journal entry, keeping minimal entry"
        );
        None
    }
}

fn read_companion(path: &Path, event: &JournalEvent) -> Attempt {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => return Attempt::Retry(format!("read failed: {}", e)),
    };
    let value: Value = match serde_json::from_str(text.trim_start_matches('\u{feff}')) {
        Ok(v) => v,
        Err(e) => return Attempt::Retry(format!("parse failed: {}", e)),
    };
    let full = match decode_event(value) {
        Ok(ev) => ev,
        Err(e) => return Attempt::Retry(format!("decode failed: {}", e)),
    };

    if full.timestamp == event.timestamp && full.event_type.as_str() == event.event_type.as_str() {
        Attempt::Enriched(full)
    } else {
        Attempt::Mismatch(format!(
            "snapshot is {} at {}",
            full.event_type, full.timestamp
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::parse_event_line;
    use rstest::rstest;
    use tempfile::TempDir;

    fn quick() -> ExtraInfoMerger {
        ExtraInfoMerger::new(RetryPolicy {
            attempts: 5,
            delay: Duration::ZERO,
        })
    }

    const MARKET_LINE: &str =
        r#"{"timestamp":"2017-10-06T12:00:00Z","event":"Market","MarketID":128666762}"#;

    #[rstest]
    #[case("Market", Some("Market.json"))]
    #[case("Outfitting", Some("Outfitting.json"))]
    #[case("Shipyard", Some("Shipyard.json"))]
    #[case("ModuleInfo", Some("ModulesInfo.json"))]
    #[case("FSDJump", None)]
    fn test_companion_file_name(#[case] event: &str, #[case] expected: Option<&str>) {
        assert_eq!(companion_file_name(&EventType::from_name(event)), expected);
    }

    #[test]
    fn test_unmapped_type_returns_none() {
        let tmp = TempDir::new().unwrap();
        let ev = parse_event_line(r#"{"timestamp":"2017-10-06T12:00:00Z","event":"FSDJump"}"#)
            .unwrap();
        assert!(quick().try_enrich(&ev, tmp.path()).is_none());
    }

    #[test]
    fn test_matching_companion_replaces_entry() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("Market.json"),
            r#"{ "timestamp":"2017-10-06T12:00:00Z", "event":"Market", "MarketID":128666762, "Items":[{"Name":"gold","BuyPrice":9000}] }"#,
        )
        .unwrap();

        let ev = parse_event_line(MARKET_LINE).unwrap();
        let full = quick().try_enrich(&ev, tmp.path()).unwrap();
        assert_eq!(full.timestamp, ev.timestamp);
        assert_eq!(full.payload["Items"][0]["Name"], "gold");
    }

    #[test]
    fn test_timestamp_mismatch_keeps_minimal() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("Market.json"),
            r#"{"timestamp":"2017-10-06T11:59:00Z","event":"Market","Items":[]}"#,
        )
        .unwrap();

        let ev = parse_event_line(MARKET_LINE).unwrap();
        assert!(quick().try_enrich(&ev, tmp.path()).is_none());
    }

    #[test]
    fn test_stale_companion_does_not_wait_between_attempts() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("Market.json"),
            r#"{"timestamp":"2017-10-01T08:00:00Z","event":"Market","Items":[]}"#,
        )
        .unwrap();

        let merger = ExtraInfoMerger::new(RetryPolicy {
            attempts: 5,
            delay: Duration::from_millis(300),
        });
        let ev = parse_event_line(MARKET_LINE).unwrap();
        let started = std::time::Instant::now();
        assert!(merger.try_enrich(&ev, tmp.path()).is_none());
        assert!(started.elapsed() < Duration::from_millis(300));
    }

    #[test]
    fn test_unparseable_companion_waits_between_attempts() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("Market.json"), "{\"timestamp\":").unwrap();

        let merger = ExtraInfoMerger::new(RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(20),
        });
        let ev = parse_event_line(MARKET_LINE).unwrap();
        let started = std::time::Instant::now();
        assert!(merger.try_enrich(&ev, tmp.path()).is_none());
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_type_mismatch_keeps_minimal() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("Market.json"),
            r#"{"timestamp":"2017-10-06T12:00:00Z","event":"Shipyard"}"#,
        )
        .unwrap();

        let ev = parse_event_line(MARKET_LINE).unwrap();
        assert!(quick().try_enrich(&ev, tmp.path()).is_none());
    }

    #[test]
    fn test_half_written_companion_keeps_minimal() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("Market.json"),
            r#"{"timestamp":"2017-10-06T12:00:00Z","event":"Mar"#,
        )
        .unwrap();

        let ev = parse_event_line(MARKET_LINE).unwrap();
        assert!(quick().try_enrich(&ev, tmp.path()).is_none());
    }

    #[test]
    fn test_missing_companion_returns_none() {
        let tmp = TempDir::new().unwrap();
        let ev = parse_event_line(MARKET_LINE).unwrap();
        assert!(quick().try_enrich(&ev, tmp.path()).is_none());
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 5);
        assert_eq!(policy.delay, Duration::from_millis(500));
    }
}
