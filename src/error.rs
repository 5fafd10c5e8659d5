use std::path::PathBuf;

use crate::queue::WatchError;
use crate::store::StoreError;

/// Errors surfaced to the caller of `poll_tick`, `start_watching` and
/// `run_backfill`.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Watch(#[from] WatchError),
    #[error("could not list journals in {}: {source}", path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_transparent_for_store() {
        let err = MonitorError::from(StoreError::NoTransaction);
        assert_eq!(err.to_string(), "no transaction in progress");
    }

    #[test]
    fn test_discovery_display() {
        let err = MonitorError::Discovery {
            path: PathBuf::from("/journals"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/journals"));
        assert!(msg.contains("gone"));
    }
}
