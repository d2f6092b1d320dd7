//! Version gate
//!
//! The gate detects *difference*, not recency: any change of the remote marker,
//! including a move back to an older date, lets ingestion proceed. Markers may
//! be content hashes or other values with no ordering.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Remote marker differs from the stored one, or nothing is stored yet.
    Ingest,
    UpToDate,
    /// No remote marker could be resolved. Never ingest.
    NoRemote,
}

impl GateDecision {
    pub fn decide(remote: Option<&str>, stored: Option<&str>) -> Self {
        match (remote, stored) {
            (None, _) => GateDecision::NoRemote,
            (Some(_), None) => GateDecision::Ingest,
            (Some(remote), Some(stored)) if remote.trim() != stored.trim() => GateDecision::Ingest,
            (Some(_), Some(_)) => GateDecision::UpToDate,
        }
    }

    pub fn proceeds(self) -> bool {
        matches!(self, GateDecision::Ingest)
    }
}

pub fn should_ingest(remote: Option<&str>, stored: Option<&str>) -> bool {
    GateDecision::decide(remote, stored).proceeds()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_remote_fails_closed() {
        assert!(!should_ingest(None, None));
        assert!(!should_ingest(None, Some("2024-01-01")));
        assert_eq!(GateDecision::decide(None, None), GateDecision::NoRemote);
    }

    #[test]
    fn test_never_ingested_source_always_proceeds() {
        assert!(should_ingest(Some("2024-01-01"), None));
    }

    #[test]
    fn test_same_marker_is_up_to_date_every_time() {
        for _ in 0..2 {
            assert_eq!(
                GateDecision::decide(Some("2024-01-01"), Some("2024-01-01")),
                GateDecision::UpToDate
            );
        }
    }

    #[test]
    fn test_whitespace_is_ignored() {
        assert!(!should_ingest(Some(" v24.0\n"), Some("v24.0")));
    }

    #[test]
    fn test_older_marker_still_counts_as_new() {
        assert!(should_ingest(Some("2023-12-31"), Some("2024-01-01")));
    }

    #[test]
    fn test_opaque_markers_compare_by_difference() {
        assert!(should_ingest(Some("9f86d081"), Some("2c26b46b")));
    }
}
