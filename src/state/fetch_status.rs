/// Fetch status definitions for work items
///
/// A work item moves forward through these states exactly once; it never
/// returns to an earlier state and discarded items are never retried.
use std::fmt;

/// Where a work item is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FetchStatus {
    /// Created but not yet scheduled
    #[default]
    Unknown,

    /// Waiting in a per-IP fetch queue
    Queuing,

    /// Handed to the fetcher
    Fetching,

    // ===== Terminal States =====
    /// Fetch attempt completed (successfully or not)
    Fetched,

    /// Dropped before fetching; never retried
    Discarded,
}

impl FetchStatus {
    /// Returns true if no further processing will happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fetched | Self::Discarded)
    }

    /// Returns true if the item is still moving through the pipeline
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if the item may legally move to `next`
    pub fn can_transition_to(&self, next: FetchStatus) -> bool {
        use FetchStatus::*;
        matches!(
            (self, next),
            (Unknown, Queuing)
                | (Unknown, Discarded)
                | (Queuing, Fetching)
                | (Queuing, Discarded)
                | (Fetching, Fetched)
                | (Fetching, Discarded)
        )
    }

    /// Stable string form used in logs and the SQLite store
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Queuing => "queuing",
            Self::Fetching => "fetching",
            Self::Fetched => "fetched",
            Self::Discarded => "discarded",
        }
    }

    /// Parses the string form produced by [`as_str`](Self::as_str)
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(Self::Unknown),
            "queuing" => Some(Self::Queuing),
            "fetching" => Some(Self::Fetching),
            "fetched" => Some(Self::Fetched),
            "discarded" => Some(Self::Discarded),
            _ => None,
        }
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!FetchStatus::Unknown.is_terminal());
        assert!(!FetchStatus::Queuing.is_terminal());
        assert!(!FetchStatus::Fetching.is_terminal());
        assert!(FetchStatus::Fetched.is_terminal());
        assert!(FetchStatus::Discarded.is_terminal());
    }

    #[test]
    fn test_forward_transitions_only() {
        assert!(FetchStatus::Unknown.can_transition_to(FetchStatus::Queuing));
        assert!(FetchStatus::Queuing.can_transition_to(FetchStatus::Fetching));
        assert!(FetchStatus::Fetching.can_transition_to(FetchStatus::Fetched));
        assert!(FetchStatus::Queuing.can_transition_to(FetchStatus::Discarded));

        assert!(!FetchStatus::Fetched.can_transition_to(FetchStatus::Queuing));
        assert!(!FetchStatus::Discarded.can_transition_to(FetchStatus::Queuing));
        assert!(!FetchStatus::Unknown.can_transition_to(FetchStatus::Fetched));
    }

    #[test]
    fn test_string_roundtrip() {
        for status in [
            FetchStatus::Unknown,
            FetchStatus::Queuing,
            FetchStatus::Fetching,
            FetchStatus::Fetched,
            FetchStatus::Discarded,
        ] {
            assert_eq!(FetchStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FetchStatus::parse("bogus"), None);
    }
}
