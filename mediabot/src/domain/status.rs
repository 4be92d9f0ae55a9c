//! Acquisition status state machine.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Where a media record is in its acquisition lifecycle.
///
/// Films move `InProgress -> FindTorrent -> Ended`. Serials loop back into
/// `FindTorrent` once per newly released episode until the known episode
/// count is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AcquisitionStatus {
    /// The record was accepted and is waiting for its first search.
    #[default]
    InProgress,
    /// A torrent is (again) being looked for.
    FindTorrent,
    /// Nothing left to acquire.
    Ended,
}

impl AcquisitionStatus {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::FindTorrent => "FIND_TORRENT",
            Self::Ended => "ENDED",
        }
    }

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IN_PROGRESS" => Some(Self::InProgress),
            "FIND_TORRENT" => Some(Self::FindTorrent),
            "ENDED" => Some(Self::Ended),
            _ => None,
        }
    }

    /// Records below the ended state take part in broad checks.
    pub fn is_pending(&self) -> bool {
        !matches!(self, Self::Ended)
    }

    /// Validate a state transition.
    pub fn can_transition_to(&self, target: AcquisitionStatus) -> bool {
        use AcquisitionStatus::*;

        match (self, target) {
            (from, to) if from == &to => true,
            (InProgress, FindTorrent | Ended) => true,
            (FindTorrent, Ended) => true,
            // A finished serial is reopened when a new season part shows up.
            (Ended, FindTorrent) => true,
            _ => false,
        }
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&self, target: AcquisitionStatus) -> Result<AcquisitionStatus, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::validation(format!(
                "cannot transition from {} to {}",
                self, target
            )))
        }
    }
}

impl std::fmt::Display for AcquisitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_strings() {
        for status in [
            AcquisitionStatus::InProgress,
            AcquisitionStatus::FindTorrent,
            AcquisitionStatus::Ended,
        ] {
            assert_eq!(AcquisitionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AcquisitionStatus::parse("LOCKED"), None);
    }

    #[test]
    fn test_pending_excludes_ended() {
        assert!(AcquisitionStatus::InProgress.is_pending());
        assert!(AcquisitionStatus::FindTorrent.is_pending());
        assert!(!AcquisitionStatus::Ended.is_pending());
    }

    #[test]
    fn test_transitions() {
        let status = AcquisitionStatus::InProgress;
        assert!(status.transition_to(AcquisitionStatus::FindTorrent).is_ok());
        assert!(
            AcquisitionStatus::FindTorrent
                .transition_to(AcquisitionStatus::InProgress)
                .is_err()
        );
        assert!(AcquisitionStatus::Ended.can_transition_to(AcquisitionStatus::FindTorrent));
    }
}
