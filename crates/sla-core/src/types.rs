use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// TrackerStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an SLA tracker.
///
/// Trackers are created `Running` by whoever owns ticket coverage. The poller
/// only ever performs `Running → Breached`; `Paused` and `Completed` belong to
/// external collaborators and are excluded from polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    Running,
    Breached,
    Paused,
    Completed,
}

impl TrackerStatus {
    pub fn all() -> &'static [TrackerStatus] {
        &[
            TrackerStatus::Running,
            TrackerStatus::Breached,
            TrackerStatus::Paused,
            TrackerStatus::Completed,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrackerStatus::Running => "running",
            TrackerStatus::Breached => "breached",
            TrackerStatus::Paused => "paused",
            TrackerStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TrackerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrackerStatus {
    type Err = crate::error::SlaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(TrackerStatus::Running),
            "breached" => Ok(TrackerStatus::Breached),
            "paused" => Ok(TrackerStatus::Paused),
            "completed" => Ok(TrackerStatus::Completed),
            _ => Err(crate::error::SlaError::InvalidStatus(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in TrackerStatus::all() {
            let parsed: TrackerStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, *status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = "overdue".parse::<TrackerStatus>().unwrap_err();
        assert!(err.to_string().contains("overdue"));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&TrackerStatus::Breached).unwrap();
        assert_eq!(json, "\"breached\"");
    }
}
