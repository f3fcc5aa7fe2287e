//! Collapsing conflicts to a single value.

use crate::config::ResolutionStrategy;
use crate::diff::{Conflict, Side};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The decision a strategy makes for one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Keep the local value; the remote side is stale.
    UseLocal,
    /// Accept the remote value; the local side is stale.
    UseRemote,
    /// No automatic decision; queue for manual input.
    Defer,
}

impl ResolutionStrategy {
    /// Resolves a conflict according to this strategy.
    ///
    /// `LatestWins` compares the snapshot timestamps and the later side
    /// wins. Ties favor local to keep the behavior deterministic, as does a
    /// complete absence of timestamps; a side missing its timestamp loses to
    /// one that has it.
    pub fn resolve(&self, conflict: &Conflict) -> Resolution {
        match self {
            ResolutionStrategy::LocalWins => Resolution::UseLocal,
            ResolutionStrategy::ServerWins => Resolution::UseRemote,
            ResolutionStrategy::LatestWins => {
                match (conflict.local_timestamp, conflict.remote_timestamp) {
                    (Some(local), Some(remote)) if remote > local => Resolution::UseRemote,
                    (Some(_), Some(_)) => Resolution::UseLocal,
                    (None, Some(_)) => Resolution::UseRemote,
                    (Some(_), None) | (None, None) => Resolution::UseLocal,
                }
            }
            ResolutionStrategy::Manual => Resolution::Defer,
        }
    }
}

impl Resolution {
    /// The value this decision selects, if it makes one.
    pub fn value<'a>(&self, conflict: &'a Conflict) -> Option<&'a Value> {
        match self {
            Resolution::UseLocal => Some(&conflict.local_value),
            Resolution::UseRemote => Some(&conflict.remote_value),
            Resolution::Defer => None,
        }
    }
}

/// A manual resolution request from the conflict-resolution surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionRequest {
    /// Record the resolutions apply to.
    pub record_id: String,
    /// One entry per conflicted field.
    pub resolutions: Vec<FieldResolution>,
}

/// A single field's manual resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldResolution {
    /// Dot-path of the conflicted field.
    pub field: String,
    /// Which side the user chose.
    pub chosen_side: Side,
    /// The value to converge both stores on.
    pub value: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::Severity;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn conflict(local_ts: Option<i64>, remote_ts: Option<i64>) -> Conflict {
        let ts = |secs: i64| Utc.timestamp_opt(secs, 0).unwrap();
        Conflict {
            record_id: "p1".into(),
            field: "name".into(),
            local_value: json!("Model A"),
            remote_value: json!("Model B"),
            local_timestamp: local_ts.map(ts),
            remote_timestamp: remote_ts.map(ts),
            severity: Severity::Low,
            auto_resolvable: false,
        }
    }

    #[test]
    fn unconditional_strategies() {
        let c = conflict(Some(100), Some(200));
        assert_eq!(ResolutionStrategy::LocalWins.resolve(&c), Resolution::UseLocal);
        assert_eq!(ResolutionStrategy::ServerWins.resolve(&c), Resolution::UseRemote);
        assert_eq!(ResolutionStrategy::Manual.resolve(&c), Resolution::Defer);
    }

    #[test]
    fn latest_wins_picks_the_later_side() {
        let newer_remote = conflict(Some(100), Some(200));
        assert_eq!(
            ResolutionStrategy::LatestWins.resolve(&newer_remote),
            Resolution::UseRemote
        );
        assert_eq!(
            Resolution::UseRemote.value(&newer_remote),
            Some(&json!("Model B"))
        );

        let newer_local = conflict(Some(300), Some(200));
        assert_eq!(
            ResolutionStrategy::LatestWins.resolve(&newer_local),
            Resolution::UseLocal
        );
    }

    #[test]
    fn latest_wins_ties_favor_local() {
        let tied = conflict(Some(100), Some(100));
        assert_eq!(ResolutionStrategy::LatestWins.resolve(&tied), Resolution::UseLocal);

        let no_timestamps = conflict(None, None);
        assert_eq!(
            ResolutionStrategy::LatestWins.resolve(&no_timestamps),
            Resolution::UseLocal
        );
    }

    #[test]
    fn latest_wins_missing_timestamp_loses() {
        assert_eq!(
            ResolutionStrategy::LatestWins.resolve(&conflict(None, Some(100))),
            Resolution::UseRemote
        );
        assert_eq!(
            ResolutionStrategy::LatestWins.resolve(&conflict(Some(100), None)),
            Resolution::UseLocal
        );
    }

    #[test]
    fn resolution_request_wire_shape() {
        let request = ResolutionRequest {
            record_id: "p1".into(),
            resolutions: vec![FieldResolution {
                field: "name".into(),
                chosen_side: Side::Remote,
                value: json!("Model B"),
            }],
        };

        let text = serde_json::to_string(&request).unwrap();
        assert!(text.contains("\"recordId\":\"p1\""));
        assert!(text.contains("\"chosenSide\":\"remote\""));

        let back: ResolutionRequest = serde_json::from_str(&text).unwrap();
        assert_eq!(back, request);
    }
}
