//! Common types used across fleetdash components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::drift::{DriftReason, DriftStatus};

/// Kind of git observation stored in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Emitted by a server-side git sensor.
    GitStatus,
    /// Emitted by the user machine agent.
    PcGitStatus,
}

impl EventType {
    pub const ALL: [EventType; 2] = [EventType::GitStatus, EventType::PcGitStatus];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitStatus => "git_status",
            Self::PcGitStatus => "pc_git_status",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git_status" => Ok(Self::GitStatus),
            "pc_git_status" => Ok(Self::PcGitStatus),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// One repository as seen by one reporter in one observation cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSnapshot {
    /// Display name. Not unique across nodes.
    pub repo: String,
    /// Empty on a detached HEAD.
    #[serde(default, deserialize_with = "null_as_default")]
    pub branch: String,
    #[serde(alias = "head_sha")]
    pub head: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dirty: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ahead: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub behind: u32,
    /// Checkout path on the reporting machine, when the reporter sends it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl RepoSnapshot {
    pub fn state(&self) -> RepoState {
        RepoState {
            branch: self.branch.clone(),
            head: self.head.clone(),
            dirty: self.dirty,
            ahead: self.ahead,
            behind: self.behind,
        }
    }
}

/// Reads an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// The comparable part of a snapshot. Field order is part of the state hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoState {
    pub branch: String,
    pub head: String,
    pub dirty: bool,
    pub ahead: u32,
    pub behind: u32,
}

/// `metadata` column of a git event row. Entries stay raw until
/// [`RepoEvent::snapshots`] decodes them one by one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoEventMetadata {
    #[serde(default)]
    pub repos: Vec<serde_json::Value>,
}

/// A row of the append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoEvent {
    /// Monotonic row id, used to break timestamp ties.
    pub seq: i64,
    pub service_id: String,
    pub event_type: EventType,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl RepoEvent {
    /// Decode the repository list carried by this event.
    ///
    /// Fails only when `metadata.repos` is not a list. Each entry decodes on
    /// its own, so one bad entry does not take its siblings down with it.
    pub fn snapshots(
        &self,
    ) -> Result<Vec<Result<RepoSnapshot, serde_json::Error>>, serde_json::Error> {
        let metadata = RepoEventMetadata::deserialize(&self.metadata)?;
        Ok(metadata
            .repos
            .into_iter()
            .map(serde_json::from_value)
            .collect())
    }

    /// Ordering key for "latest row wins": timestamp, then sequence.
    pub fn recency(&self) -> (DateTime<Utc>, i64) {
        (self.timestamp, self.seq)
    }
}

/// Which side of the reconciliation a reporter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReporterClass {
    Server,
    Pc,
}

/// Service id of the user machine agent.
pub const PC_SERVICE_ID: &str = "user-pc";

impl ReporterClass {
    pub fn of(service_id: &str) -> Self {
        if service_id == PC_SERVICE_ID {
            Self::Pc
        } else {
            Self::Server
        }
    }
}

/// Server observation of a repository merged with the pc observation.
///
/// Derived on every request, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedRepoView {
    pub repo: String,
    /// Canonical join key (registry slug, or the display name when unregistered).
    pub repo_id: String,
    pub node_id: String,
    pub branch: String,
    pub server_sha: String,
    pub server_dirty: bool,
    pub ahead: u32,
    pub behind: u32,
    pub pc_sha: Option<String>,
    pub pc_dirty: Option<bool>,
    pub pc_branch: Option<String>,
    pub pc_ahead: Option<u32>,
    pub pc_behind: Option<u32>,
    pub drift_status: DriftStatus,
    pub drift_reasons: Vec<DriftReason>,
    pub last_seen: DateTime<Utc>,
    pub pc_last_seen: Option<DateTime<Utc>>,
}

/// Polling fingerprint for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoFingerprint {
    pub repo: String,
    pub state_hash: String,
    pub last_updated: Option<DateTime<Utc>>,
    pub has_server: bool,
    pub has_pc: bool,
    pub server_last_seen: Option<DateTime<Utc>>,
    pub pc_last_seen: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_round_trips_through_str() {
        for kind in EventType::ALL {
            assert_eq!(kind.as_str().parse::<EventType>().unwrap(), kind);
        }
        assert!("deploy".parse::<EventType>().is_err());
    }

    #[test]
    fn test_snapshot_accepts_head_sha_alias_and_defaults() {
        let snap: RepoSnapshot = serde_json::from_value(json!({
            "repo": "api",
            "branch": "main",
            "head_sha": "abc1234"
        }))
        .unwrap();
        assert_eq!(snap.head, "abc1234");
        assert!(!snap.dirty);
        assert_eq!((snap.ahead, snap.behind), (0, 0));
        assert!(snap.path.is_none());
    }

    #[test]
    fn test_event_snapshots_decodes_metadata() {
        let event = RepoEvent {
            seq: 1,
            service_id: "node-a".into(),
            event_type: EventType::GitStatus,
            metadata: json!({"repos": [{"repo": "api", "branch": "main", "head": "abc", "dirty": true, "ahead": 2, "behind": 0}]}),
            timestamp: Utc::now(),
        };
        let snaps: Vec<RepoSnapshot> = event
            .snapshots()
            .unwrap()
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(snaps.len(), 1);
        assert!(snaps[0].dirty);
        assert_eq!(snaps[0].ahead, 2);
    }

    #[test]
    fn test_event_snapshots_rejects_malformed_metadata() {
        let event = RepoEvent {
            seq: 1,
            service_id: "node-a".into(),
            event_type: EventType::GitStatus,
            metadata: json!({"repos": "not-a-list"}),
            timestamp: Utc::now(),
        };
        assert!(event.snapshots().is_err());
    }

    #[test]
    fn test_null_fields_read_as_defaults() {
        let snap: RepoSnapshot = serde_json::from_value(json!({
            "repo": "web",
            "branch": null,
            "head": "abc1234",
            "dirty": null,
            "ahead": null,
            "behind": null
        }))
        .unwrap();
        assert_eq!(snap.branch, "");
        assert!(!snap.dirty);
        assert_eq!((snap.ahead, snap.behind), (0, 0));
    }

    #[test]
    fn test_event_snapshots_isolates_bad_entries() {
        let event = RepoEvent {
            seq: 1,
            service_id: "node-a".into(),
            event_type: EventType::GitStatus,
            metadata: json!({"repos": [
                {"repo": "api", "branch": "main", "head": "abc"},
                {"repo": "web", "branch": "main"},
                {"repo": "docs", "branch": "main", "head": "def", "ahead": -1}
            ]}),
            timestamp: Utc::now(),
        };
        let entries = event.snapshots().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].as_ref().unwrap().repo, "api");
        assert!(entries[1].is_err());
        assert!(entries[2].is_err());
    }

    #[test]
    fn test_reporter_class() {
        assert_eq!(ReporterClass::of("user-pc"), ReporterClass::Pc);
        assert_eq!(ReporterClass::of("droplet-1"), ReporterClass::Server);
    }
}
