//! Folds the reporters' git events into one reconciled view per repository.
//!
//! Only the latest event per `service_id` inside the observation window
//! counts (ordered by timestamp, then sequence). Server snapshots anchor the
//! merged view; the pc snapshot for the same canonical repository is joined
//! onto every server node that reports it.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::drift;
use crate::state_hash::state_hash;
use crate::types::{MergedRepoView, RepoEvent, RepoFingerprint, RepoSnapshot, ReporterClass};

/// Events older than this are ignored.
pub const OBSERVATION_WINDOW_DAYS: i64 = 7;

pub fn observation_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - TimeDelta::days(OBSERVATION_WINDOW_DAYS)
}

// ── Canonical keys ─────────────────────────────────────────────────────────

/// Maps repository display names and aliases to a canonical id.
///
/// Names that are not registered are their own key.
#[derive(Debug, Clone, Default)]
pub struct RepoKeyMap {
    names: HashMap<String, String>,
}

impl RepoKeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, canonical: impl Into<String>) {
        self.names.insert(name.into(), canonical.into());
    }

    pub fn canonical(&self, name: &str) -> String {
        self.names
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ── Ledger ─────────────────────────────────────────────────────────────────

/// A snapshot together with the event it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub service_id: String,
    pub snapshot: RepoSnapshot,
    pub seen_at: DateTime<Utc>,
}

/// Everything known about one canonical repository.
#[derive(Debug, Clone, Default)]
pub struct LedgerEntry {
    /// Server observations keyed by node (service id).
    pub servers: BTreeMap<String, Observation>,
    pub pc: Option<Observation>,
}

impl LedgerEntry {
    /// Most recently seen server node; ties go to the lowest node id.
    pub fn latest_server(&self) -> Option<&Observation> {
        self.servers
            .values()
            .reduce(|best, obs| if obs.seen_at > best.seen_at { obs } else { best })
    }
}

/// Reconciled state for every repository seen in the window.
#[derive(Debug, Clone, Default)]
pub struct RepoLedger {
    entries: BTreeMap<String, LedgerEntry>,
}

impl RepoLedger {
    /// Fold raw events into the ledger.
    ///
    /// Events outside `[now - window, ∞)` are dropped, then only the most
    /// recent event per service survives. A malformed repo entry is logged
    /// and skipped; its siblings in the same event still count.
    pub fn fold(events: &[RepoEvent], keys: &RepoKeyMap, now: DateTime<Utc>) -> Self {
        let window_start = observation_window_start(now);
        let mut latest: BTreeMap<&str, &RepoEvent> = BTreeMap::new();
        for event in events.iter().filter(|e| e.timestamp >= window_start) {
            latest
                .entry(event.service_id.as_str())
                .and_modify(|current| {
                    if event.recency() > current.recency() {
                        *current = event;
                    }
                })
                .or_insert(event);
        }

        let mut entries: BTreeMap<String, LedgerEntry> = BTreeMap::new();
        for (service_id, event) in latest {
            let decoded_entries = match event.snapshots() {
                Ok(decoded_entries) => decoded_entries,
                Err(e) => {
                    warn!(
                        service_id,
                        seq = event.seq,
                        "Skipping git event with malformed metadata: {}",
                        e
                    );
                    continue;
                }
            };

            let class = ReporterClass::of(service_id);
            for (index, decoded) in decoded_entries.into_iter().enumerate() {
                let snapshot = match decoded {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        warn!(
                            service_id,
                            seq = event.seq,
                            index,
                            "Skipping malformed repo entry: {}",
                            e
                        );
                        continue;
                    }
                };
                let key = keys.canonical(&snapshot.repo);
                let entry = entries.entry(key).or_default();
                let observation = Observation {
                    service_id: service_id.to_string(),
                    snapshot,
                    seen_at: event.timestamp,
                };
                let duplicate = match class {
                    ReporterClass::Pc => entry.pc.is_some(),
                    ReporterClass::Server => entry.servers.contains_key(service_id),
                };
                if duplicate {
                    debug!(
                        service_id,
                        repo = %observation.snapshot.repo,
                        "Duplicate repo in one event, keeping first"
                    );
                    continue;
                }
                match class {
                    ReporterClass::Pc => entry.pc = Some(observation),
                    ReporterClass::Server => {
                        entry.servers.insert(service_id.to_string(), observation);
                    }
                }
            }
        }

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&LedgerEntry> {
        self.entries.get(key)
    }

    /// All observations with their canonical key, server nodes first.
    pub fn observations(&self) -> impl Iterator<Item = (&str, &Observation)> {
        self.entries.iter().flat_map(|(key, entry)| {
            entry
                .servers
                .values()
                .chain(entry.pc.iter())
                .map(move |obs| (key.as_str(), obs))
        })
    }

    /// One view per (repository, server node), sorted by key then node.
    ///
    /// Repositories that only the pc reports are not listed.
    pub fn merged_views(&self) -> Vec<MergedRepoView> {
        let mut views = Vec::new();
        for (key, entry) in &self.entries {
            let pc_state = entry.pc.as_ref().map(|obs| obs.snapshot.state());
            for (node_id, server) in &entry.servers {
                let server_state = server.snapshot.state();
                let assessment = drift::classify(Some(&server_state), pc_state.as_ref());
                let pc = entry.pc.as_ref();
                views.push(MergedRepoView {
                    repo: server.snapshot.repo.clone(),
                    repo_id: key.clone(),
                    node_id: node_id.clone(),
                    branch: server_state.branch,
                    server_sha: server_state.head,
                    server_dirty: server_state.dirty,
                    ahead: server_state.ahead,
                    behind: server_state.behind,
                    pc_sha: pc.map(|o| o.snapshot.head.clone()),
                    pc_dirty: pc.map(|o| o.snapshot.dirty),
                    pc_branch: pc.map(|o| o.snapshot.branch.clone()),
                    pc_ahead: pc.map(|o| o.snapshot.ahead),
                    pc_behind: pc.map(|o| o.snapshot.behind),
                    drift_status: assessment.status,
                    drift_reasons: assessment.reasons,
                    last_seen: server.seen_at,
                    pc_last_seen: pc.map(|o| o.seen_at),
                });
            }
        }
        views
    }

    /// Polling fingerprint for a repository name or alias.
    pub fn fingerprint(&self, name: &str, keys: &RepoKeyMap) -> RepoFingerprint {
        let entry = self.entries.get(&keys.canonical(name));
        let server = entry.and_then(LedgerEntry::latest_server);
        let pc = entry.and_then(|e| e.pc.as_ref());

        let server_state = server.map(|o| o.snapshot.state());
        let pc_state = pc.map(|o| o.snapshot.state());
        let server_last_seen = server.map(|o| o.seen_at);
        let pc_last_seen = pc.map(|o| o.seen_at);

        RepoFingerprint {
            repo: name.to_string(),
            state_hash: state_hash(server_state.as_ref(), pc_state.as_ref()),
            last_updated: server_last_seen.max(pc_last_seen),
            has_server: server.is_some(),
            has_pc: pc.is_some(),
            server_last_seen,
            pc_last_seen,
        }
    }
}
