//! Loads reporter events and the registry, then folds them into a ledger.

use chrono::{DateTime, Utc};
use fleetdash_common::{RepoKeyMap, RepoLedger, observation_window_start};
use tracing::debug;

use crate::resolver;
use crate::store::{DashboardStore, StoreResult};

/// Reconciled repository state as of one request.
pub struct ReconciledState {
    pub ledger: RepoLedger,
    pub keys: RepoKeyMap,
}

impl ReconciledState {
    /// Read both inputs concurrently. Any store failure fails the whole load.
    pub async fn load(store: &dyn DashboardStore, now: DateTime<Utc>) -> StoreResult<Self> {
        let since = observation_window_start(now);
        let (events, registry) =
            tokio::try_join!(store.recent_git_events(since), store.repo_registry())?;

        let keys = resolver::key_map(&registry);
        let ledger = RepoLedger::fold(&events, &keys, now);
        debug!(
            events = events.len(),
            registered = registry.len(),
            repos = ledger.len(),
            "Reconciled repository state"
        );

        Ok(Self { ledger, keys })
    }
}
