//! In-memory [`DashboardStore`] for handler tests.
//!
//! Mirrors the Postgres constraints: unique client slugs, unique
//! assignments, and foreign keys from assignments to clients and devs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetdash_common::RepoEvent;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{
    CanonicalRepoPath, Client, DashboardStore, Dev, NewClient, NewDev, RegistryEntry, StoreError,
    StoreResult,
};

#[derive(Default)]
struct Tables {
    events: Vec<RepoEvent>,
    registry: Vec<RegistryEntry>,
    canonical: Vec<CanonicalRepoPath>,
    clients: BTreeMap<i64, Client>,
    devs: BTreeMap<i64, Dev>,
    next_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_event(&self, event: RepoEvent) {
        self.tables.lock().unwrap().events.push(event);
    }

    pub fn register_repo(&self, entry: RegistryEntry) {
        self.tables.lock().unwrap().registry.push(entry);
    }

    pub fn add_canonical_path(&self, id: &str, path: &str) {
        self.tables.lock().unwrap().canonical.push(CanonicalRepoPath {
            id: id.to_string(),
            path: path.to_string(),
        });
    }

    /// Make every subsequent call fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of store calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> StoreResult<std::sync::MutexGuard<'_, Tables>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(self.tables.lock().unwrap())
    }
}

#[async_trait]
impl DashboardStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.enter().map(|_| ())
    }

    async fn recent_git_events(&self, since: DateTime<Utc>) -> StoreResult<Vec<RepoEvent>> {
        let tables = self.enter()?;
        Ok(tables
            .events
            .iter()
            .filter(|e| e.timestamp >= since)
            .cloned()
            .collect())
    }

    async fn repo_registry(&self) -> StoreResult<Vec<RegistryEntry>> {
        Ok(self.enter()?.registry.clone())
    }

    async fn canonical_repo_paths(&self) -> StoreResult<Vec<CanonicalRepoPath>> {
        Ok(self.enter()?.canonical.clone())
    }

    async fn list_clients(&self) -> StoreResult<Vec<Client>> {
        let mut clients: Vec<Client> = self.enter()?.clients.values().cloned().collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(clients)
    }

    async fn create_client(&self, client: &NewClient) -> StoreResult<Client> {
        let mut tables = self.enter()?;
        if tables.clients.values().any(|c| c.slug == client.slug) {
            return Err(StoreError::Conflict(format!("client slug '{}'", client.slug)));
        }
        tables.next_id += 1;
        let created = Client {
            id: tables.next_id,
            name: client.name.clone(),
            slug: client.slug.clone(),
            created_at: Utc::now(),
            dev_ids: Vec::new(),
        };
        tables.clients.insert(created.id, created.clone());
        Ok(created)
    }

    async fn assign_dev(&self, client_id: i64, dev_id: i64) -> StoreResult<()> {
        let mut tables = self.enter()?;
        if !tables.devs.contains_key(&dev_id) {
            return Err(StoreError::NotFound(format!(
                "client {client_id} or dev {dev_id}"
            )));
        }
        let Some(client) = tables.clients.get_mut(&client_id) else {
            return Err(StoreError::NotFound(format!(
                "client {client_id} or dev {dev_id}"
            )));
        };
        if client.dev_ids.contains(&dev_id) {
            return Err(StoreError::Conflict(format!(
                "assignment of dev {dev_id} to client {client_id}"
            )));
        }
        client.dev_ids.push(dev_id);
        client.dev_ids.sort_unstable();
        Ok(())
    }

    async fn unassign_dev(&self, client_id: i64, dev_id: i64) -> StoreResult<()> {
        let mut tables = self.enter()?;
        let removed = tables.clients.get_mut(&client_id).is_some_and(|client| {
            let before = client.dev_ids.len();
            client.dev_ids.retain(|id| *id != dev_id);
            client.dev_ids.len() != before
        });
        if !removed {
            return Err(StoreError::NotFound(format!(
                "assignment of dev {dev_id} to client {client_id}"
            )));
        }
        Ok(())
    }

    async fn list_devs(&self) -> StoreResult<Vec<Dev>> {
        let mut devs: Vec<Dev> = self.enter()?.devs.values().cloned().collect();
        devs.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(devs)
    }

    async fn create_dev(&self, dev: &NewDev) -> StoreResult<Dev> {
        let mut tables = self.enter()?;
        tables.next_id += 1;
        let created = Dev {
            id: tables.next_id,
            name: dev.name.clone(),
            email: dev.email.clone(),
            created_at: Utc::now(),
        };
        tables.devs.insert(created.id, created.clone());
        Ok(created)
    }
}
