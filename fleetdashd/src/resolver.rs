//! Maps a loosely specified repository identifier to a slug and checkout path.
//!
//! Lookup order: registry slug, registry display name or alias, canonical
//! state id, then server-side snapshot paths from the merged state.
//! Snapshot paths from the user machine are never used since they do not
//! exist on this host.

use fleetdash_common::{RepoKeyMap, RepoLedger, ReporterClass};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::store::{CanonicalRepoPath, RegistryEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Registry,
    CanonicalState,
    MergedState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRepo {
    pub slug: String,
    pub path: PathBuf,
    pub source: ResolutionSource,
}

/// Join-key map derived from the registry: slug, display name and every
/// alias all map to the slug.
pub fn key_map(registry: &[RegistryEntry]) -> RepoKeyMap {
    let mut keys = RepoKeyMap::new();
    for entry in registry {
        keys.insert(entry.slug.clone(), entry.slug.clone());
        if let Some(name) = &entry.display_name {
            keys.insert(name.clone(), entry.slug.clone());
        }
        for alias in &entry.aliases {
            keys.insert(alias.clone(), entry.slug.clone());
        }
    }
    keys
}

/// Registry-only resolution.
pub fn resolve_in_registry(identifier: &str, registry: &[RegistryEntry]) -> Option<ResolvedRepo> {
    let found = registry
        .iter()
        .find(|e| e.slug == identifier)
        .or_else(|| {
            registry.iter().find(|e| {
                e.display_name.as_deref() == Some(identifier)
                    || e.aliases.iter().any(|a| a == identifier)
            })
        })?;
    Some(ResolvedRepo {
        slug: found.slug.clone(),
        path: PathBuf::from(&found.path),
        source: ResolutionSource::Registry,
    })
}

/// Fallback scan over canonical-state paths and merged server snapshots.
pub fn resolve_in_state(
    identifier: &str,
    canonical: &[CanonicalRepoPath],
    ledger: &RepoLedger,
) -> Option<ResolvedRepo> {
    if let Some(row) = canonical.iter().find(|row| row.id == identifier) {
        return Some(ResolvedRepo {
            slug: row.id.clone(),
            path: PathBuf::from(&row.path),
            source: ResolutionSource::CanonicalState,
        });
    }

    ledger
        .observations()
        .filter(|(_, obs)| ReporterClass::of(&obs.service_id) == ReporterClass::Server)
        .find_map(|(key, obs)| {
            let path = obs.snapshot.path.as_deref()?;
            let matches = key == identifier
                || obs.snapshot.repo == identifier
                || basename(path) == Some(identifier);
            matches.then(|| ResolvedRepo {
                slug: key.to_string(),
                path: PathBuf::from(path),
                source: ResolutionSource::MergedState,
            })
        })
}

fn basename(path: &str) -> Option<&str> {
    Path::new(path).file_name().and_then(|n| n.to_str())
}
