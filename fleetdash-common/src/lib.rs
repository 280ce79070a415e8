//! Shared types and pure logic for the fleetdash operations dashboard.
//!
//! Everything here is free of I/O so the daemon's handlers stay thin:
//! the reducer folds reporter events into merged repository views, the
//! drift classifier grades them, and the state hash gives pollers a cheap
//! change signal.

pub mod config;
pub mod drift;
pub mod reducer;
pub mod state_hash;
pub mod testing;
pub mod types;
pub mod util;
pub mod validate;

pub use drift::{DriftAssessment, DriftReason, DriftStatus, classify};
pub use reducer::{LedgerEntry, Observation, RepoKeyMap, RepoLedger, observation_window_start};
pub use state_hash::{STATE_HASH_LEN, empty_state_hash, state_hash};
pub use types::{
    EventType, MergedRepoView, PC_SERVICE_ID, RepoEvent, RepoEventMetadata, RepoFingerprint,
    RepoSnapshot, RepoState, ReporterClass,
};
pub use util::mask_url_password;
pub use validate::{ValidationError, validate_commit_sha, validate_slug};
