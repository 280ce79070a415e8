//! Short content fingerprint over a repository's reconciled state.
//!
//! Clients poll the fingerprint and only fetch details when it changes.
//! Truncated to 12 hex chars; collisions only cost a skipped refresh.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::types::RepoState;

pub const STATE_HASH_LEN: usize = 12;

#[derive(Serialize)]
struct HashInput<'a> {
    server: Option<&'a RepoState>,
    pc: Option<&'a RepoState>,
}

/// Hash of `{"server": .., "pc": ..}` with fixed field order.
pub fn state_hash(server: Option<&RepoState>, pc: Option<&RepoState>) -> String {
    let input = HashInput { server, pc };
    // Serializing plain structs of strings, bools and integers cannot fail.
    let bytes = serde_json::to_vec(&input).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    let mut hex = format!("{digest:x}");
    hex.truncate(STATE_HASH_LEN);
    hex
}

/// Fingerprint of a repository neither reporter has seen.
pub fn empty_state_hash() -> String {
    state_hash(None, None)
}
