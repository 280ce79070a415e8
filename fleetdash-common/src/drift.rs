//! Drift classification between the server and pc view of a repository.
//!
//! Pure function of the two observed states. Severity is gray (one side
//! unknown) over red (diverged) over orange (out of sync) over green.

use serde::{Deserialize, Serialize};

use crate::types::RepoState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftStatus {
    Green,
    Orange,
    Red,
    Gray,
}

impl std::fmt::Display for DriftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Green => write!(f, "green"),
            Self::Orange => write!(f, "orange"),
            Self::Red => write!(f, "red"),
            Self::Gray => write!(f, "gray"),
        }
    }
}

/// Why a repository is not green. Declaration order is report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftReason {
    NoServerReport,
    NoPcReport,
    BranchMismatch,
    Diverged,
    HeadMismatch,
    ServerDirty,
    PcDirty,
    ServerUnpushed,
    PcUnpushed,
    ServerBehind,
    PcBehind,
}

impl DriftReason {
    pub fn severity(&self) -> DriftStatus {
        match self {
            Self::NoServerReport | Self::NoPcReport => DriftStatus::Gray,
            Self::BranchMismatch | Self::Diverged => DriftStatus::Red,
            Self::HeadMismatch
            | Self::ServerDirty
            | Self::PcDirty
            | Self::ServerUnpushed
            | Self::PcUnpushed
            | Self::ServerBehind
            | Self::PcBehind => DriftStatus::Orange,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftAssessment {
    pub status: DriftStatus,
    pub reasons: Vec<DriftReason>,
}

pub fn classify(server: Option<&RepoState>, pc: Option<&RepoState>) -> DriftAssessment {
    let mut reasons = Vec::new();

    if server.is_none() {
        reasons.push(DriftReason::NoServerReport);
    }
    if pc.is_none() {
        reasons.push(DriftReason::NoPcReport);
    }

    if let (Some(s), Some(p)) = (server, pc) {
        if s.branch != p.branch {
            reasons.push(DriftReason::BranchMismatch);
        }
        if s.head != p.head {
            if s.ahead > 0 && p.ahead > 0 {
                reasons.push(DriftReason::Diverged);
            }
            reasons.push(DriftReason::HeadMismatch);
        }
    }

    if server.is_some_and(|s| s.dirty) {
        reasons.push(DriftReason::ServerDirty);
    }
    if pc.is_some_and(|p| p.dirty) {
        reasons.push(DriftReason::PcDirty);
    }
    if server.is_some_and(|s| s.ahead > 0) {
        reasons.push(DriftReason::ServerUnpushed);
    }
    if pc.is_some_and(|p| p.ahead > 0) {
        reasons.push(DriftReason::PcUnpushed);
    }
    if server.is_some_and(|s| s.behind > 0) {
        reasons.push(DriftReason::ServerBehind);
    }
    if pc.is_some_and(|p| p.behind > 0) {
        reasons.push(DriftReason::PcBehind);
    }

    reasons.sort();
    let status = reasons
        .iter()
        .map(DriftReason::severity)
        .max()
        .unwrap_or(DriftStatus::Green);

    DriftAssessment { status, reasons }
}
