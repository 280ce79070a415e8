//! Persistence seam for the dashboard.
//!
//! Handlers talk to [`DashboardStore`]; production uses Postgres, handler
//! tests use the in-memory implementation.

mod postgres;

#[cfg(test)]
pub mod memory;

pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetdash_common::RepoEvent;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Postgres SQLSTATE for a unique constraint violation.
pub const UNIQUE_VIOLATION: &str = "23505";
/// Postgres SQLSTATE for a foreign key violation.
pub const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} already exists")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Translate constraint violations into domain errors.
    ///
    /// `subject` names the record for the message, e.g. `client slug 'acme'`.
    pub fn from_sqlx(err: sqlx::Error, subject: impl FnOnce() -> String) -> Self {
        let code = match &err {
            sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
            _ => None,
        };
        match code.as_deref() {
            Some(UNIQUE_VIOLATION) => Self::Conflict(subject()),
            Some(FOREIGN_KEY_VIOLATION) => Self::NotFound(subject()),
            _ => Self::Database(err),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ── Records ────────────────────────────────────────────────────────────────

/// Repository registry row: slug to checkout path on this host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub slug: String,
    pub path: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Repository path recorded in the canonical-state table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRepoPath {
    pub id: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    /// Developers assigned to this client, ascending.
    pub dev_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClient {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dev {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDev {
    pub name: String,
    pub email: Option<String>,
}

// ── Store trait ────────────────────────────────────────────────────────────

#[async_trait]
pub trait DashboardStore: Send + Sync {
    /// Cheap connectivity check.
    async fn ping(&self) -> StoreResult<()>;

    /// Latest git event per service at or after `since`.
    async fn recent_git_events(&self, since: DateTime<Utc>) -> StoreResult<Vec<RepoEvent>>;

    async fn repo_registry(&self) -> StoreResult<Vec<RegistryEntry>>;

    async fn canonical_repo_paths(&self) -> StoreResult<Vec<CanonicalRepoPath>>;

    async fn list_clients(&self) -> StoreResult<Vec<Client>>;

    /// Fails with `Conflict` when the slug is taken.
    async fn create_client(&self, client: &NewClient) -> StoreResult<Client>;

    /// Fails with `Conflict` on duplicate assignment, `NotFound` when the
    /// client or developer does not exist.
    async fn assign_dev(&self, client_id: i64, dev_id: i64) -> StoreResult<()>;

    /// Fails with `NotFound` when no such assignment exists.
    async fn unassign_dev(&self, client_id: i64, dev_id: i64) -> StoreResult<()>;

    async fn list_devs(&self) -> StoreResult<Vec<Dev>>;

    async fn create_dev(&self, dev: &NewDev) -> StoreResult<Dev>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetdash_common::test_guard;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    /// Server-side error carrying only a SQLSTATE.
    #[derive(Debug)]
    struct SqlState(&'static str);

    impl fmt::Display for SqlState {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "violates constraint (SQLSTATE {})", self.0)
        }
    }

    impl StdError for SqlState {}

    impl DatabaseError for SqlState {
        fn message(&self) -> &str {
            "violates constraint"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match self.0 {
                UNIQUE_VIOLATION => ErrorKind::UniqueViolation,
                FOREIGN_KEY_VIOLATION => ErrorKind::ForeignKeyViolation,
                _ => ErrorKind::Other,
            }
        }
    }

    /// A `sqlx::Error::Database` with the given SQLSTATE.
    pub(super) fn database_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(SqlState(code)))
    }

    #[test]
    fn test_unique_violation_becomes_conflict() {
        let _guard = test_guard!();
        let err = StoreError::from_sqlx(database_error(UNIQUE_VIOLATION), || {
            "client slug 'acme'".to_string()
        });
        assert!(matches!(&err, StoreError::Conflict(subject) if subject == "client slug 'acme'"));
        assert_eq!(err.to_string(), "client slug 'acme' already exists");
    }

    #[test]
    fn test_foreign_key_violation_becomes_not_found() {
        let _guard = test_guard!();
        let err = StoreError::from_sqlx(database_error(FOREIGN_KEY_VIOLATION), || {
            "client 7".to_string()
        });
        assert!(matches!(&err, StoreError::NotFound(subject) if subject == "client 7"));
    }

    #[test]
    fn test_other_sqlstates_stay_database_errors() {
        let _guard = test_guard!();
        // not_null_violation
        let err = StoreError::from_sqlx(database_error("23502"), || "client".to_string());
        assert!(matches!(err, StoreError::Database(sqlx::Error::Database(_))));
    }

    #[test]
    fn test_non_database_errors_pass_through() {
        let _guard = test_guard!();
        let err = StoreError::from_sqlx(sqlx::Error::PoolTimedOut, || "client".to_string());
        assert!(matches!(err, StoreError::Database(sqlx::Error::PoolTimedOut)));
    }

    #[test]
    fn test_store_error_messages() {
        let _guard = test_guard!();
        assert_eq!(
            StoreError::Conflict("client slug 'acme'".into()).to_string(),
            "client slug 'acme' already exists"
        );
        assert_eq!(
            StoreError::NotFound("client 7".into()).to_string(),
            "client 7 not found"
        );
    }
}
