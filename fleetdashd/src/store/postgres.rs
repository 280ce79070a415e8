//! PostgreSQL-backed dashboard store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetdash_common::{EventType, RepoEvent};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use super::{
    CanonicalRepoPath, Client, DashboardStore, Dev, NewClient, NewDev, RegistryEntry, StoreError,
    StoreResult,
};

const SCHEMA: &str = include_str!("schema.sql");

/// How long to wait for a pooled connection before failing the request.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .map(str::trim)
        .filter(|statement| {
            statement.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            })
        })
        .collect()
}

/// Postgres store over an explicitly owned connection pool.
///
/// Opened once at startup and closed on shutdown with [`PgStore::close`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect, then apply the embedded schema.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(max_connections, "PostgreSQL pool ready");
        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        // Prepared statements cannot hold several commands, so run each one.
        for statement in schema_statements(SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Wait for checked-out connections to return, then close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
    }
}

#[async_trait]
impl DashboardStore for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn recent_git_events(&self, since: DateTime<Utc>) -> StoreResult<Vec<RepoEvent>> {
        let kinds: Vec<String> = EventType::ALL.iter().map(|k| k.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, (i64, String, String, serde_json::Value, DateTime<Utc>)>(
            r#"
            SELECT id, service_id, event_type, metadata, "timestamp"
            FROM (
                SELECT id, service_id, event_type, metadata, "timestamp",
                       ROW_NUMBER() OVER (
                           PARTITION BY service_id
                           ORDER BY "timestamp" DESC, id DESC
                       ) AS rn
                FROM events
                WHERE event_type = ANY($1) AND "timestamp" >= $2
            ) latest
            WHERE rn = 1
            ORDER BY service_id
            "#,
        )
        .bind(kinds)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let events = rows
            .into_iter()
            .filter_map(|(seq, service_id, event_type, metadata, timestamp)| {
                match event_type.parse::<EventType>() {
                    Ok(event_type) => Some(RepoEvent {
                        seq,
                        service_id,
                        event_type,
                        metadata,
                        timestamp,
                    }),
                    Err(e) => {
                        warn!(seq, "Ignoring event row: {}", e);
                        None
                    }
                }
            })
            .collect();
        Ok(events)
    }

    async fn repo_registry(&self) -> StoreResult<Vec<RegistryEntry>> {
        let rows = sqlx::query(
            "SELECT slug, path, display_name, aliases FROM repo_registry ORDER BY slug",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(RegistryEntry {
                    slug: row.try_get("slug")?,
                    path: row.try_get("path")?,
                    display_name: row.try_get("display_name")?,
                    aliases: row.try_get("aliases")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(StoreError::from)
    }

    async fn canonical_repo_paths(&self) -> StoreResult<Vec<CanonicalRepoPath>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT id, current_state->>'path'
            FROM canonical_state
            WHERE type = 'repo' AND current_state ? 'path'
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, path)| CanonicalRepoPath { id, path })
            .collect())
    }

    async fn list_clients(&self) -> StoreResult<Vec<Client>> {
        let rows = sqlx::query_as::<_, (i64, String, String, DateTime<Utc>, Vec<i64>)>(
            r#"
            SELECT c.id, c.name, c.slug, c.created_at,
                   COALESCE(
                       array_agg(cd.dev_id ORDER BY cd.dev_id)
                           FILTER (WHERE cd.dev_id IS NOT NULL),
                       '{}'
                   ) AS dev_ids
            FROM clients c
            LEFT JOIN client_devs cd ON cd.client_id = c.id
            GROUP BY c.id
            ORDER BY c.name, c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, slug, created_at, dev_ids)| Client {
                id,
                name,
                slug,
                created_at,
                dev_ids,
            })
            .collect())
    }

    async fn create_client(&self, client: &NewClient) -> StoreResult<Client> {
        let (id, created_at) = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            "INSERT INTO clients (name, slug) VALUES ($1, $2) RETURNING id, created_at",
        )
        .bind(&client.name)
        .bind(&client.slug)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx(e, || format!("client slug '{}'", client.slug)))?;

        Ok(Client {
            id,
            name: client.name.clone(),
            slug: client.slug.clone(),
            created_at,
            dev_ids: Vec::new(),
        })
    }

    async fn assign_dev(&self, client_id: i64, dev_id: i64) -> StoreResult<()> {
        sqlx::query("INSERT INTO client_devs (client_id, dev_id) VALUES ($1, $2)")
            .bind(client_id)
            .bind(dev_id)
            .execute(&self.pool)
            .await
            .map_err(|e| assignment_error(e, client_id, dev_id))?;
        Ok(())
    }

    async fn unassign_dev(&self, client_id: i64, dev_id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM client_devs WHERE client_id = $1 AND dev_id = $2")
            .bind(client_id)
            .bind(dev_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "assignment of dev {dev_id} to client {client_id}"
            )));
        }
        Ok(())
    }

    async fn list_devs(&self) -> StoreResult<Vec<Dev>> {
        let rows = sqlx::query_as::<_, (i64, String, Option<String>, DateTime<Utc>)>(
            "SELECT id, name, email, created_at FROM devs ORDER BY name, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, email, created_at)| Dev {
                id,
                name,
                email,
                created_at,
            })
            .collect())
    }

    async fn create_dev(&self, dev: &NewDev) -> StoreResult<Dev> {
        let (id, created_at) = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            "INSERT INTO devs (name, email) VALUES ($1, $2) RETURNING id, created_at",
        )
        .bind(&dev.name)
        .bind(&dev.email)
        .fetch_one(&self.pool)
        .await?;
        Ok(Dev {
            id,
            name: dev.name.clone(),
            email: dev.email.clone(),
            created_at,
        })
    }
}

/// A dangling foreign key on `client_devs` cannot say which side is
/// missing, so the message names both.
fn assignment_error(err: sqlx::Error, client_id: i64, dev_id: i64) -> StoreError {
    match StoreError::from_sqlx(err, || {
        format!("assignment of dev {dev_id} to client {client_id}")
    }) {
        StoreError::NotFound(_) => {
            StoreError::NotFound(format!("client {client_id} or dev {dev_id}"))
        }
        other => other,
    }
}
