//! Worker health fan-out.
//!
//! Probes every worker in the roster concurrently. Each probe has its own
//! timeout; one slow worker never delays or drops another's entry.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default per-probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// A worker process on the remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub id: String,
    pub name: String,
    pub health_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    /// 2xx response.
    Online,
    /// Reached the worker but it answered non-2xx.
    Error,
    /// Connection failure or timeout.
    Offline,
}

/// Outcome of probing one worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerProbe {
    pub id: String,
    pub name: String,
    pub status: ProbeStatus,
    pub http_status: Option<u16>,
    pub response_time_ms: u64,
    pub error: Option<String>,
    /// Parsed JSON body when the worker returned one.
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProbeCounts {
    pub total: usize,
    pub online: usize,
    pub error: usize,
    pub offline: usize,
}

impl ProbeCounts {
    pub fn tally(probes: &[WorkerProbe]) -> Self {
        probes.iter().fold(
            Self {
                total: probes.len(),
                ..Self::default()
            },
            |mut counts, probe| {
                match probe.status {
                    ProbeStatus::Online => counts.online += 1,
                    ProbeStatus::Error => counts.error += 1,
                    ProbeStatus::Offline => counts.offline += 1,
                }
                counts
            },
        )
    }
}

/// HTTP prober shared by all requests.
#[derive(Clone)]
pub struct WorkerProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl WorkerProber {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Probe one worker. Never fails; every outcome is a status.
    pub async fn probe(&self, worker: &WorkerSpec) -> WorkerProbe {
        let start = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, async {
            let response = self.client.get(&worker.health_url).send().await?;
            let status = response.status();
            let details = response.json::<serde_json::Value>().await.ok();
            Ok::<_, reqwest::Error>((status, details))
        })
        .await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        let (status, http_status, error, details) = match outcome {
            Ok(Ok((code, details))) if code.is_success() => {
                (ProbeStatus::Online, Some(code.as_u16()), None, details)
            }
            Ok(Ok((code, details))) => (
                ProbeStatus::Error,
                Some(code.as_u16()),
                Some(format!("HTTP {}", code.as_u16())),
                details,
            ),
            Ok(Err(e)) => (ProbeStatus::Offline, None, Some(e.to_string()), None),
            Err(_) => (
                ProbeStatus::Offline,
                None,
                Some(format!("timed out after {}ms", self.timeout.as_millis())),
                None,
            ),
        };

        if status == ProbeStatus::Online {
            debug!(worker = %worker.id, response_time_ms, "Worker online");
        } else {
            warn!(
                worker = %worker.id,
                url = %worker.health_url,
                status = ?status,
                "Worker probe failed: {}",
                error.as_deref().unwrap_or("unknown")
            );
        }

        WorkerProbe {
            id: worker.id.clone(),
            name: worker.name.clone(),
            status,
            http_status,
            response_time_ms,
            error,
            details,
        }
    }

    /// Probe the whole roster concurrently; results keep roster order.
    pub async fn probe_all(&self, roster: &[WorkerSpec]) -> Vec<WorkerProbe> {
        join_all(roster.iter().map(|worker| self.probe(worker))).await
    }
}
