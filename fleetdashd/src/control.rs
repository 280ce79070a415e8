//! Process control proxy for the remote worker supervisor.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::errors::ApiError;
use crate::health::WorkerSpec;

/// Timeout for a control round trip.
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
}

impl ControlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

impl FromStr for ControlAction {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            other => Err(ApiError::invalid(
                "action",
                format!("unknown action '{other}' (expected start, stop or restart)"),
            )),
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /api/ai-team/control`. Fields are optional so a missing
/// one is reported as a validation error rather than a decode failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    pub worker_id: Option<String>,
    pub action: Option<String>,
}

impl ControlRequest {
    /// Check the action and look the worker up in the roster.
    pub fn validate<'a>(
        &self,
        roster: &'a [WorkerSpec],
    ) -> Result<(&'a WorkerSpec, ControlAction), ApiError> {
        let worker_id = fleetdash_common::validate::require("workerId", self.worker_id.as_deref())?;
        let action: ControlAction =
            fleetdash_common::validate::require("action", self.action.as_deref())?.parse()?;
        let worker = roster
            .iter()
            .find(|w| w.id == worker_id)
            .ok_or_else(|| ApiError::invalid("workerId", format!("unknown worker '{worker_id}'")))?;
        Ok((worker, action))
    }
}

/// Forwards control actions to the supervisor's HTTP endpoint.
#[derive(Clone)]
pub struct ControlProxy {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl ControlProxy {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }

    /// Send `{name, action}` and return the supervisor's JSON reply.
    pub async fn send(
        &self,
        worker: &WorkerSpec,
        action: ControlAction,
    ) -> Result<serde_json::Value, ApiError> {
        let body = json!({ "name": worker.id, "action": action.as_str() });
        let result = tokio::time::timeout(self.timeout, async {
            let response = self.client.post(&self.url).json(&body).send().await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, text))
        })
        .await;

        let (status, text) = match result {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(worker = %worker.id, %action, "Control request failed: {}", e);
                return Err(ApiError::Upstream(format!(
                    "control endpoint unreachable: {e}"
                )));
            }
            Err(_) => {
                warn!(worker = %worker.id, %action, "Control request timed out");
                return Err(ApiError::Upstream(format!(
                    "control endpoint timed out after {}ms",
                    self.timeout.as_millis()
                )));
            }
        };

        if !status.is_success() {
            warn!(worker = %worker.id, %action, status = status.as_u16(), "Control request rejected");
            let detail = text.trim();
            let detail = if detail.is_empty() { "no body" } else { detail };
            return Err(ApiError::Upstream(format!(
                "control endpoint returned HTTP {}: {detail}",
                status.as_u16()
            )));
        }

        info!(worker = %worker.id, %action, "Control action forwarded");
        Ok(serde_json::from_str(&text).unwrap_or_else(|_| json!({ "output": text })))
    }
}
