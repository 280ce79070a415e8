//! Host load, memory and disk figures gathered from OS utilities.
//!
//! Every probe degrades to zero on failure; the snapshot itself never fails.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::runner::CommandRunner;

const METRIC_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
}

impl Usage {
    pub fn percent_used(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.used_bytes as f64 / self.total_bytes as f64 * 1000.0).round() / 10.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HostMetrics {
    pub load: LoadAverage,
    pub cpus: u32,
    pub memory: Usage,
    pub memory_percent: f64,
    pub disk: Usage,
    pub disk_percent: f64,
    pub uptime_seconds: u64,
}

pub struct HostMetricsCollector {
    runner: Arc<dyn CommandRunner>,
}

impl HostMetricsCollector {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Stdout of a successful run, or `None` after logging why not.
    async fn read(&self, program: &str, args: &[&str]) -> Option<String> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        match self.runner.run(program, &args, METRIC_TIMEOUT).await {
            Ok(out) if out.success => Some(out.stdout),
            Ok(out) => {
                warn!(program, code = ?out.code, "Metric command failed: {}", out.stderr.trim());
                None
            }
            Err(e) => {
                warn!(program, "Metric command failed: {}", e);
                None
            }
        }
    }

    pub async fn collect(&self) -> HostMetrics {
        let (loadavg, nproc, free, df, uptime) = tokio::join!(
            self.read("cat", &["/proc/loadavg"]),
            self.read("nproc", &[]),
            self.read("free", &["-b"]),
            self.read("df", &["-P", "-B1", "/"]),
            self.read("cat", &["/proc/uptime"]),
        );

        let memory = free.as_deref().and_then(parse_free).unwrap_or_default();
        let disk = df.as_deref().and_then(parse_df).unwrap_or_default();
        HostMetrics {
            load: loadavg.as_deref().and_then(parse_loadavg).unwrap_or_default(),
            cpus: nproc.and_then(|s| s.trim().parse().ok()).unwrap_or(0),
            memory_percent: memory.percent_used(),
            memory,
            disk_percent: disk.percent_used(),
            disk,
            uptime_seconds: uptime.as_deref().and_then(parse_uptime).unwrap_or(0),
        }
    }
}

fn parse_loadavg(text: &str) -> Option<LoadAverage> {
    let mut fields = text.split_whitespace().map(str::parse::<f64>);
    Some(LoadAverage {
        one: fields.next()?.ok()?,
        five: fields.next()?.ok()?,
        fifteen: fields.next()?.ok()?,
    })
}

fn parse_uptime(text: &str) -> Option<u64> {
    let secs: f64 = text.split_whitespace().next()?.parse().ok()?;
    Some(secs as u64)
}

/// `free -b`: the `Mem:` row holds total, used, free, shared, buff/cache, available.
fn parse_free(text: &str) -> Option<Usage> {
    let row = text.lines().find(|l| l.starts_with("Mem:"))?;
    let nums: Vec<u64> = row
        .split_whitespace()
        .skip(1)
        .filter_map(|n| n.parse().ok())
        .collect();
    let total = *nums.first()?;
    let used = *nums.get(1)?;
    let available = nums
        .get(5)
        .copied()
        .unwrap_or_else(|| total.saturating_sub(used));
    Some(Usage {
        total_bytes: total,
        used_bytes: used,
        available_bytes: available,
    })
}

/// `df -P -B1 /`: second line is filesystem, size, used, available, capacity, mount.
fn parse_df(text: &str) -> Option<Usage> {
    let row = text.lines().nth(1)?;
    let mut cols = row.split_whitespace().skip(1);
    Some(Usage {
        total_bytes: cols.next()?.parse().ok()?,
        used_bytes: cols.next()?.parse().ok()?,
        available_bytes: cols.next()?.parse().ok()?,
    })
}
