//! Structured JSONL logging for test runs.
//!
//! Tests opt in with `let _guard = test_guard!();`. When logging is enabled
//! (`FLEETDASH_TEST_LOGGING=1`, or `CI` set), each guarded test writes
//! `target/test-logs/<test>.jsonl` and emits START/PASS/FAIL through
//! `tracing`. Otherwise the guard does nothing.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, Once};
use std::time::Instant;
use tracing_subscriber::prelude::*;

/// Phase a test log line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPhase {
    Setup,
    Execute,
    Verify,
}

impl std::fmt::Display for TestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup => write!(f, "setup"),
            Self::Execute => write!(f, "execute"),
            Self::Verify => write!(f, "verify"),
        }
    }
}

static GLOBAL_LOGGING_INIT: Once = Once::new();

/// Install a compact stderr subscriber for tests.
///
/// Filter level comes from `FLEETDASH_TEST_LOG_LEVEL` (default `info`).
/// Safe to call from every test; only the first call installs anything.
pub fn init_global_test_logging() {
    GLOBAL_LOGGING_INIT.call_once(|| {
        let level =
            std::env::var("FLEETDASH_TEST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let filter = tracing_subscriber::EnvFilter::try_new(format!(
            "fleetdashd={level},fleetdash_common={level}"
        ))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_test_writer()
            .with_target(true)
            .compact();

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer);
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

#[derive(Debug, Serialize)]
struct TestLogEntry<'a> {
    timestamp: String,
    test_name: &'a str,
    phase: TestPhase,
    message: &'a str,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a serde_json::Value>,
}

struct TestLogger {
    test_name: String,
    start_time: Instant,
    log_file: Option<Mutex<std::fs::File>>,
}

impl TestLogger {
    fn for_test(test_name: &str) -> Self {
        let logger = Self {
            test_name: test_name.to_string(),
            start_time: Instant::now(),
            log_file: create_log_file(test_name).ok().map(Mutex::new),
        };
        logger.write(TestPhase::Setup, "TEST START", None);
        logger
    }

    fn write(&self, phase: TestPhase, message: &str, data: Option<&serde_json::Value>) {
        let entry = TestLogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            test_name: &self.test_name,
            phase,
            message,
            duration_ms: self.start_time.elapsed().as_millis() as u64,
            data,
        };

        if let Some(file) = &self.log_file
            && let Ok(mut f) = file.lock()
            && let Ok(json) = serde_json::to_string(&entry)
        {
            let _ = writeln!(f, "{json}");
        }

        tracing::info!(
            test = %self.test_name,
            phase = %phase,
            duration_ms = entry.duration_ms,
            "{}",
            message
        );
    }
}

fn create_log_file(test_name: &str) -> std::io::Result<std::fs::File> {
    let log_dir = find_target_dir().join("test-logs");
    std::fs::create_dir_all(&log_dir)?;
    let safe_name = test_name.replace("::", "_").replace(['/', '\\'], "_");
    std::fs::File::create(log_dir.join(format!("{safe_name}.jsonl")))
}

fn find_target_dir() -> PathBuf {
    if let Ok(target_dir) = std::env::var("CARGO_TARGET_DIR") {
        return PathBuf::from(target_dir);
    }
    let mut cwd = std::env::current_dir().unwrap_or_default();
    loop {
        let target = cwd.join("target");
        if target.is_dir() {
            return target;
        }
        if !cwd.pop() {
            return PathBuf::from("target");
        }
    }
}

/// Logs TEST START on creation and TEST PASS / TEST FAIL on drop.
pub struct TestGuard {
    inner: Option<TestLogger>,
}

impl TestGuard {
    pub fn new(test_name: &str) -> Self {
        let inner = Self::is_enabled().then(|| {
            init_global_test_logging();
            TestLogger::for_test(test_name)
        });
        Self { inner }
    }

    fn is_enabled() -> bool {
        match std::env::var("FLEETDASH_TEST_LOGGING").as_deref() {
            Ok("1" | "true") => true,
            Ok("0" | "false") => false,
            _ => std::env::var("CI").is_ok(),
        }
    }

    /// Log an intermediate step.
    pub fn log(&self, phase: TestPhase, message: impl AsRef<str>) {
        if let Some(logger) = &self.inner {
            logger.write(phase, message.as_ref(), None);
        }
    }
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        if let Some(logger) = self.inner.take() {
            if std::thread::panicking() {
                logger.write(
                    TestPhase::Verify,
                    "TEST FAIL",
                    Some(&serde_json::json!({ "reason": "test panicked" })),
                );
            } else {
                logger.write(TestPhase::Verify, "TEST PASS", None);
            }
        }
    }
}

/// Create a [`TestGuard`] named after the enclosing test function.
#[macro_export]
macro_rules! test_guard {
    () => {{
        fn _f() {}
        fn _type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = _type_name_of(_f);
        let name = name.strip_suffix("::_f").unwrap_or(name);
        let name = name
            .rsplit("::")
            .find(|segment| *segment != "{{closure}}")
            .unwrap_or(name);
        $crate::testing::TestGuard::new(name)
    }};
}
