//! Test support shared by the workspace crates.

mod log;

pub use log::{TestGuard, TestPhase, init_global_test_logging};
