//! Binary-level tests for `fleetdashd`. None of these need a database:
//! every case exits before the pool is opened.

mod cli_tests;
mod common;

#[ctor::ctor]
fn init() {
    common::init_test_logging();
}
