//! Common test utilities for orchestrator integration tests
//!
//! Fake tools are `/bin/sh` scripts written into a scratch directory: a
//! scheme executable, a tunnel manager speaking the line protocol and a
//! link wrapper standing in for `mm-link`.

pub mod fixtures;
pub mod helpers;

pub use fixtures::ExperimentFixture;
pub use helpers::{read_pids, wait_for_pids, wait_until_gone};
