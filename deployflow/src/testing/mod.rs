//! Testing utilities for deployflow.
//!
//! This module provides:
//! - An in-memory cluster with scripted phases and fault injection
//! - Fixtures for resources, images and fast poll settings
//! - Assertions for step outcomes

mod assertions;
mod cluster;
pub mod fixtures;

pub use assertions::{assert_log_mentions, assert_step_failed_with, assert_step_succeeded};
pub use cluster::{FakeCluster, Operation};
