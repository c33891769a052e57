//! Cooperative cancellation and deadlines.
//!
//! This module provides:
//! - CancellationToken for cooperative cancellation
//! - Deadline for bounding polling loops

mod deadline;
mod token;

pub use deadline::Deadline;
pub use token::{CancelCallback, CancellationToken};
