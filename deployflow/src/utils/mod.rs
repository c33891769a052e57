//! Parsing helpers shared by configuration and steps.

pub mod wait_budget;

pub use wait_budget::{WaitBudget, WaitBudgetError};
