//! Test assertions for step outcomes.

use crate::core::StepOutcome;

/// Asserts that the step succeeded.
pub fn assert_step_succeeded(outcome: &StepOutcome) {
    assert!(
        outcome.is_success(),
        "Expected success, got {:?}\n{}",
        outcome.reason,
        outcome.lines.join("\n")
    );
}

/// Asserts that the step failed with the given reason code.
pub fn assert_step_failed_with(outcome: &StepOutcome, code: &str) {
    let actual = outcome.reason.as_ref().map(crate::core::FailureReason::code);
    assert!(!outcome.is_success(), "Expected failure '{code}', but the step succeeded");
    assert_eq!(
        actual,
        Some(code),
        "Expected failure '{}', got {:?}",
        code,
        outcome.reason
    );
}

/// Asserts that some log line mentions `needle`.
pub fn assert_log_mentions(outcome: &StepOutcome, needle: &str) {
    assert!(
        outcome.mentions(needle),
        "Expected a log line containing '{}'. Lines: {:#?}",
        needle,
        outcome.lines
    );
}
