//! Script test result types

use serde::{Deserialize, Serialize};

/// Outcome of a single `test(...)` registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// The callback completed without throwing.
    Pass,
    /// The callback threw.
    Fail,
}

/// The record produced by one `test(description, callback)` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// The test description.
    pub description: String,
    /// Pass or fail.
    pub status: TestStatus,
    /// Error message when the callback threw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Actual value from a failed assertion, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<serde_json::Value>,
    /// Expected value from a failed assertion, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<serde_json::Value>,
}

impl TestResult {
    /// Creates a passing result.
    #[must_use]
    pub fn pass(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            status: TestStatus::Pass,
            error: None,
            actual: None,
            expected: None,
        }
    }

    /// Creates a failing result from a plain error message.
    #[must_use]
    pub fn fail(description: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            status: TestStatus::Fail,
            error: Some(error.into()),
            actual: None,
            expected: None,
        }
    }

    /// Creates a failing result from a destructured assertion error.
    #[must_use]
    pub fn assertion_failure(
        description: impl Into<String>,
        error: impl Into<String>,
        actual: Option<serde_json::Value>,
        expected: Option<serde_json::Value>,
    ) -> Self {
        Self {
            description: description.into(),
            status: TestStatus::Fail,
            error: Some(error.into()),
            actual,
            expected,
        }
    }

    /// Returns true when the test passed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self.status, TestStatus::Pass)
    }
}
