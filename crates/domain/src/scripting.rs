//! Scripting types: hooks, resolved chains, sandbox configuration, console.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// The script hooks attachable at any tree level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptHooks {
    /// Script run before the request is sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_request: Option<String>,
    /// Script run after the response is received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_response: Option<String>,
    /// Test script with `test(...)` registrations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<String>,
}

impl ScriptHooks {
    /// Creates empty hooks.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pre_request: None,
            post_response: None,
            tests: None,
        }
    }

    /// Returns true when no hook carries content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        fn blank(s: &Option<String>) -> bool {
            s.as_deref().is_none_or(|s| s.trim().is_empty())
        }
        blank(&self.pre_request) && blank(&self.post_response) && blank(&self.tests)
    }
}

/// The ordered script chains produced by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptChains {
    /// Pre-request scripts, outermost scope first.
    pub pre_request: Vec<String>,
    /// Post-response scripts, innermost scope first.
    pub post_response: Vec<String>,
    /// Test scripts concatenated innermost-first with the platform line
    /// separator.
    pub tests: String,
}

impl ScriptChains {
    /// Joins the pre-request chain into a single executable script.
    #[must_use]
    pub fn joined_pre_request(&self) -> String {
        self.pre_request.join("\n")
    }

    /// Joins the post-response chain into a single executable script.
    #[must_use]
    pub fn joined_post_response(&self) -> String {
        self.post_response.join("\n")
    }
}

/// Severity of a console call forwarded to the host sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleLevel {
    /// `log(...)`
    Log,
    /// `debug(...)`
    Debug,
    /// `info(...)`
    Info,
    /// `warn(...)`
    Warn,
    /// `error(...)`
    Error,
}

impl ConsoleLevel {
    /// The level name as scripts see it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The isolation strategy used to run scripts.
///
/// The portable interpreter is not a selectable mode; it is the fallback used
/// when the isolated backend cannot be set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SandboxMode {
    /// No script runs at all.
    Restricted,
    /// Shares host memory; filesystem and modules confined to allowed roots.
    Unrestricted,
    /// Separate memory space; every capability call crosses a serialization
    /// boundary.
    #[default]
    Isolated,
}

impl FromStr for SandboxMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "restricted" => Ok(Self::Restricted),
            "unrestricted" => Ok(Self::Unrestricted),
            "isolated" => Ok(Self::Isolated),
            other => Err(DomainError::UnknownSandboxMode(other.to_string())),
        }
    }
}

/// Raw filesystem access toggle for scripts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemAccess {
    /// Whether scripts may use the filesystem module at all.
    #[serde(default)]
    pub allow: bool,
}

/// Scripting configuration supplied by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptingConfig {
    /// Raw filesystem access gate.
    #[serde(default)]
    pub filesystem_access: FilesystemAccess,
    /// Additional module names scripts may import.
    #[serde(default)]
    pub module_whitelist: Vec<String>,
    /// Extra filesystem roots scripts may touch, absolute or relative to the
    /// collection directory.
    #[serde(default)]
    pub additional_context_roots: Vec<String>,
}
