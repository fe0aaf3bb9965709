//! Query and path parameter types

use serde::{Deserialize, Serialize};

/// Where a request parameter applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// A query-string parameter.
    #[default]
    Query,
    /// A path segment placeholder.
    Path,
}

/// A request parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    /// Parameter name.
    pub name: String,
    /// Parameter value.
    pub value: String,
    /// Whether this parameter is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Query or path.
    #[serde(default)]
    pub kind: ParamKind,
}

const fn default_enabled() -> bool {
    true
}

impl Param {
    /// Creates a new enabled query parameter.
    #[must_use]
    pub fn query(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            enabled: true,
            kind: ParamKind::Query,
        }
    }

    /// Creates a new enabled path parameter.
    #[must_use]
    pub fn path(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            enabled: true,
            kind: ParamKind::Path,
        }
    }
}
