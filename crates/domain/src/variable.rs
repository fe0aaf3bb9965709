//! Variable types and scope layering
//!
//! Merged variables carry a single effective value per name and drive
//! execution; layered variables keep one array per tree level so scripts can
//! ask for "this folder's variable" without the cascade applied.

use serde::{Deserialize, Serialize};

/// Whether a variable applies before the request or after the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    /// Evaluated before the request is sent.
    #[default]
    Request,
    /// Evaluated after the response is received.
    Response,
}

/// A named variable declared at some tree level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Variable name.
    pub name: String,
    /// Variable value.
    pub value: String,
    /// Whether this variable is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Request- or response-kind.
    #[serde(default)]
    pub kind: VariableKind,
}

const fn default_enabled() -> bool {
    true
}

impl Variable {
    /// Creates a new enabled request-kind variable.
    #[must_use]
    pub fn request(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            enabled: true,
            kind: VariableKind::Request,
        }
    }

    /// Creates a new enabled response-kind variable.
    #[must_use]
    pub fn response(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            enabled: true,
            kind: VariableKind::Response,
        }
    }

    /// Creates a disabled copy of this variable.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// The request- and response-kind variables declared at one tree level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSet {
    /// Request-kind variables.
    #[serde(default)]
    pub req: Vec<Variable>,
    /// Response-kind variables.
    #[serde(default)]
    pub res: Vec<Variable>,
}

impl VariableSet {
    /// Creates an empty variable set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            req: Vec::new(),
            res: Vec::new(),
        }
    }

    /// Returns true when neither kind declares a variable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.req.is_empty() && self.res.is_empty()
    }
}

/// Unmerged request-kind variables, one layer per tree level.
///
/// Backs the scope-qualified lookups exposed to scripts: collection-level
/// variables flat, folder variables outer→inner, and the leaf request's own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayeredVariables {
    /// Enabled collection-level variables.
    #[serde(default)]
    pub collection: Vec<Variable>,
    /// Enabled variables per folder, outermost folder first.
    #[serde(default)]
    pub folders: Vec<Vec<Variable>>,
    /// Enabled variables on the leaf request.
    #[serde(default)]
    pub request: Vec<Variable>,
}

impl LayeredVariables {
    /// Looks up a folder-scoped variable; the innermost folder that declares
    /// the name wins.
    #[must_use]
    pub fn folder_var(&self, name: &str) -> Option<&str> {
        self.folders
            .iter()
            .rev()
            .find_map(|layer| layer.iter().find(|v| v.name == name))
            .map(|v| v.value.as_str())
    }

    /// Looks up a request-scoped variable.
    #[must_use]
    pub fn request_var(&self, name: &str) -> Option<&str> {
        self.request
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value.as_str())
    }
}
