//! Request specification type

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use super::{Headers, HttpMethod, Param, RequestBody};
use crate::auth::AuthConfig;
use crate::scripting::ScriptHooks;
use crate::variable::VariableSet;

/// Complete specification for an HTTP request as authored in a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    /// Unique identifier for this request
    pub id: Uuid,
    /// Human-readable name
    pub name: String,
    /// HTTP method
    pub method: HttpMethod,
    /// Target URL
    pub url: String,
    /// HTTP headers
    #[serde(default)]
    pub headers: Headers,
    /// Query and path parameters
    #[serde(default)]
    pub params: Vec<Param>,
    /// Request body
    #[serde(default)]
    pub body: RequestBody,
    /// Request- and response-kind variables declared on this request
    #[serde(default)]
    pub vars: VariableSet,
    /// Pre-request / post-response / tests hooks
    #[serde(default)]
    pub hooks: ScriptHooks,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Request timeout in milliseconds, if configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl RequestSpec {
    /// Creates a new request specification with default values.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            method: HttpMethod::default(),
            url: String::new(),
            headers: Headers::new(),
            params: Vec::new(),
            body: RequestBody::None,
            vars: VariableSet::default(),
            hooks: ScriptHooks::default(),
            auth: AuthConfig::default(),
            timeout_ms: None,
        }
    }

    /// Creates a GET request with the given URL.
    #[must_use]
    pub fn get(name: impl Into<String>, url: impl Into<String>) -> Self {
        let mut spec = Self::new(name);
        spec.url = url.into();
        spec
    }

    /// Validates the URL and returns the parsed version if valid.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed.
    pub fn parse_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.url)
    }
}

impl Default for RequestSpec {
    fn default() -> Self {
        Self::new("New Request")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_request() {
        let req = RequestSpec::new("Test Request");
        assert_eq!(req.name, "Test Request");
        assert_eq!(req.method, HttpMethod::Get);
        assert!(req.body.is_none());
    }

    #[test]
    fn test_get_request() {
        let req = RequestSpec::get("Users", "https://api.example.com/users");
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "https://api.example.com/users");
        assert!(req.parse_url().is_ok());
    }
}
