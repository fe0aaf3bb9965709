//! Response snapshot type
//!
//! The snapshot a post-response script observes: status, headers, raw body
//! bytes, and timing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// An HTTP response as captured by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSpec {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Raw body bytes.
    pub body: Vec<u8>,
    /// Wall-clock duration of the exchange.
    pub duration: Duration,
}

impl ResponseSpec {
    /// Creates a new response snapshot.
    #[must_use]
    pub const fn new(
        status: u16,
        headers: HashMap<String, String>,
        body: Vec<u8>,
        duration: Duration,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            duration,
        }
    }

    /// Returns a header value by case-insensitive name.
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the body as UTF-8 text, lossily converted.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Returns true if this is a 2xx status.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn response_with_header(name: &str, value: &str) -> ResponseSpec {
        let mut headers = HashMap::new();
        headers.insert(name.to_string(), value.to_string());
        ResponseSpec::new(200, headers, b"ok".to_vec(), Duration::from_millis(10))
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let response = response_with_header("Content-Type", "application/json");
        assert_eq!(
            response.get_header("content-type"),
            Some("application/json")
        );
        assert_eq!(response.get_header("CONTENT-TYPE"),
            Some("application/json")
        );
        assert_eq!(response.get_header("accept"), None);
    }

    #[test]
    fn test_body_text() {
        let response = response_with_header("X", "y");
        assert_eq!(response.body_text(), "ok");
    }

    #[test]
    fn test_is_success() {
        assert!(response_with_header("X", "y").is_success());
        let mut failed = response_with_header("X", "y");
        failed.status = 500;
        assert!(!failed.is_success());
    }
}
