//! HTTP Header types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single HTTP header with name and value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// The header name (e.g., "Content-Type")
    pub name: String,
    /// The header value (e.g., "application/json")
    pub value: String,
    /// Whether this header is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Id of the tree scope that last set the value, when it was a folder.
    /// Traceability only; never part of header identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<Uuid>,
}

const fn default_enabled() -> bool {
    true
}

impl Header {
    /// Creates a new enabled header.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            enabled: true,
            scope_id: None,
        }
    }

    /// Creates a new disabled header.
    #[must_use]
    pub fn disabled(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            enabled: false,
            scope_id: None,
        }
    }

    /// Returns true if this header defines the content type.
    #[must_use]
    pub fn is_content_type(&self) -> bool {
        self.name.eq_ignore_ascii_case("content-type")
    }
}

/// A collection of HTTP headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers {
    items: Vec<Header>,
}

impl Headers {
    /// Creates an empty header collection.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Adds a header to the collection.
    pub fn add(&mut self, header: Header) {
        self.items.push(header);
    }

    /// Returns an iterator over enabled headers.
    pub fn enabled(&self) -> impl Iterator<Item = &Header> {
        self.items.iter().filter(|h| h.enabled)
    }

    /// Returns all headers (enabled and disabled).
    #[must_use]
    pub fn all(&self) -> &[Header] {
        &self.items
    }

    /// Returns the number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<Header> for Headers {
    fn from_iter<T: IntoIterator<Item = Header>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
