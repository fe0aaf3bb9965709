//! HTTP Request body types
//!
//! The body carries authoring-time content; translation into a
//! transport-ready payload happens in the application layer.

use serde::{Deserialize, Serialize};

/// A single form field (url-encoded forms).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    /// Field name.
    pub name: String,
    /// Field value.
    pub value: String,
    /// Whether this field is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl FormField {
    /// Creates a new enabled form field.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            enabled: true,
        }
    }
}

/// A multipart form part: plain text or one-or-more files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MultipartValue {
    /// A text part.
    Text {
        /// The literal value.
        value: String,
    },
    /// One or more file parts; paths may be relative to the collection root.
    File {
        /// File paths to attach under this field name.
        paths: Vec<String>,
    },
}

/// A single multipart form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartField {
    /// Field name.
    pub name: String,
    /// The part payload.
    pub value: MultipartValue,
    /// Whether this field is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

/// HTTP request body in one of the supported authoring modes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RequestBody {
    /// No body
    #[default]
    None,
    /// JSON body; content may contain comments, stripped before parsing.
    Json {
        /// Raw JSON source.
        content: String,
    },
    /// Plain text body.
    Text {
        /// The text content.
        content: String,
    },
    /// XML body.
    Xml {
        /// The XML content.
        content: String,
    },
    /// SPARQL query body.
    Sparql {
        /// The query content.
        content: String,
    },
    /// URL-encoded form body.
    FormUrlEncoded {
        /// Form fields.
        fields: Vec<FormField>,
    },
    /// Multipart form body.
    MultipartForm {
        /// Multipart fields.
        fields: Vec<MultipartField>,
    },
    /// GraphQL body: a query plus an optional variables document.
    Graphql {
        /// The GraphQL query.
        query: String,
        /// Variables as a JSON source string; may contain comments.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variables: Option<String>,
    },
}

impl RequestBody {
    /// Creates a JSON body.
    #[must_use]
    pub fn json(content: impl Into<String>) -> Self {
        Self::Json {
            content: content.into(),
        }
    }

    /// Creates a plain text body.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Returns true if there is no body.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// The default content type for this body mode, if any.
    ///
    /// Applied by the transport marshaller only when no merged header
    /// already defines `content-type`.
    #[must_use]
    pub const fn default_content_type(&self) -> Option<&'static str> {
        match self {
            Self::None | Self::MultipartForm { .. } => None,
            Self::Json { .. } | Self::Graphql { .. } => Some("application/json"),
            Self::Text { .. } => Some("text/plain"),
            Self::Xml { .. } => Some("text/xml"),
            Self::Sparql { .. } => Some("application/sparql-query"),
            Self::FormUrlEncoded { .. } => Some("application/x-www-form-urlencoded"),
        }
    }
}
