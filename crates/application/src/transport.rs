//! Transport descriptor marshalling
//!
//! Translates a resolved request into the transport-ready descriptor the
//! HTTP adapter consumes: body mode → payload, default content-type applied
//! only when no merged header already defines one, comment-tolerant JSON
//! parsing with raw-string fallback, and multipart file paths resolved
//! against the collection root.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use quiver_domain::{
    AuthConfig, AwsV4Config, MultipartValue, OAuth2Grant, RequestBody,
};

use crate::resolver::ResolvedRequest;

/// Basic-auth credentials on the descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicCredentials {
    /// Username.
    pub username: Option<String>,
    /// Password.
    pub password: Option<String>,
}

/// Digest-auth credentials on the descriptor, consumed by an external signer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestCredentials {
    /// Username.
    pub username: Option<String>,
    /// Password.
    pub password: Option<String>,
}

/// One part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportPart {
    /// A literal text part.
    Text {
        /// Field name.
        name: String,
        /// Field value.
        value: String,
    },
    /// A file part streamed from disk by the transport adapter.
    File {
        /// Field name.
        name: String,
        /// Absolute path to the file.
        path: PathBuf,
    },
}

/// The transport-ready body payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportBody {
    /// No body.
    #[default]
    None,
    /// A parsed JSON document.
    Json {
        /// The parsed value.
        value: serde_json::Value,
    },
    /// A raw string payload (text, xml, sparql, or unparseable JSON).
    Raw {
        /// The payload.
        content: String,
    },
    /// URL-encoded form fields, enabled entries only.
    Form {
        /// Name/value pairs in authoring order.
        fields: Vec<(String, String)>,
    },
    /// Multipart parts, enabled entries only, file paths absolute.
    Multipart {
        /// The parts in authoring order.
        parts: Vec<TransportPart>,
    },
}

/// A transport-ready request descriptor.
///
/// Serializable end to end so it can cross the isolation boundary as a
/// request snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: String,
    /// Target URL.
    pub url: String,
    /// Headers, first-seen order preserved.
    pub headers: IndexMap<String, String>,
    /// Body payload.
    #[serde(default)]
    pub body: TransportBody,
    /// Response capture mode; always raw bytes.
    #[serde(default = "default_response_type")]
    pub response_type: String,
    /// Timeout in milliseconds, when configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Redirect ceiling, when configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_redirects: Option<u32>,
    /// Basic-auth credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicCredentials>,
    /// AWS SigV4 block for an external signer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awsv4_config: Option<AwsV4Config>,
    /// Digest block for an external signer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest_config: Option<DigestCredentials>,
    /// `OAuth2` block for an external token acquirer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth2: Option<OAuth2Grant>,
}

fn default_response_type() -> String {
    "arraybuffer".to_string()
}

impl TransportRequest {
    /// Returns a header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns true when any header defines the content type.
    #[must_use]
    pub fn has_content_type(&self) -> bool {
        self.header("content-type").is_some()
    }

    /// Infers the effective auth mode from the descriptor, most specific
    /// block first.
    #[must_use]
    pub fn auth_mode(&self) -> &'static str {
        let authorization = self.header("authorization").unwrap_or_default();
        if self.oauth2.is_some() {
            "oauth2"
        } else if authorization.starts_with("Bearer") {
            "bearer"
        } else if authorization.starts_with("Basic")
            || self
                .basic_auth
                .as_ref()
                .is_some_and(|b| b.username.is_some())
        {
            "basic"
        } else if self.awsv4_config.is_some() {
            "awsv4"
        } else if self.digest_config.is_some() {
            "digest"
        } else {
            "none"
        }
    }
}

/// Strips `//` line comments and `/* */` block comments from a JSON-like
/// source without touching string literals.
#[must_use]
pub fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(ch),
        }
    }

    out
}

/// Parses comment-tolerant JSON, falling back to the raw string when the
/// stripped source still does not parse.
fn json_or_raw(source: &str) -> TransportBody {
    let stripped = strip_comments(source);
    match serde_json::from_str(&stripped) {
        Ok(value) => TransportBody::Json { value },
        Err(_) => TransportBody::Raw {
            content: source.to_string(),
        },
    }
}

/// Resolves a possibly-relative path against the collection root.
fn resolve_file_path(path: &str, collection_path: &Path) -> PathBuf {
    let trimmed = Path::new(path.trim());
    if trimmed.is_absolute() {
        trimmed.to_path_buf()
    } else {
        collection_path.join(trimmed)
    }
}

/// Builds the transport descriptor for a resolved request.
#[must_use]
pub fn into_transport(resolved: &ResolvedRequest, collection_path: &Path) -> TransportRequest {
    let mut headers: IndexMap<String, String> = IndexMap::new();
    for header in &resolved.headers {
        if header.enabled && !header.name.is_empty() {
            headers.insert(header.name.clone(), header.value.clone());
        }
    }

    let mut request = TransportRequest {
        method: resolved.spec.method.to_string(),
        url: resolved.spec.url.clone(),
        headers,
        body: TransportBody::None,
        response_type: default_response_type(),
        timeout_ms: resolved.spec.timeout_ms,
        max_redirects: None,
        basic_auth: None,
        awsv4_config: None,
        digest_config: None,
        oauth2: None,
    };

    apply_auth(&mut request, &resolved.auth);

    let content_type_defined = request.has_content_type();
    let default_type = resolved.spec.body.default_content_type();

    request.body = match &resolved.spec.body {
        RequestBody::None => TransportBody::None,
        RequestBody::Json { content } => json_or_raw(content),
        RequestBody::Text { content }
        | RequestBody::Xml { content }
        | RequestBody::Sparql { content } => TransportBody::Raw {
            content: content.clone(),
        },
        RequestBody::FormUrlEncoded { fields } => TransportBody::Form {
            fields: fields
                .iter()
                .filter(|f| f.enabled)
                .map(|f| (f.name.clone(), f.value.clone()))
                .collect(),
        },
        RequestBody::MultipartForm { fields } => TransportBody::Multipart {
            parts: fields
                .iter()
                .filter(|f| f.enabled)
                .flat_map(|f| match &f.value {
                    MultipartValue::Text { value } => vec![TransportPart::Text {
                        name: f.name.clone(),
                        value: value.clone(),
                    }],
                    MultipartValue::File { paths } => paths
                        .iter()
                        .map(|p| TransportPart::File {
                            name: f.name.clone(),
                            path: resolve_file_path(p, collection_path),
                        })
                        .collect(),
                })
                .collect(),
        },
        RequestBody::Graphql { query, variables } => {
            let variables_value = match variables.as_deref() {
                None => serde_json::Value::Object(serde_json::Map::new()),
                Some(src) => match json_or_raw(src) {
                    TransportBody::Json { value } => value,
                    _ => serde_json::Value::String(src.to_string()),
                },
            };
            TransportBody::Json {
                value: serde_json::json!({
                    "query": query,
                    "variables": variables_value,
                }),
            }
        }
    };

    if !content_type_defined {
        if let Some(content_type) = default_type {
            request
                .headers
                .insert("content-type".to_string(), content_type.to_string());
        }
    }

    request
}

/// Copies the resolved auth config onto the descriptor.
fn apply_auth(request: &mut TransportRequest, auth: &AuthConfig) {
    match auth {
        AuthConfig::None | AuthConfig::Inherit => {}
        AuthConfig::Basic { username, password } => {
            request.basic_auth = Some(BasicCredentials {
                username: username.clone(),
                password: password.clone(),
            });
        }
        AuthConfig::Bearer { token } => {
            request.headers.insert(
                "Authorization".to_string(),
                format!("Bearer {}", token.as_deref().unwrap_or_default()),
            );
        }
        AuthConfig::Digest { username, password } => {
            request.digest_config = Some(DigestCredentials {
                username: username.clone(),
                password: password.clone(),
            });
        }
        AuthConfig::AwsV4(config) => {
            request.awsv4_config = Some(config.clone());
        }
        AuthConfig::OAuth2(grant) => {
            request.oauth2 = Some(grant.clone());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::resolver::resolve;
    use pretty_assertions::assert_eq;
    use quiver_domain::{
        Collection, CollectionItem, FormField, Header, MultipartField, RequestSpec,
    };

    fn collection_with_request(spec: RequestSpec) -> (Collection, uuid::Uuid) {
        let id = spec.id;
        let mut collection = Collection::new("C", "/tmp/collection");
        collection.add_item(CollectionItem::Request(spec));
        (collection, id)
    }

    fn transport_for(spec: RequestSpec) -> TransportRequest {
        let (collection, id) = collection_with_request(spec);
        let resolved = resolve(&collection, id).unwrap();
        into_transport(&resolved, &collection.pathname)
    }

    #[test]
    fn test_strip_line_comments() {
        let src = "{\n  \"a\": 1, // trailing\n  \"b\": 2\n}";
        let stripped = strip_comments(src);
        assert!(serde_json::from_str::<serde_json::Value>(&stripped).is_ok());
    }

    #[test]
    fn test_strip_block_comments() {
        let src = "{ /* note */ \"a\": 1 }";
        let value: serde_json::Value = serde_json::from_str(&strip_comments(src)).unwrap();
        assert_eq!(value, serde_json::json!({"a": 1}));
    }

    #[test]
    fn test_strip_preserves_string_literals() {
        let src = r#"{ "path": "http://example.com/x", "note": "a /* not a comment */" }"#;
        let value: serde_json::Value = serde_json::from_str(&strip_comments(src)).unwrap();
        assert_eq!(value["path"], "http://example.com/x");
        assert_eq!(value["note"], "a /* not a comment */");
    }

    #[test]
    fn test_json_body_with_comments_parses() {
        let mut spec = RequestSpec::new("R");
        spec.body = RequestBody::json("{\n  // id of the user\n  \"id\": 7\n}");
        let transport = transport_for(spec);

        assert_eq!(
            transport.body,
            TransportBody::Json {
                value: serde_json::json!({"id": 7})
            }
        );
        assert_eq!(transport.header("content-type"), Some("application/json"));
    }

    #[test]
    fn test_unparseable_json_falls_back_to_raw() {
        let mut spec = RequestSpec::new("R");
        spec.body = RequestBody::json("{ not json");
        let transport = transport_for(spec);

        assert_eq!(
            transport.body,
            TransportBody::Raw {
                content: "{ not json".to_string()
            }
        );
    }

    #[test]
    fn test_existing_content_type_wins() {
        let mut spec = RequestSpec::new("R");
        spec.headers.add(Header::new("Content-Type", "application/vnd.api+json"));
        spec.body = RequestBody::json("{}");
        let transport = transport_for(spec);

        assert_eq!(
            transport.header("content-type"),
            Some("application/vnd.api+json")
        );
        assert!(!transport.headers.contains_key("content-type"));
    }

    #[test]
    fn test_form_body_keeps_enabled_fields_only() {
        let mut spec = RequestSpec::new("R");
        let mut disabled = FormField::new("debug", "1");
        disabled.enabled = false;
        spec.body = RequestBody::FormUrlEncoded {
            fields: vec![FormField::new("user", "alice"), disabled],
        };
        let transport = transport_for(spec);

        assert_eq!(
            transport.body,
            TransportBody::Form {
                fields: vec![("user".to_string(), "alice".to_string())]
            }
        );
        assert_eq!(
            transport.header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn test_multipart_resolves_relative_paths() {
        let mut spec = RequestSpec::new("R");
        spec.body = RequestBody::MultipartForm {
            fields: vec![MultipartField {
                name: "upload".to_string(),
                value: MultipartValue::File {
                    paths: vec!["data/report.csv".to_string()],
                },
                enabled: true,
            }],
        };
        let transport = transport_for(spec);

        assert_eq!(
            transport.body,
            TransportBody::Multipart {
                parts: vec![TransportPart::File {
                    name: "upload".to_string(),
                    path: PathBuf::from("/tmp/collection/data/report.csv"),
                }]
            }
        );
        assert_eq!(transport.header("content-type"), None);
    }

    #[test]
    fn test_graphql_variables_with_comments() {
        let mut spec = RequestSpec::new("R");
        spec.body = RequestBody::Graphql {
            query: "query { me { id } }".to_string(),
            variables: Some("{ // user\n \"id\": 3 }".to_string()),
        };
        let transport = transport_for(spec);

        let TransportBody::Json { value } = transport.body else {
            unreachable!("graphql must marshal to json");
        };
        assert_eq!(value["query"], "query { me { id } }");
        assert_eq!(value["variables"], serde_json::json!({"id": 3}));
    }

    #[test]
    fn test_bearer_auth_sets_header() {
        let mut spec = RequestSpec::new("R");
        spec.auth = AuthConfig::bearer("tok-123");
        let transport = transport_for(spec);

        assert_eq!(transport.header("authorization"), Some("Bearer tok-123"));
        assert_eq!(transport.auth_mode(), "bearer");
    }

    #[test]
    fn test_basic_auth_populates_block() {
        let mut spec = RequestSpec::new("R");
        spec.auth = AuthConfig::basic("alice", "secret");
        let transport = transport_for(spec);

        assert_eq!(
            transport.basic_auth,
            Some(BasicCredentials {
                username: Some("alice".to_string()),
                password: Some("secret".to_string()),
            })
        );
        assert_eq!(transport.auth_mode(), "basic");
    }

    #[test]
    fn test_auth_mode_none() {
        let transport = transport_for(RequestSpec::new("R"));
        assert_eq!(transport.auth_mode(), "none");
    }
}
