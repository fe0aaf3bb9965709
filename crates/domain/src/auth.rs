//! Authentication configuration types
//!
//! Credential fields are optional and pass through unset rather than being
//! defaulted; the transport layer decides what an absent field means.

use serde::{Deserialize, Serialize};

/// `OAuth2` grant configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
pub enum OAuth2Grant {
    /// Resource-owner password grant.
    Password {
        /// Token endpoint URL.
        access_token_url: Option<String>,
        /// Resource-owner username.
        username: Option<String>,
        /// Resource-owner password.
        password: Option<String>,
        /// Client ID.
        client_id: Option<String>,
        /// Client secret.
        client_secret: Option<String>,
        /// Space-separated scopes.
        scope: Option<String>,
    },
    /// Authorization-code grant.
    AuthorizationCode {
        /// Redirect/callback URL.
        callback_url: Option<String>,
        /// Authorization endpoint URL.
        authorization_url: Option<String>,
        /// Token endpoint URL.
        access_token_url: Option<String>,
        /// Client ID.
        client_id: Option<String>,
        /// Client secret.
        client_secret: Option<String>,
        /// Space-separated scopes.
        scope: Option<String>,
        /// Opaque state value.
        state: Option<String>,
        /// Whether PKCE is used.
        pkce: Option<bool>,
    },
    /// Client-credentials grant.
    ClientCredentials {
        /// Token endpoint URL.
        access_token_url: Option<String>,
        /// Client ID.
        client_id: Option<String>,
        /// Client secret.
        client_secret: Option<String>,
        /// Space-separated scopes.
        scope: Option<String>,
    },
}

impl OAuth2Grant {
    /// The wire name of the grant type.
    #[must_use]
    pub const fn grant_type(&self) -> &'static str {
        match self {
            Self::Password { .. } => "password",
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::ClientCredentials { .. } => "client_credentials",
        }
    }
}

/// AWS Signature V4 credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsV4Config {
    /// Access key id.
    pub access_key_id: Option<String>,
    /// Secret access key.
    pub secret_access_key: Option<String>,
    /// Session token.
    pub session_token: Option<String>,
    /// Service name.
    pub service: Option<String>,
    /// Region.
    pub region: Option<String>,
    /// Shared-credentials profile name.
    pub profile_name: Option<String>,
}

/// Authentication configuration for a request or a collection root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AuthConfig {
    /// No authentication.
    #[default]
    None,
    /// Inherit the collection root's configuration.
    Inherit,
    /// Basic authentication.
    Basic {
        /// Username.
        username: Option<String>,
        /// Password.
        password: Option<String>,
    },
    /// Bearer token authentication.
    Bearer {
        /// The bearer token.
        token: Option<String>,
    },
    /// Digest authentication.
    Digest {
        /// Username.
        username: Option<String>,
        /// Password.
        password: Option<String>,
    },
    /// AWS Signature V4.
    #[serde(rename = "awsv4")]
    AwsV4(AwsV4Config),
    /// `OAuth2` in one of its grant flavors.
    #[serde(rename = "oauth2")]
    OAuth2(OAuth2Grant),
}

impl AuthConfig {
    /// Returns true when this config defers to the collection root.
    #[must_use]
    pub const fn is_inherit(&self) -> bool {
        matches!(self, Self::Inherit)
    }

    /// Creates a bearer token authentication.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: Some(token.into()),
        }
    }

    /// Creates a basic authentication.
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }
}
