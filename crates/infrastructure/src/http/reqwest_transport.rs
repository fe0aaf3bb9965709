//! reqwest transport adapter
//!
//! Executes a transport descriptor: method, url, headers, body, basic auth,
//! timeout, and redirect ceiling. Digest, AWS SigV4, and `OAuth2` blocks are
//! carried on the descriptor for external signers and are not applied here.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::warn;

use quiver_application::ports::{HttpTransport, TransportError};
use quiver_application::transport::TransportRequest;
use quiver_domain::ResponseSpec;

use super::body_builder::{BodyBuildError, BuiltBody, build_body};

/// HTTP transport backed by reqwest.
#[derive(Debug, Default)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    /// Creates the adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn client(request: &TransportRequest) -> Result<reqwest::Client, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(max_redirects) = request.max_redirects {
            builder = builder.redirect(reqwest::redirect::Policy::limited(max_redirects as usize));
        }
        if let Some(timeout_ms) = request.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        builder
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))
    }
}

impl From<BodyBuildError> for TransportError {
    fn from(error: BodyBuildError) -> Self {
        match error {
            BodyBuildError::FileRead { message } => Self::FileRead(message),
            BodyBuildError::InvalidConfig { message }
            | BodyBuildError::Serialization { message } => Self::InvalidRequest(message),
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &TransportRequest) -> Result<ResponseSpec, TransportError> {
        let method: reqwest::Method = request
            .method
            .parse()
            .map_err(|_| TransportError::InvalidRequest(format!("bad method: {}", request.method)))?;

        let client = Self::client(request)?;
        let mut builder = client.request(method, &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(basic) = &request.basic_auth {
            builder = builder.basic_auth(
                basic.username.clone().unwrap_or_default(),
                basic.password.clone(),
            );
        }
        if request.digest_config.is_some()
            || request.awsv4_config.is_some()
            || request.oauth2.is_some()
        {
            warn!("descriptor carries an auth block this adapter does not sign; sending unsigned");
        }

        builder = match build_body(&request.body).await? {
            BuiltBody::None => builder,
            BuiltBody::Text(content) => builder.body(content),
            BuiltBody::Multipart(form) => builder.multipart(form),
        };

        let started = Instant::now();
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    timeout_ms: request.timeout_ms.unwrap_or_default(),
                }
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.to_string(), value.to_string());
            }
        }

        // Body captured as raw bytes, matching the descriptor's arraybuffer
        // response type.
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?
            .to_vec();

        Ok(ResponseSpec::new(status, headers, body, started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bad_method_is_invalid_request() {
        let transport = ReqwestTransport::new();
        let mut request = TransportRequest::default();
        request.method = "NOT A METHOD".to_string();
        request.url = "https://example.com".to_string();

        let result = transport.execute(&request).await;
        assert!(matches!(result, Err(TransportError::InvalidRequest(_))));
    }
}
