//! HTTP request body builder
//!
//! Turns the transport body payload into something reqwest can send.
//! Multipart file parts are read from their (already absolute) paths, with
//! MIME types guessed from the filename.

use reqwest::multipart::{Form, Part};
use thiserror::Error;

use quiver_application::transport::{TransportBody, TransportPart};

/// Error type for body building operations.
#[derive(Debug, Error)]
pub enum BodyBuildError {
    /// Failed to read a file part.
    #[error("failed to read file: {message}")]
    FileRead {
        /// What went wrong.
        message: String,
    },

    /// Invalid body configuration.
    #[error("invalid body configuration: {message}")]
    InvalidConfig {
        /// What went wrong.
        message: String,
    },

    /// Serialization error.
    #[error("serialization error: {message}")]
    Serialization {
        /// What went wrong.
        message: String,
    },
}

/// A body ready to attach to a reqwest request.
pub enum BuiltBody {
    /// No body.
    None,
    /// Text payload.
    Text(String),
    /// Multipart form data.
    Multipart(Form),
}

/// Builds a sendable body from the transport payload.
///
/// # Errors
///
/// Returns an error when a file part cannot be read or a payload cannot be
/// serialized.
pub async fn build_body(body: &TransportBody) -> Result<BuiltBody, BodyBuildError> {
    match body {
        TransportBody::None => Ok(BuiltBody::None),

        TransportBody::Json { value } => {
            let json_str =
                serde_json::to_string(value).map_err(|e| BodyBuildError::Serialization {
                    message: e.to_string(),
                })?;
            Ok(BuiltBody::Text(json_str))
        }

        TransportBody::Raw { content } => Ok(BuiltBody::Text(content.clone())),

        TransportBody::Form { fields } => {
            let encoded =
                serde_urlencoded::to_string(fields).map_err(|e| BodyBuildError::Serialization {
                    message: e.to_string(),
                })?;
            Ok(BuiltBody::Text(encoded))
        }

        TransportBody::Multipart { parts } => {
            let form = build_multipart_form(parts).await?;
            Ok(BuiltBody::Multipart(form))
        }
    }
}

/// Builds a multipart form from the transport parts.
async fn build_multipart_form(parts: &[TransportPart]) -> Result<Form, BodyBuildError> {
    let mut form = Form::new();

    for part in parts {
        match part {
            TransportPart::Text { name, value } => {
                form = form.text(name.clone(), value.clone());
            }
            TransportPart::File { name, path } => {
                let content =
                    tokio::fs::read(path)
                        .await
                        .map_err(|e| BodyBuildError::FileRead {
                            message: format!("{}: {e}", path.display()),
                        })?;

                let filename = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("file")
                    .to_string();

                let mime_type = mime_guess::from_path(path)
                    .first_or_octet_stream()
                    .to_string();

                let file_part = Part::bytes(content)
                    .file_name(filename)
                    .mime_str(&mime_type)
                    .map_err(|e| BodyBuildError::InvalidConfig {
                        message: format!("invalid MIME type: {e}"),
                    })?;

                form = form.part(name.clone(), file_part);
            }
        }
    }

    Ok(form)
}
