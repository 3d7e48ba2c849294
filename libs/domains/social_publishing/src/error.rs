//! Error types for the social publishing pipeline.
//!
//! Nothing in this crate lets a `PublishError` escape to the catalog layer:
//! errors travel as values up to the dispatcher task, where they are logged.

use thiserror::Error;

/// Result type for publishing operations.
pub type PublishResult<T> = Result<T, PublishError>;

/// Errors that can occur while publishing a product.
#[derive(Debug, Error)]
pub enum PublishError {
    /// A credential or endpoint required by this step is not configured.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Transport-level failure (timeout, connection refused, TLS, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The Graph API answered with a non-2xx status or an `error` object.
    #[error("Graph API error (HTTP {status}): {body}")]
    Graph { status: u16, body: serde_json::Value },

    /// A response was missing a field the protocol depends on.
    #[error("Response is missing field '{0}'")]
    MissingField(&'static str),

    /// HEAD/GET verification did not find a reachable image.
    #[error("Image is not reachable: {url} ({diagnostics})")]
    ImageUnreachable { url: String, diagnostics: String },

    /// The image could not be decoded, cropped or re-encoded.
    #[error("Image processing failed: {0}")]
    ImageDecode(String),

    /// The asset host rejected an upload.
    #[error("Asset upload failed: {0}")]
    AssetUpload(String),

    /// Not enough media survived validation to build the post.
    #[error("Insufficient media: need at least {required}, got {got}")]
    InsufficientMedia { required: usize, got: usize },

    /// Remote media processing reported a terminal error status.
    #[error("Media processing failed with status {0}")]
    ProcessingFailed(String),

    /// Remote media processing never reached `FINISHED`.
    #[error("Media processing did not finish after {0} status checks")]
    ProcessingTimeout(u32),

    /// The catalog collaborator failed.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Caption template failed to render.
    #[error("Caption rendering failed: {0}")]
    Caption(String),

    /// The dedup lock backend failed.
    #[error("Lock error: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PublishError {
    /// Configuration problems are expected in partially set-up environments
    /// and are reported as warnings rather than errors.
    pub fn is_configuration(&self) -> bool {
        matches!(self, PublishError::NotConfigured(_))
    }
}

impl From<redis::RedisError> for PublishError {
    fn from(err: redis::RedisError) -> Self {
        PublishError::Lock(err.to_string())
    }
}

impl From<image::ImageError> for PublishError {
    fn from(err: image::ImageError) -> Self {
        PublishError::ImageDecode(err.to_string())
    }
}

impl From<handlebars::RenderError> for PublishError {
    fn from(err: handlebars::RenderError) -> Self {
        PublishError::Caption(err.to_string())
    }
}
