//! External asset host (Cloudinary-compatible upload API).
//!
//! Third-party crawlers cannot reach localhost or ephemeral hosts, so images
//! that are only served by this site get copied to the asset host first.

use crate::error::{PublishError, PublishResult};
use crate::settings::AssetHostSettings;
use crate::signing::asset_upload_signature;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error};

const UPLOAD_API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// What to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    /// A file on local disk
    Path(PathBuf),
    /// An in-memory binary
    Bytes { bytes: Vec<u8>, filename: String },
    /// A URL the asset host fetches itself
    Remote(String),
}

impl UploadSource {
    fn describe(&self) -> String {
        match self {
            UploadSource::Path(path) => path.display().to_string(),
            UploadSource::Bytes { filename, bytes } => format!("{} ({} bytes)", filename, bytes.len()),
            UploadSource::Remote(url) => url.clone(),
        }
    }
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedAsset {
    pub secure_url: String,
    #[serde(default)]
    pub public_id: String,
}

/// Persistent, publicly reachable image hosting.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetHost: Send + Sync {
    /// Upload `source` under `folder` and return its secure URL.
    async fn upload(&self, source: UploadSource, folder: &str) -> PublishResult<UploadedAsset>;

    /// Default folder for product images
    fn folder(&self) -> String;

    /// Folder for aspect-ratio corrected re-uploads
    fn resized_folder(&self) -> String {
        format!("{}/resized", self.folder())
    }
}

/// Cloudinary signed-upload client.
///
/// Built without credentials it stays usable but every upload fails with
/// `NotConfigured`.
#[derive(Clone)]
pub struct CloudinaryAssetHost {
    settings: Option<AssetHostSettings>,
    client: Client,
    api_base: String,
}

impl CloudinaryAssetHost {
    pub fn new(settings: Option<AssetHostSettings>, timeout: Duration) -> PublishResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            settings,
            client,
            api_base: UPLOAD_API_BASE.to_string(),
        })
    }

    /// Point at a different upload API (tests, regional endpoints)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.settings.is_some()
    }

    async fn file_part(source: UploadSource) -> PublishResult<Part> {
        let part = match source {
            UploadSource::Path(path) => {
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "upload".to_string());
                let bytes = tokio::fs::read(&path).await?;
                Part::bytes(bytes).file_name(filename)
            }
            UploadSource::Bytes { bytes, filename } => Part::bytes(bytes).file_name(filename),
            UploadSource::Remote(url) => Part::text(url),
        };
        Ok(part)
    }
}

#[derive(Debug, Deserialize)]
struct UploadErrorBody {
    error: UploadErrorMessage,
}

#[derive(Debug, Deserialize)]
struct UploadErrorMessage {
    message: String,
}

#[async_trait]
impl AssetHost for CloudinaryAssetHost {
    async fn upload(&self, source: UploadSource, folder: &str) -> PublishResult<UploadedAsset> {
        let settings = self
            .settings
            .as_ref()
            .ok_or_else(|| PublishError::NotConfigured("asset host credentials".to_string()))?;

        let description = source.describe();
        let timestamp = Utc::now().timestamp().to_string();
        let signed_params = [("folder", folder.to_string()), ("timestamp", timestamp.clone())];
        let signature = asset_upload_signature(&signed_params, &settings.api_secret);

        let form = Form::new()
            .part("file", Self::file_part(source).await?)
            .text("api_key", settings.api_key.clone())
            .text("folder", folder.to_string())
            .text("timestamp", timestamp)
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let url = format!("{}/{}/image/upload", self.api_base, settings.cloud_name);
        debug!(source = %description, folder = %folder, "Uploading image to asset host");

        let response = self.client.post(&url).multipart(form).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            let asset: UploadedAsset = serde_json::from_str(&text)?;
            debug!(secure_url = %asset.secure_url, "Asset host upload complete");
            Ok(asset)
        } else {
            let message = serde_json::from_str::<UploadErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or(text);
            error!(status = %status, error = %message, source = %description, "Asset host upload failed");
            Err(PublishError::AssetUpload(format!("HTTP {}: {}", status, message)))
        }
    }

    fn folder(&self) -> String {
        self.settings
            .as_ref()
            .map(|s| s.folder.clone())
            .unwrap_or_else(|| "products".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_host_reports_configuration_error() {
        let host = CloudinaryAssetHost::new(None, Duration::from_secs(1)).unwrap();
        assert!(!host.is_configured());

        let err = host
            .upload(UploadSource::Remote("https://example.com/a.jpg".into()), "products")
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_missing_file_is_an_io_error() {
        let settings = AssetHostSettings {
            cloud_name: "demo".into(),
            api_key: "key".into(),
            api_secret: "secret".into(),
            folder: "products".into(),
        };
        let host = CloudinaryAssetHost::new(Some(settings), Duration::from_secs(1)).unwrap();
        assert_eq!(host.resized_folder(), "products/resized");

        let err = host
            .upload(UploadSource::Path("/nonexistent/shoe.jpg".into()), "products")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Io(_)));
    }

    #[test]
    fn test_upload_response_parsing() {
        let asset: UploadedAsset = serde_json::from_str(
            r#"{"secure_url":"https://res.cloudinary.com/demo/image/upload/v1/products/a.jpg","public_id":"products/a","width":800}"#,
        )
        .unwrap();
        assert!(asset.secure_url.starts_with("https://res.cloudinary.com/"));
        assert_eq!(asset.public_id, "products/a");
    }
}
