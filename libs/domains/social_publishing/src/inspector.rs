//! Image reachability checks and Instagram aspect-ratio correction.

use crate::aspect::fix_aspect_ratio;
use crate::assets::{AssetHost, UploadSource};
use crate::error::{PublishError, PublishResult};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of a reachability check. Never an error: failures are data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub ok: bool,
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub content_length: Option<String>,
    pub final_url: String,
    pub error: Option<String>,
}

impl VerifyReport {
    fn new(url: &str) -> Self {
        Self {
            final_url: url.to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, response: &reqwest::Response) {
        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.status = Some(response.status().as_u16());
        self.final_url = response.url().to_string();
        self.content_type = header(CONTENT_TYPE);
        self.content_length = header(CONTENT_LENGTH);
    }

    fn needs_get_fallback(&self) -> bool {
        self.status.is_none_or(|s| s >= 400) || self.content_type.is_none()
    }

    fn evaluate(&mut self) {
        let status_ok = self.status.is_some_and(|s| (200..400).contains(&s));
        let is_image = self
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.trim_start().starts_with("image"));
        self.ok = self.error.is_none() && status_ok && is_image;
    }

    /// Turn a failed report into an error carrying its diagnostics
    pub fn into_result(self) -> PublishResult<Self> {
        if self.ok {
            Ok(self)
        } else {
            Err(PublishError::ImageUnreachable {
                url: self.final_url.clone(),
                diagnostics: self.to_string(),
            })
        }
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status={} content_type={} content_length={} final_url={}",
            self.status.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            self.content_type.as_deref().unwrap_or("-"),
            self.content_length.as_deref().unwrap_or("-"),
            self.final_url,
        )?;
        if let Some(error) = &self.error {
            write!(f, " error={}", error)?;
        }
        Ok(())
    }
}

/// Image checks the publishers depend on.
#[async_trait]
pub trait ImageInspector: Send + Sync {
    /// HEAD (falling back to a streamed GET) and check for an image response.
    async fn verify(&self, url: &str) -> VerifyReport;

    /// Return a URL whose image satisfies Instagram's aspect-ratio bounds:
    /// `url` itself when compliant, otherwise the URL of a cropped re-upload.
    async fn ensure_instagram_compatible(&self, url: &str) -> PublishResult<String>;
}

/// Largest image downloaded for aspect-ratio correction (Instagram's own
/// JPEG limit).
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

/// reqwest-backed inspector; corrected images go to the asset host.
#[derive(Clone)]
pub struct HttpImageInspector {
    client: Client,
    asset_host: Arc<dyn AssetHost>,
    max_bytes: usize,
}

impl HttpImageInspector {
    pub fn new(asset_host: Arc<dyn AssetHost>, timeout: Duration) -> PublishResult<Self> {
        // Redirects are followed by default (up to 10 hops).
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            asset_host,
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
        })
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Download at most `max_bytes`. The declared length is checked first,
    /// the streamed body is capped as well.
    async fn fetch(&self, url: &str) -> PublishResult<Vec<u8>> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::ImageUnreachable {
                url: url.to_string(),
                diagnostics: format!("GET returned HTTP {}", status),
            });
        }

        let too_large = || {
            PublishError::ImageDecode(format!("{} exceeds the {} byte image limit", url, self.max_bytes))
        };
        if response.content_length().is_some_and(|len| len > self.max_bytes as u64) {
            return Err(too_large());
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

/// `https://host/path/air-max.png?x=1` → `air-max-ig.jpg`
fn resized_filename(url: &str) -> String {
    let last = url
        .split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .unwrap_or_default();
    let stem = last.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(last);
    if stem.is_empty() {
        "image-ig.jpg".to_string()
    } else {
        format!("{}-ig.jpg", stem)
    }
}

#[async_trait]
impl ImageInspector for HttpImageInspector {
    async fn verify(&self, url: &str) -> VerifyReport {
        let mut report = VerifyReport::new(url);

        match self.client.head(url).send().await {
            Ok(response) => report.record(&response),
            Err(e) => {
                report.error = Some(e.to_string());
                report.evaluate();
                return report;
            }
        }

        if report.needs_get_fallback() {
            debug!(url = %url, status = ?report.status, "HEAD inconclusive, retrying with GET");
            match self.client.get(url).send().await {
                // Dropping the response closes the body unread.
                Ok(response) => report.record(&response),
                Err(e) => report.error = Some(e.to_string()),
            }
        }

        report.evaluate();
        debug!(url = %url, report = %report, ok = report.ok, "Image verification");
        report
    }

    async fn ensure_instagram_compatible(&self, url: &str) -> PublishResult<String> {
        let bytes = self.fetch(url).await?;

        // Decoding is CPU-bound; keep it off the async workers.
        let fixed = tokio::task::spawn_blocking(move || fix_aspect_ratio(&bytes))
            .await
            .map_err(|e| PublishError::ImageDecode(e.to_string()))??;

        let Some(jpeg) = fixed else {
            return Ok(url.to_string());
        };

        warn!(url = %url, "Image outside Instagram aspect ratio bounds, uploading cropped copy");
        let uploaded = self
            .asset_host
            .upload(
                UploadSource::Bytes {
                    bytes: jpeg,
                    filename: resized_filename(url),
                },
                &self.asset_host.resized_folder(),
            )
            .await?;
        info!(original = %url, resized = %uploaded.secure_url, "Using aspect-corrected image");
        Ok(uploaded.secure_url)
    }
}
