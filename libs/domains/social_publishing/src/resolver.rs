//! Stored image reference → publicly fetchable URL.

use crate::assets::{AssetHost, UploadSource};
use crate::models::ImageRef;
use reqwest::Url;
use std::sync::Arc;
use tracing::{debug, warn};

const LOOPBACK_HOSTS: [&str; 4] = ["localhost", "127.0.0.1", "0.0.0.0", "[::1]"];

fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Resolves image references for third-party consumption.
///
/// URLs already served from elsewhere pass through untouched. Relative URLs
/// and URLs on this site's own origin are copied to the asset host, because
/// the remote providers cannot be trusted to reach them.
#[derive(Clone)]
pub struct ImageResolver {
    site_origin: Option<String>,
    media_url: String,
    asset_host: Arc<dyn AssetHost>,
}

impl ImageResolver {
    pub fn new(
        site_origin: Option<String>,
        media_url: impl Into<String>,
        asset_host: Arc<dyn AssetHost>,
    ) -> Self {
        Self {
            site_origin: site_origin.map(|o| o.trim_end_matches('/').to_string()),
            media_url: media_url.into(),
            asset_host,
        }
    }

    /// URL reported by storage, or built from the storage name.
    fn stored_url(&self, image: &ImageRef) -> Option<String> {
        if let Some(url) = image.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            return Some(url.to_string());
        }
        let name = image.name.trim().trim_start_matches('/');
        if name.is_empty() {
            return None;
        }
        Some(format!("{}/{}", self.media_url.trim_end_matches('/'), name))
    }

    /// Best-effort absolute URL: storage URL as-is when absolute, otherwise
    /// prefixed with the site origin. Stays relative when no origin is known.
    pub fn absolute_url(&self, image: &ImageRef) -> Option<String> {
        let url = self.stored_url(image)?;
        if is_absolute(&url) {
            return Some(url);
        }
        match &self.site_origin {
            Some(origin) => Some(format!("{}/{}", origin, url.trim_start_matches('/'))),
            None => Some(url),
        }
    }

    /// True when the URL points at this site or a loopback host.
    pub fn is_self_hosted(&self, url: &str) -> bool {
        if let Some(origin) = &self.site_origin {
            if url == origin || url.starts_with(&format!("{}/", origin)) {
                return true;
            }
        }
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .is_some_and(|host| LOOPBACK_HOSTS.contains(&host.as_str()))
    }

    /// Can a third party fetch this URL directly?
    pub fn is_publicly_fetchable(&self, url: &str) -> bool {
        is_absolute(url) && !self.is_self_hosted(url)
    }

    /// Publicly fetchable URL for `image`, or `None`.
    ///
    /// Uploads at most once. Upload failures are logged and yield `None`.
    pub async fn resolve(&self, image: &ImageRef) -> Option<String> {
        let Some(url) = self.absolute_url(image) else {
            debug!(name = %image.name, "Image reference has no URL");
            return None;
        };

        if self.is_publicly_fetchable(&url) {
            return Some(url);
        }

        let source = match (&image.path, is_absolute(&url)) {
            (Some(path), _) => UploadSource::Path(path.clone()),
            (None, true) => UploadSource::Remote(url.clone()),
            (None, false) => {
                warn!(url = %url, "Relative image URL with no site origin or local file, skipping");
                return None;
            }
        };

        match self.asset_host.upload(source, &self.asset_host.folder()).await {
            Ok(asset) => {
                debug!(original = %url, secure_url = %asset.secure_url, "Image moved to asset host");
                Some(asset.secure_url)
            }
            Err(e) if e.is_configuration() => {
                warn!(url = %url, error = %e, "Image is not publicly reachable and no asset host is configured");
                None
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Asset host upload failed");
                None
            }
        }
    }
}
