//! Publisher settings, resolved once at startup.
//!
//! Every environment lookup of the pipeline lives here. The rest of the crate
//! receives plain structs and never touches `std::env`.

use core_config::{ConfigError, env_first_of, env_opt, env_or_default, env_parse_or};
use std::time::Duration;
use tracing::warn;

const DEFAULT_STOREFRONT_URL: &str = "https://sidestep.studio";
const DEFAULT_GRAPH_API_BASE: &str = "https://graph.facebook.com";
const DEFAULT_GRAPH_API_VERSION: &str = "v19.0";
const DEFAULT_ASSET_FOLDER: &str = "products";

/// Facebook page credentials
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FacebookSettings {
    pub page_id: String,
    pub access_token: String,
    pub app_secret: String,
}

/// Instagram business account credentials
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstagramSettings {
    pub account_id: String,
    pub access_token: String,
    pub app_secret: String,
}

/// Cloudinary-style asset host credentials
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetHostSettings {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
}

impl AssetHostSettings {
    /// Parse `cloudinary://<api_key>:<api_secret>@<cloud_name>`
    pub fn from_url(url: &str, folder: impl Into<String>) -> Option<Self> {
        let rest = url.strip_prefix("cloudinary://")?;
        let (credentials, cloud_name) = rest.rsplit_once('@')?;
        let (api_key, api_secret) = credentials.split_once(':')?;
        if api_key.is_empty() || api_secret.is_empty() || cloud_name.is_empty() {
            return None;
        }
        Some(Self {
            cloud_name: cloud_name.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            folder: folder.into(),
        })
    }
}

/// Network timeouts and protocol limits
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    pub verify_timeout: Duration,
    pub graph_timeout: Duration,
    pub upload_timeout: Duration,
    pub dedup_ttl: Duration,
    pub status_poll_interval: Duration,
    pub status_poll_attempts: u32,
    pub carousel_max_items: usize,
    /// Download cap for images that may need aspect-ratio correction
    pub max_image_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            verify_timeout: Duration::from_secs(10),
            graph_timeout: Duration::from_secs(20),
            upload_timeout: Duration::from_secs(30),
            dedup_ttl: Duration::from_secs(60),
            status_poll_interval: Duration::from_secs(2),
            status_poll_attempts: 10,
            carousel_max_items: 10,
            max_image_bytes: crate::inspector::DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

/// All settings of the publishing pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublisherSettings {
    /// Public origin of this site, used to absolutize relative media URLs
    pub site_origin: Option<String>,
    /// Prefix of storage names without a URL (`MEDIA_URL`)
    pub media_url: String,
    /// Base of canonical product links in captions
    pub storefront_url: String,
    pub graph_api_base: String,
    pub graph_api_version: String,
    pub currency_symbol: String,
    pub facebook: Option<FacebookSettings>,
    pub instagram: Option<InstagramSettings>,
    pub asset_host: Option<AssetHostSettings>,
    pub limits: Limits,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            site_origin: None,
            media_url: "/media/".to_string(),
            storefront_url: DEFAULT_STOREFRONT_URL.to_string(),
            graph_api_base: DEFAULT_GRAPH_API_BASE.to_string(),
            graph_api_version: DEFAULT_GRAPH_API_VERSION.to_string(),
            currency_symbol: "₱".to_string(),
            facebook: None,
            instagram: None,
            asset_host: None,
            limits: Limits::default(),
        }
    }
}

impl PublisherSettings {
    /// Resolve every source once.
    ///
    /// Missing credentials leave the matching section `None` (with a warning);
    /// only malformed numeric values are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = Self {
            site_origin: resolve_site_origin(),
            media_url: env_or_default("MEDIA_URL", "/media/"),
            storefront_url: env_or_default("STOREFRONT_URL", DEFAULT_STOREFRONT_URL)
                .trim_end_matches('/')
                .to_string(),
            graph_api_base: env_or_default("GRAPH_API_BASE", DEFAULT_GRAPH_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            graph_api_version: env_or_default("GRAPH_API_VERSION", DEFAULT_GRAPH_API_VERSION),
            currency_symbol: env_or_default("CURRENCY_SYMBOL", "₱"),
            facebook: resolve_facebook(),
            instagram: resolve_instagram(),
            asset_host: resolve_asset_host(),
            limits: Limits {
                dedup_ttl: Duration::from_secs(env_parse_or("PUBLISH_DEDUP_TTL_SECS", 60u64)?),
                status_poll_attempts: env_parse_or("INSTAGRAM_STATUS_POLL_ATTEMPTS", 10u32)?,
                ..Limits::default()
            },
        };

        if settings.facebook.is_none() {
            warn!("FACEBOOK_PAGE_ID, FACEBOOK_PAGE_ACCESS_TOKEN or FACEBOOK_APP_SECRET not set");
        }
        if settings.instagram.is_none() {
            warn!("INSTAGRAM_BUSINESS_ACCOUNT_ID, access token or FACEBOOK_APP_SECRET not set");
        }
        if settings.asset_host.is_none() {
            warn!("CLOUDINARY_URL (or CLOUDINARY_CLOUD_NAME/API_KEY/API_SECRET) not set");
        }

        Ok(settings)
    }

    /// Canonical storefront page of a product
    pub fn product_link(&self, product_id: i64) -> String {
        format!("{}/product/{}/", self.storefront_url, product_id)
    }
}

/// explicit site URL → platform hostname → framework base URL
fn resolve_site_origin() -> Option<String> {
    let (key, value) = env_first_of(&["SITE_URL", "RENDER_EXTERNAL_HOSTNAME", "BASE_URL"])?;
    let origin = if key == "RENDER_EXTERNAL_HOSTNAME" && !value.contains("://") {
        format!("https://{}", value)
    } else {
        value
    };
    Some(origin.trim_end_matches('/').to_string())
}

fn resolve_facebook() -> Option<FacebookSettings> {
    Some(FacebookSettings {
        page_id: env_opt("FACEBOOK_PAGE_ID")?,
        access_token: env_opt("FACEBOOK_PAGE_ACCESS_TOKEN")?,
        app_secret: env_opt("FACEBOOK_APP_SECRET")?,
    })
}

fn resolve_instagram() -> Option<InstagramSettings> {
    let (_, access_token) =
        env_first_of(&["INSTAGRAM_ACCESS_TOKEN", "FACEBOOK_PAGE_ACCESS_TOKEN"])?;
    Some(InstagramSettings {
        account_id: env_opt("INSTAGRAM_BUSINESS_ACCOUNT_ID")?,
        access_token,
        app_secret: env_opt("FACEBOOK_APP_SECRET")?,
    })
}

fn resolve_asset_host() -> Option<AssetHostSettings> {
    let folder = env_or_default("CLOUDINARY_FOLDER", DEFAULT_ASSET_FOLDER);
    if let Some(url) = env_opt("CLOUDINARY_URL") {
        return AssetHostSettings::from_url(&url, folder);
    }
    Some(AssetHostSettings {
        cloud_name: env_opt("CLOUDINARY_CLOUD_NAME")?,
        api_key: env_opt("CLOUDINARY_API_KEY")?,
        api_secret: env_opt("CLOUDINARY_API_SECRET")?,
        folder,
    })
}
