use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Catalog identifier of a product.
pub type ProductId = i64;

/// Reference to a stored product image.
///
/// The catalog's storage backend may already serve a public URL, a
/// path relative to the site, and/or a local file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Storage name, e.g. `products/air-max-90.jpg`
    #[serde(default)]
    pub name: String,
    /// URL reported by the storage backend (absolute or site-relative)
    #[serde(default)]
    pub url: Option<String>,
    /// Local filesystem path of the binary, when stored on disk
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl ImageRef {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }
}

/// Product image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductImage {
    pub image: ImageRef,
    /// Explicit display order (ascending)
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub is_primary: bool,
}

/// Per-size stock and pricing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSize {
    /// Size label, e.g. `US 9`
    pub size: String,
    #[serde(default)]
    pub stock: i32,
    /// Unset or zero falls back to the product's base price
    #[serde(default)]
    pub price: Option<Decimal>,
}

impl ProductSize {
    pub fn effective_price(&self, base_price: Decimal) -> Decimal {
        match self.price {
            Some(price) if !price.is_zero() => price,
            _ => base_price,
        }
    }
}

/// Read-only snapshot of a catalog product.
///
/// This is also the payload of the "product created" event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    #[serde(default)]
    pub brand: String,
    pub name: String,
    pub base_price: Decimal,
    #[serde(default)]
    pub images: Vec<ProductImage>,
    #[serde(default)]
    pub sizes: Vec<ProductSize>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl Product {
    /// Images sorted by display order, primary first on ties.
    pub fn ordered_images(&self) -> Vec<&ProductImage> {
        let mut images: Vec<&ProductImage> = self.images.iter().collect();
        images.sort_by_key(|img| (img.order, !img.is_primary));
        images
    }
}

/// "Image added to product" event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAdded {
    pub product_id: ProductId,
    pub image: ImageRef,
    #[serde(default)]
    pub order: u32,
}

/// Which catalog event triggered a publish; selects the caption template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishTrigger {
    ProductCreated,
    ImageAdded,
}

/// A caption plus the public image URLs to publish with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub caption: String,
    pub image_urls: Vec<String>,
    /// Images the product had before resolution. Larger than
    /// `image_urls.len()` when some could not be made public.
    pub source_images: usize,
}

impl Post {
    pub fn new(caption: impl Into<String>, image_urls: Vec<String>) -> Self {
        Self {
            caption: caption.into(),
            source_images: image_urls.len(),
            image_urls,
        }
    }

    pub fn with_source_images(mut self, count: usize) -> Self {
        self.source_images = count.max(self.image_urls.len());
        self
    }

    /// Product has no images at all, as opposed to images that were lost
    /// during resolution.
    pub fn is_text_only(&self) -> bool {
        self.source_images == 0
    }
}

/// Remote identifier of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub provider: &'static str,
    pub remote_id: String,
}
