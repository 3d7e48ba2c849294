//! Social Publishing Domain
//!
//! Cross-posts catalog products to a Facebook page and an Instagram business
//! account whenever a product is created or gains an image.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Catalog event  │  ← product created / image added
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │   Dispatcher    │  ← dedup lock (product:<id>), waits for commit
//! └────────┬────────┘
//!          │ background task
//! ┌────────▼────────┐
//! │  ImageResolver  │  ← public URL, asset host upload if self-hosted
//! └────────┬────────┘
//!          │
//!     ┌────┴─────┐
//!     │          │      tokio::join!
//! ┌───▼────┐ ┌───▼───────┐
//! │Facebook│ │ Instagram │  ← verify, aspect fix, Graph API
//! └────────┘ └───────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_social_publishing::{
//!     CommitGate, HttpCatalogStore, InMemoryPublishLock, PublishDispatcher, PublisherSettings,
//! };
//!
//! let settings = PublisherSettings::from_env()?;
//! let catalog = Arc::new(HttpCatalogStore::new(catalog_url, settings.limits.graph_timeout)?);
//! let dispatcher =
//!     PublishDispatcher::from_settings(settings, catalog, Arc::new(InMemoryPublishLock::new()))?;
//!
//! dispatcher.product_created(product, CommitGate::committed()).await;
//! ```

pub mod aspect;
pub mod assets;
pub mod caption;
pub mod catalog;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod graph;
pub mod inspector;
pub mod lock;
pub mod metrics;
pub mod models;
pub mod providers;
pub mod resolver;
pub mod settings;
pub mod signing;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use assets::{AssetHost, CloudinaryAssetHost, UploadSource, UploadedAsset};
pub use caption::CaptionEngine;
pub use catalog::{CatalogStore, HttpCatalogStore};
pub use dispatcher::{DispatchOutcome, PublishDispatcher};
pub use error::{PublishError, PublishResult};
pub use executor::{CommitGate, CommitHandle, TaskExecutor, TokioExecutor};
pub use graph::{GraphClient, GraphTransport, ReqwestTransport};
pub use inspector::{HttpImageInspector, ImageInspector, VerifyReport};
pub use lock::{InMemoryPublishLock, PublishLock, RedisPublishLock};
pub use models::{
    ImageAdded, ImageRef, Post, Product, ProductId, ProductImage, ProductSize, PublishReceipt,
    PublishTrigger,
};
pub use providers::{FacebookPublisher, InstagramPublisher, SocialPublisher};
pub use resolver::ImageResolver;
pub use settings::PublisherSettings;
