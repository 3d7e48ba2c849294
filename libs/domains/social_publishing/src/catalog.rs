//! The catalog collaborator: read a product, flip its published flag.

use crate::error::{PublishError, PublishResult};
use crate::models::{Product, ProductId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Narrow view of the catalog that the pipeline depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Current snapshot of a product, `None` if it no longer exists.
    async fn load_product(&self, id: ProductId) -> PublishResult<Option<Product>>;

    /// Set `is_published = true` and record `at`.
    async fn mark_published(&self, id: ProductId, at: DateTime<Utc>) -> PublishResult<()>;
}

#[derive(Debug, Serialize)]
struct PublishedPatch {
    is_published: bool,
    published_at: DateTime<Utc>,
}

/// Catalog reached over its HTTP API (`/products/{id}`).
#[derive(Clone)]
pub struct HttpCatalogStore {
    client: Client,
    base_url: String,
}

impl HttpCatalogStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> PublishResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn product_url(&self, id: ProductId) -> String {
        format!("{}/products/{}", self.base_url, id)
    }
}

#[async_trait]
impl CatalogStore for HttpCatalogStore {
    async fn load_product(&self, id: ProductId) -> PublishResult<Option<Product>> {
        let response = self.client.get(self.product_url(id)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(PublishError::Catalog(format!(
                "GET product {} returned HTTP {}",
                id, status
            ))),
        }
    }

    async fn mark_published(&self, id: ProductId, at: DateTime<Utc>) -> PublishResult<()> {
        let patch = PublishedPatch {
            is_published: true,
            published_at: at,
        };
        let response = self
            .client
            .patch(self.product_url(id))
            .json(&patch)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Catalog(format!(
                "PATCH product {} returned HTTP {}",
                id, status
            )));
        }
        debug!(product_id = id, "Product marked as published");
        Ok(())
    }
}
