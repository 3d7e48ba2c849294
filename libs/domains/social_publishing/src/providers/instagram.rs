//! Instagram business account publishing.
//!
//! Every image goes through the aspect-ratio check first. Carousels create one
//! child container per image, then a parent container that is polled until
//! Instagram finishes processing it, then published.

use super::SocialPublisher;
use crate::error::{PublishError, PublishResult};
use crate::graph::{GraphClient, GraphTransport, ReqwestTransport, response_id};
use crate::inspector::ImageInspector;
use crate::models::{Post, PublishReceipt};
use crate::settings::PublisherSettings;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const PROVIDER: &str = "instagram";
const MIN_CAROUSEL_ITEMS: usize = 2;

pub struct InstagramPublisher<T: GraphTransport = ReqwestTransport> {
    graph: Option<GraphClient<T>>,
    inspector: Arc<dyn ImageInspector>,
    poll_interval: Duration,
    poll_attempts: u32,
    max_items: usize,
}

impl<T: GraphTransport> InstagramPublisher<T> {
    pub fn new(transport: T, settings: &PublisherSettings, inspector: Arc<dyn ImageInspector>) -> Self {
        let graph = settings.instagram.as_ref().map(|ig| {
            GraphClient::new(
                transport,
                &settings.graph_api_base,
                &settings.graph_api_version,
                ig.account_id.clone(),
                ig.access_token.clone(),
                &ig.app_secret,
            )
        });
        Self {
            graph,
            inspector,
            poll_interval: settings.limits.status_poll_interval,
            poll_attempts: settings.limits.status_poll_attempts,
            max_items: settings.limits.carousel_max_items,
        }
    }

    fn graph(&self) -> PublishResult<&GraphClient<T>> {
        self.graph
            .as_ref()
            .ok_or_else(|| PublishError::NotConfigured("instagram account credentials".to_string()))
    }

    /// Verified, aspect-corrected URL ready to hand to Instagram.
    async fn prepare(&self, url: &str) -> PublishResult<String> {
        self.inspector.verify(url).await.into_result()?;
        self.inspector.ensure_instagram_compatible(url).await
    }

    async fn publish_container(&self, graph: &GraphClient<T>, creation_id: &str) -> PublishResult<String> {
        let body = graph
            .post("media_publish", &[("creation_id", creation_id.to_string())])
            .await?;
        response_id(&body)
    }

    /// Container, then immediate publish. Any failure abandons the post.
    #[instrument(skip_all, fields(provider = PROVIDER))]
    pub async fn publish_single(&self, caption: &str, image_url: &str) -> PublishResult<String> {
        let graph = self.graph()?;
        let image_url = self.prepare(image_url).await?;

        let body = graph
            .post("media", &[("image_url", image_url), ("caption", caption.to_string())])
            .await?;
        let creation_id = response_id(&body)?;

        let media_id = self.publish_container(graph, &creation_id).await?;
        info!(media_id = %media_id, "Instagram post published");
        Ok(media_id)
    }

    /// Carousel of up to `carousel_max_items` images.
    ///
    /// Images failing verification, correction or child creation are skipped;
    /// fewer than two surviving children abort before the parent is created.
    #[instrument(skip_all, fields(provider = PROVIDER, images = image_urls.len()))]
    pub async fn publish_carousel(&self, caption: &str, image_urls: &[String]) -> PublishResult<String> {
        let graph = self.graph()?;

        if image_urls.len() > self.max_items {
            warn!(max = self.max_items, "Too many images for a carousel, truncating");
        }

        let mut children = Vec::new();
        for url in image_urls.iter().take(self.max_items) {
            match self.create_child(graph, url).await {
                Ok(id) => children.push(id),
                Err(e) => warn!(url = %url, error = %e, "Skipping carousel item"),
            }
        }

        if children.len() < MIN_CAROUSEL_ITEMS {
            return Err(PublishError::InsufficientMedia {
                required: MIN_CAROUSEL_ITEMS,
                got: children.len(),
            });
        }

        let body = graph
            .post(
                "media",
                &[
                    ("media_type", "CAROUSEL".to_string()),
                    ("children", serde_json::to_string(&children)?),
                    ("caption", caption.to_string()),
                ],
            )
            .await?;
        let creation_id = response_id(&body)?;
        debug!(creation_id = %creation_id, children = children.len(), "Carousel container created");

        self.wait_until_finished(graph, &creation_id).await?;

        let media_id = self.publish_container(graph, &creation_id).await?;
        info!(media_id = %media_id, children = children.len(), "Instagram carousel published");
        Ok(media_id)
    }

    async fn create_child(&self, graph: &GraphClient<T>, url: &str) -> PublishResult<String> {
        let image_url = self.prepare(url).await?;
        let body = graph
            .post(
                "media",
                &[("image_url", image_url), ("is_carousel_item", "true".to_string())],
            )
            .await?;
        response_id(&body)
    }

    /// Poll `status_code` until `FINISHED`.
    async fn wait_until_finished(&self, graph: &GraphClient<T>, creation_id: &str) -> PublishResult<()> {
        for attempt in 1..=self.poll_attempts {
            let body = graph
                .get(creation_id, &[("fields", "status_code".to_string())])
                .await?;
            let status = body
                .get("status_code")
                .and_then(|s| s.as_str())
                .unwrap_or_default();
            debug!(creation_id = %creation_id, attempt, status = %status, "Container status");

            match status {
                "FINISHED" => return Ok(()),
                "ERROR" => return Err(PublishError::ProcessingFailed(status.to_string())),
                _ if attempt < self.poll_attempts => tokio::time::sleep(self.poll_interval).await,
                _ => {}
            }
        }
        Err(PublishError::ProcessingTimeout(self.poll_attempts))
    }
}

#[async_trait]
impl<T: GraphTransport> SocialPublisher for InstagramPublisher<T> {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn is_configured(&self) -> bool {
        self.graph.is_some()
    }

    /// Instagram has no text-only posts.
    fn accepts(&self, post: &Post) -> bool {
        !post.image_urls.is_empty()
    }

    async fn publish(&self, post: &Post) -> PublishResult<PublishReceipt> {
        let remote_id = match post.image_urls.as_slice() {
            [] => {
                return Err(PublishError::InsufficientMedia {
                    required: 1,
                    got: 0,
                });
            }
            [single] => self.publish_single(&post.caption, single).await?,
            many => self.publish_carousel(&post.caption, many).await?,
        };
        Ok(PublishReceipt {
            provider: PROVIDER,
            remote_id,
        })
    }
}
