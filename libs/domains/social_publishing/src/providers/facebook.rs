//! Facebook page publishing.
//!
//! Multi-image posts are built the native way: every image is uploaded as an
//! unpublished photo, then a single feed post attaches all of them.

use super::SocialPublisher;
use crate::error::{PublishError, PublishResult};
use crate::graph::{GraphClient, GraphTransport, ReqwestTransport, response_id};
use crate::inspector::ImageInspector;
use crate::models::{Post, PublishReceipt};
use crate::settings::PublisherSettings;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};

const PROVIDER: &str = "facebook";

pub struct FacebookPublisher<T: GraphTransport = ReqwestTransport> {
    graph: Option<GraphClient<T>>,
    inspector: Arc<dyn ImageInspector>,
}

impl<T: GraphTransport> FacebookPublisher<T> {
    /// Unconfigured when `settings.facebook` is `None`; every call then fails
    /// with `NotConfigured`.
    pub fn new(transport: T, settings: &PublisherSettings, inspector: Arc<dyn ImageInspector>) -> Self {
        let graph = settings.facebook.as_ref().map(|fb| {
            GraphClient::new(
                transport,
                &settings.graph_api_base,
                &settings.graph_api_version,
                fb.page_id.clone(),
                fb.access_token.clone(),
                &fb.app_secret,
            )
        });
        Self { graph, inspector }
    }

    fn graph(&self) -> PublishResult<&GraphClient<T>> {
        self.graph
            .as_ref()
            .ok_or_else(|| PublishError::NotConfigured("facebook page credentials".to_string()))
    }

    /// Photo post when `image_url` is given and reachable, plain feed post
    /// otherwise.
    #[instrument(skip_all, fields(provider = PROVIDER, with_image = image_url.is_some()))]
    pub async fn publish_single(&self, message: &str, image_url: Option<&str>) -> PublishResult<String> {
        let graph = self.graph()?;

        let body = match image_url {
            Some(url) => {
                self.inspector.verify(url).await.into_result()?;
                graph
                    .post("photos", &[("caption", message.to_string()), ("url", url.to_string())])
                    .await?
            }
            None => graph.post("feed", &[("message", message.to_string())]).await?,
        };

        let id = response_id(&body)?;
        info!(post_id = %id, "Facebook post created");
        Ok(id)
    }

    /// Upload each image unpublished and attach all of them to one feed post.
    ///
    /// Images that fail verification or upload are skipped. Fails with
    /// `InsufficientMedia` when none survive; the feed is never called then.
    #[instrument(skip_all, fields(provider = PROVIDER, images = image_urls.len()))]
    pub async fn publish_multi(&self, message: &str, image_urls: &[String]) -> PublishResult<String> {
        let graph = self.graph()?;

        let mut photo_ids = Vec::with_capacity(image_urls.len());
        for url in image_urls {
            let report = self.inspector.verify(url).await;
            if !report.ok {
                warn!(url = %url, report = %report, "Skipping unreachable image");
                continue;
            }

            let uploaded = graph
                .post("photos", &[("url", url.clone()), ("published", "false".to_string())])
                .await
                .and_then(|body| response_id(&body));
            match uploaded {
                Ok(id) => photo_ids.push(id),
                Err(e) => warn!(url = %url, error = %e, "Unpublished photo upload failed, skipping"),
            }
        }

        if photo_ids.is_empty() {
            return Err(PublishError::InsufficientMedia {
                required: 1,
                got: 0,
            });
        }

        let mut params = vec![("message".to_string(), message.to_string())];
        for (i, id) in photo_ids.iter().enumerate() {
            params.push((
                format!("attached_media[{}]", i),
                json!({ "media_fbid": id }).to_string(),
            ));
        }
        let params: Vec<(&str, String)> = params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();

        let id = response_id(&graph.post("feed", &params).await?)?;
        info!(post_id = %id, attached = photo_ids.len(), "Facebook multi-photo post created");
        Ok(id)
    }
}

#[async_trait]
impl<T: GraphTransport> SocialPublisher for FacebookPublisher<T> {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn is_configured(&self) -> bool {
        self.graph.is_some()
    }

    async fn publish(&self, post: &Post) -> PublishResult<PublishReceipt> {
        // Lost images never degrade to a text post.
        let remote_id = if post.is_text_only() {
            self.publish_single(&post.caption, None).await?
        } else {
            self.publish_multi(&post.caption, &post.image_urls).await?
        };
        Ok(PublishReceipt {
            provider: PROVIDER,
            remote_id,
        })
    }
}
