//! Social network publishers.

mod facebook;
mod instagram;

pub use facebook::FacebookPublisher;
pub use instagram::InstagramPublisher;

use crate::error::PublishResult;
use crate::models::{Post, PublishReceipt};
use async_trait::async_trait;

/// One remote destination for posts.
#[async_trait]
pub trait SocialPublisher: Send + Sync {
    /// Stable provider label used in logs and metrics
    fn name(&self) -> &'static str;

    /// Credentials present?
    fn is_configured(&self) -> bool;

    /// Whether this provider can publish `post` at all.
    fn accepts(&self, _post: &Post) -> bool {
        true
    }

    /// Publish `post`, picking the protocol variant from its image count.
    async fn publish(&self, post: &Post) -> PublishResult<PublishReceipt>;
}
