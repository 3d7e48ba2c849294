//! Catalog event → background publish attempt.
//!
//! Entry points never fail: the dedup lock is taken synchronously, everything
//! else happens in a detached task that logs instead of returning errors.

use crate::assets::{AssetHost, CloudinaryAssetHost};
use crate::caption::CaptionEngine;
use crate::catalog::CatalogStore;
use crate::error::{PublishError, PublishResult};
use crate::executor::{CommitGate, TaskExecutor, TokioExecutor};
use crate::graph::ReqwestTransport;
use crate::inspector::{HttpImageInspector, ImageInspector};
use crate::lock::{PublishLock, lock_key};
use crate::metrics::{self, Outcome};
use crate::models::{ImageAdded, Post, Product, ProductId, PublishTrigger};
use crate::providers::{FacebookPublisher, InstagramPublisher, SocialPublisher};
use crate::resolver::ImageResolver;
use crate::settings::PublisherSettings;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// What an entry point did with the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// A background publish attempt was queued
    Scheduled,
    /// Another attempt for the product is inside its dedup window
    SkippedDuplicate,
}

struct Pipeline {
    settings: PublisherSettings,
    resolver: ImageResolver,
    captions: CaptionEngine,
    facebook: Arc<dyn SocialPublisher>,
    instagram: Arc<dyn SocialPublisher>,
    catalog: Arc<dyn CatalogStore>,
}

/// Fans catalog events out to Facebook and Instagram.
#[derive(Clone)]
pub struct PublishDispatcher {
    pipeline: Arc<Pipeline>,
    lock: Arc<dyn PublishLock>,
    executor: Arc<dyn TaskExecutor>,
}

impl PublishDispatcher {
    pub fn new(
        settings: PublisherSettings,
        resolver: ImageResolver,
        facebook: Arc<dyn SocialPublisher>,
        instagram: Arc<dyn SocialPublisher>,
        catalog: Arc<dyn CatalogStore>,
        lock: Arc<dyn PublishLock>,
        executor: Arc<dyn TaskExecutor>,
    ) -> PublishResult<Self> {
        let captions = CaptionEngine::new(settings.currency_symbol.clone())?;
        Ok(Self {
            pipeline: Arc::new(Pipeline {
                settings,
                resolver,
                captions,
                facebook,
                instagram,
                catalog,
            }),
            lock,
            executor,
        })
    }

    /// Production wiring: reqwest transports, Cloudinary, tokio tasks.
    pub fn from_settings(
        settings: PublisherSettings,
        catalog: Arc<dyn CatalogStore>,
        lock: Arc<dyn PublishLock>,
    ) -> PublishResult<Self> {
        let limits = &settings.limits;
        let asset_host: Arc<dyn AssetHost> = Arc::new(CloudinaryAssetHost::new(
            settings.asset_host.clone(),
            limits.upload_timeout,
        )?);
        let inspector: Arc<dyn ImageInspector> = Arc::new(
            HttpImageInspector::new(asset_host.clone(), limits.verify_timeout)?
                .with_max_bytes(limits.max_image_bytes),
        );
        let transport = ReqwestTransport::new(limits.graph_timeout)?;

        let facebook = Arc::new(FacebookPublisher::new(transport.clone(), &settings, inspector.clone()));
        let instagram = Arc::new(InstagramPublisher::new(transport, &settings, inspector));
        let resolver = ImageResolver::new(
            settings.site_origin.clone(),
            settings.media_url.clone(),
            asset_host,
        );

        Self::new(
            settings,
            resolver,
            facebook,
            instagram,
            catalog,
            lock,
            Arc::new(TokioExecutor),
        )
    }

    /// `(provider, configured)` pairs
    pub fn providers(&self) -> [(&'static str, bool); 2] {
        let p = &self.pipeline;
        [
            (p.facebook.name(), p.facebook.is_configured()),
            (p.instagram.name(), p.instagram.is_configured()),
        ]
    }

    /// "Product created": announce the new product once `gate` opens.
    pub async fn product_created(&self, product: Product, gate: CommitGate) -> DispatchOutcome {
        let product_id = product.id;
        self.schedule(product_id, gate, PublishTrigger::ProductCreated, Some(product))
            .await
    }

    /// "Image added": re-post every image of the product as one post.
    pub async fn image_added(&self, event: ImageAdded, gate: CommitGate) -> DispatchOutcome {
        debug!(product_id = event.product_id, order = event.order, image = %event.image.name, "Image added");
        self.schedule(event.product_id, gate, PublishTrigger::ImageAdded, None)
            .await
    }

    async fn schedule(
        &self,
        product_id: ProductId,
        gate: CommitGate,
        trigger: PublishTrigger,
        snapshot: Option<Product>,
    ) -> DispatchOutcome {
        let key = lock_key(product_id);
        let ttl = self.pipeline.settings.limits.dedup_ttl;

        match self.lock.try_acquire(&key, ttl).await {
            Ok(true) => {}
            Ok(false) => {
                info!(product_id, ?trigger, "Publish already in flight, skipping");
                metrics::record_dedup_skip();
                return DispatchOutcome::SkippedDuplicate;
            }
            // A duplicate post beats never posting.
            Err(e) => warn!(product_id, error = %e, "Publish lock unavailable, proceeding without dedup"),
        }

        let pipeline = self.pipeline.clone();
        let span = info_span!("publish", product_id, trigger = ?trigger);
        self.executor.spawn(Box::pin(
            async move {
                if !gate.wait().await {
                    info!("Triggering write rolled back, not publishing");
                    return;
                }
                pipeline.run(product_id, trigger, snapshot).await;
            }
            .instrument(span),
        ));

        DispatchOutcome::Scheduled
    }
}

impl Pipeline {
    async fn run(&self, product_id: ProductId, trigger: PublishTrigger, snapshot: Option<Product>) {
        let Some(product) = self.current_product(product_id, snapshot).await else {
            return;
        };

        let images = product.ordered_images();
        let mut image_urls = Vec::with_capacity(images.len());
        for image in &images {
            match self.resolver.resolve(&image.image).await {
                Some(url) => image_urls.push(url),
                None => warn!(image = %image.image.name, "Image could not be resolved, skipping"),
            }
        }

        let link = self.settings.product_link(product.id);
        let caption = match self.captions.render(trigger, &product, &link) {
            Ok(caption) => caption,
            Err(e) => {
                error!(error = %e, "Caption rendering failed");
                return;
            }
        };
        let post = Post::new(caption, image_urls).with_source_images(images.len());
        info!(images = post.image_urls.len(), source_images = images.len(), "Publishing");

        let (facebook, instagram) = tokio::join!(
            publish_logged(self.facebook.as_ref(), &post),
            publish_logged(self.instagram.as_ref(), &post),
        );

        if (facebook || instagram) && !product.is_published {
            match self.catalog.mark_published(product.id, Utc::now()).await {
                Ok(()) => info!("Product marked as published"),
                Err(e) => error!(error = %e, "Failed to mark product as published"),
            }
        }
    }

    /// Committed state of the product. The event snapshot is only a fallback
    /// for a catalog that cannot be reached.
    async fn current_product(&self, product_id: ProductId, snapshot: Option<Product>) -> Option<Product> {
        match self.catalog.load_product(product_id).await {
            Ok(Some(product)) => Some(product),
            Ok(None) => {
                warn!("Product no longer exists, not publishing");
                None
            }
            Err(e) => match snapshot {
                Some(product) => {
                    warn!(error = %e, "Catalog unavailable, publishing from event snapshot");
                    Some(product)
                }
                None => {
                    error!(error = %e, "Catalog unavailable, not publishing");
                    None
                }
            },
        }
    }
}

/// Run one provider and turn its result into logs and metrics.
/// Returns `true` on success.
async fn publish_logged(publisher: &dyn SocialPublisher, post: &Post) -> bool {
    let provider = publisher.name();
    let started = Instant::now();

    if !publisher.accepts(post) {
        info!(provider, "Nothing this provider can publish, skipping");
        metrics::record_attempt(provider, Outcome::Skipped, started.elapsed());
        return false;
    }

    let outcome = match publisher.publish(post).await {
        Ok(receipt) => {
            info!(provider, remote_id = %receipt.remote_id, "Published");
            Outcome::Success
        }
        Err(e) if e.is_configuration() => {
            warn!(provider, error = %e, "Provider not configured, skipping");
            Outcome::Skipped
        }
        Err(e @ PublishError::InsufficientMedia { .. }) => {
            warn!(provider, error = %e, "Not enough usable images, post abandoned");
            Outcome::Failed
        }
        Err(e) => {
            error!(provider, error = %e, "Publish failed");
            Outcome::Failed
        }
    };

    metrics::record_attempt(provider, outcome, started.elapsed());
    outcome == Outcome::Success
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MockCatalogStore;
    use crate::lock::{InMemoryPublishLock, ManualClock};
    use crate::models::{ImageRef, ProductImage, PublishReceipt};
    use crate::testing::{RecordingAssetHost, TrackingExecutor};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Publisher that records posts and answers with a fixed result
    struct StubPublisher {
        name: &'static str,
        result: fn() -> PublishResult<PublishReceipt>,
        posts: Mutex<Vec<Post>>,
    }

    impl StubPublisher {
        fn new(name: &'static str, result: fn() -> PublishResult<PublishReceipt>) -> Arc<Self> {
            Arc::new(Self {
                name,
                result,
                posts: Mutex::new(Vec::new()),
            })
        }

        fn posts(&self) -> Vec<Post> {
            self.posts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SocialPublisher for StubPublisher {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn publish(&self, post: &Post) -> PublishResult<PublishReceipt> {
            self.posts.lock().unwrap().push(post.clone());
            (self.result)()
        }
    }

    fn ok() -> PublishResult<PublishReceipt> {
        Ok(PublishReceipt {
            provider: "stub",
            remote_id: "1".into(),
        })
    }

    fn failed() -> PublishResult<PublishReceipt> {
        Err(PublishError::Graph {
            status: 500,
            body: serde_json::json!({"error": "boom"}),
        })
    }

    fn product(id: ProductId, images: usize) -> Product {
        Product {
            id,
            brand: "Adidas".into(),
            name: "Samba OG".into(),
            base_price: dec!(4800),
            images: (0..images)
                .map(|i| ProductImage {
                    image: ImageRef::from_url(format!("https://cdn.test/{}.jpg", i)),
                    order: i as u32,
                    is_primary: i == 0,
                })
                .collect(),
            sizes: vec![],
            is_published: false,
            published_at: None,
        }
    }

    struct Harness {
        dispatcher: PublishDispatcher,
        executor: TrackingExecutor,
        facebook: Arc<StubPublisher>,
        instagram: Arc<StubPublisher>,
        clock: ManualClock,
    }

    fn harness(
        catalog: MockCatalogStore,
        facebook: fn() -> PublishResult<PublishReceipt>,
        instagram: fn() -> PublishResult<PublishReceipt>,
    ) -> Harness {
        let executor = TrackingExecutor::new();
        let clock = ManualClock::new();
        let facebook = StubPublisher::new("facebook", facebook);
        let instagram = StubPublisher::new("instagram", instagram);
        let resolver = ImageResolver::new(None, "/media/", Arc::new(RecordingAssetHost::new()));

        let dispatcher = PublishDispatcher::new(
            PublisherSettings::default(),
            resolver,
            facebook.clone(),
            instagram.clone(),
            Arc::new(catalog),
            Arc::new(InMemoryPublishLock::with_clock(clock.clone())),
            Arc::new(executor.clone()),
        )
        .unwrap();

        Harness {
            dispatcher,
            executor,
            facebook,
            instagram,
            clock,
        }
    }

    fn catalog_with(product: Product, expect_mark: usize) -> MockCatalogStore {
        let mut catalog = MockCatalogStore::new();
        catalog
            .expect_load_product()
            .returning(move |_| Ok(Some(product.clone())));
        catalog
            .expect_mark_published()
            .times(expect_mark)
            .returning(|_, _| Ok(()));
        catalog
    }

    fn image_added(product_id: ProductId) -> ImageAdded {
        ImageAdded {
            product_id,
            image: ImageRef::from_url("https://cdn.test/new.jpg"),
            order: 3,
        }
    }

    #[tokio::test]
    async fn test_second_image_added_inside_window_is_dropped() {
        let h = harness(catalog_with(product(1, 2), 1), ok, ok);

        let first = h.dispatcher.image_added(image_added(1), CommitGate::committed()).await;
        let second = h.dispatcher.image_added(image_added(1), CommitGate::committed()).await;
        h.executor.join_all().await;

        assert_eq!(first, DispatchOutcome::Scheduled);
        assert_eq!(second, DispatchOutcome::SkippedDuplicate);
        assert_eq!(h.executor.spawned(), 1);
        assert_eq!(h.facebook.posts().len(), 1);
    }

    #[tokio::test]
    async fn test_window_expiry_allows_retry() {
        let h = harness(catalog_with(product(1, 1), 2), ok, ok);

        h.dispatcher.image_added(image_added(1), CommitGate::committed()).await;
        h.executor.join_all().await;
        h.clock.advance(Duration::from_secs(60));
        let outcome = h.dispatcher.image_added(image_added(1), CommitGate::committed()).await;
        h.executor.join_all().await;

        assert_eq!(outcome, DispatchOutcome::Scheduled);
        assert_eq!(h.instagram.posts().len(), 2);
    }

    #[tokio::test]
    async fn test_product_created_locks_out_image_added() {
        let h = harness(catalog_with(product(5, 1), 1), ok, ok);

        let created = h
            .dispatcher
            .product_created(product(5, 1), CommitGate::committed())
            .await;
        let added = h.dispatcher.image_added(image_added(5), CommitGate::committed()).await;
        h.executor.join_all().await;

        assert_eq!(created, DispatchOutcome::Scheduled);
        assert_eq!(added, DispatchOutcome::SkippedDuplicate);
        assert!(h.facebook.posts()[0].caption.contains("NEW DROP"));
    }

    #[tokio::test]
    async fn test_one_failing_provider_does_not_block_the_other() {
        let h = harness(catalog_with(product(2, 3), 1), failed, ok);

        h.dispatcher.image_added(image_added(2), CommitGate::committed()).await;
        h.executor.join_all().await;

        let fb = h.facebook.posts();
        let ig = h.instagram.posts();
        assert_eq!(fb.len(), 1);
        assert_eq!(ig.len(), 1);
        assert_eq!(fb[0], ig[0]);
        assert_eq!(
            ig[0].image_urls,
            vec!["https://cdn.test/0.jpg", "https://cdn.test/1.jpg", "https://cdn.test/2.jpg"]
        );
    }

    #[tokio::test]
    async fn test_all_providers_failing_leaves_product_unpublished() {
        let h = harness(catalog_with(product(3, 1), 0), failed, failed);

        h.dispatcher.image_added(image_added(3), CommitGate::committed()).await;
        h.executor.join_all().await;
    }

    #[tokio::test]
    async fn test_already_published_product_is_not_marked_again() {
        let mut published = product(4, 1);
        published.is_published = true;
        let h = harness(catalog_with(published, 0), ok, ok);

        h.dispatcher.image_added(image_added(4), CommitGate::committed()).await;
        h.executor.join_all().await;
        assert_eq!(h.facebook.posts().len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_cancels_the_attempt() {
        let mut catalog = MockCatalogStore::new();
        catalog.expect_load_product().never();
        let h = harness(catalog, ok, ok);

        let (handle, gate) = CommitGate::pending();
        let outcome = h.dispatcher.image_added(image_added(6), gate).await;
        handle.rollback();
        h.executor.join_all().await;

        assert_eq!(outcome, DispatchOutcome::Scheduled);
        assert!(h.facebook.posts().is_empty());
    }

    #[tokio::test]
    async fn test_task_waits_for_commit() {
        let h = harness(catalog_with(product(7, 1), 1), ok, ok);

        let (handle, gate) = CommitGate::pending();
        h.dispatcher.image_added(image_added(7), gate).await;
        tokio::task::yield_now().await;
        assert!(h.facebook.posts().is_empty());

        handle.commit();
        h.executor.join_all().await;
        assert_eq!(h.facebook.posts().len(), 1);
    }

    #[tokio::test]
    async fn test_deleted_product_is_not_published() {
        let mut catalog = MockCatalogStore::new();
        catalog.expect_load_product().returning(|_| Ok(None));
        catalog.expect_mark_published().never();
        let h = harness(catalog, ok, ok);

        h.dispatcher.image_added(image_added(8), CommitGate::committed()).await;
        h.executor.join_all().await;
        assert!(h.instagram.posts().is_empty());
    }

    #[tokio::test]
    async fn test_catalog_outage_falls_back_to_event_snapshot() {
        let mut catalog = MockCatalogStore::new();
        catalog
            .expect_load_product()
            .returning(|_| Err(PublishError::Catalog("HTTP 503".into())));
        catalog.expect_mark_published().times(1).returning(|_, _| Ok(()));
        let h = harness(catalog, ok, ok);

        h.dispatcher
            .product_created(product(9, 2), CommitGate::committed())
            .await;
        h.executor.join_all().await;
        assert_eq!(h.facebook.posts()[0].image_urls.len(), 2);
    }

    #[tokio::test]
    async fn test_post_counts_images_lost_in_resolution() {
        let mut shoe = product(12, 2);
        for image in &mut shoe.images {
            // relative, and no site origin to absolutize it
            image.image = ImageRef::from_url("/media/products/samba.jpg");
        }
        let h = harness(catalog_with(shoe.clone(), 1), ok, ok);

        h.dispatcher.product_created(shoe, CommitGate::committed()).await;
        h.executor.join_all().await;

        let post = &h.facebook.posts()[0];
        assert!(post.image_urls.is_empty());
        assert_eq!(post.source_images, 2);
        assert!(!post.is_text_only());
    }
}
