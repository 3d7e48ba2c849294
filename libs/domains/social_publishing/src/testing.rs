//! In-memory fakes for the pipeline's seams.
//!
//! Available to unit tests and, through the `testing` feature, to integration
//! tests of this and downstream crates.

use crate::assets::{AssetHost, UploadSource, UploadedAsset};
use crate::catalog::CatalogStore;
use crate::error::{PublishError, PublishResult};
use crate::executor::{PublishTask, TaskExecutor};
use crate::graph::{GraphResponse, GraphTransport};
use crate::inspector::{ImageInspector, VerifyReport};
use crate::models::{Product, ProductId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One request seen by [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub url: String,
    pub params: Vec<(String, String)>,
}

impl RecordedCall {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Default)]
struct TransportState {
    routes: Vec<(String, VecDeque<GraphResponse>)>,
    calls: Vec<RecordedCall>,
}

/// Graph transport answering from canned responses.
///
/// Responses are matched by URL suffix. Several responses for one suffix are
/// served in order and the last one repeats. Unmatched URLs get a 404.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    state: Arc<Mutex<TransportState>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url_suffix: &str, status: u16, body: Value) {
        let mut state = locked(&self.state);
        let response = GraphResponse::new(status, body);
        match state.routes.iter_mut().find(|(suffix, _)| suffix == url_suffix) {
            Some((_, queue)) => queue.push_back(response),
            None => state
                .routes
                .push((url_suffix.to_string(), VecDeque::from([response]))),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        locked(&self.state).calls.clone()
    }

    pub fn calls_to(&self, url_suffix: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.url.ends_with(url_suffix))
            .collect()
    }

    fn answer(&self, method: &'static str, url: &str, params: &[(String, String)]) -> GraphResponse {
        let mut state = locked(&self.state);
        state.calls.push(RecordedCall {
            method,
            url: url.to_string(),
            params: params.to_vec(),
        });

        let queue = state
            .routes
            .iter_mut()
            .find(|(suffix, _)| url.ends_with(suffix.as_str()))
            .map(|(_, queue)| queue);
        match queue {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(not_found),
            Some(queue) => queue.front().cloned().unwrap_or_else(not_found),
            None => not_found(),
        }
    }
}

fn not_found() -> GraphResponse {
    GraphResponse::new(404, json!({"error": {"message": "no canned response"}}))
}

#[async_trait]
impl GraphTransport for RecordingTransport {
    async fn post_form(&self, url: &str, form: &[(String, String)]) -> PublishResult<GraphResponse> {
        Ok(self.answer("POST", url, form))
    }

    async fn get(&self, url: &str, query: &[(String, String)]) -> PublishResult<GraphResponse> {
        Ok(self.answer("GET", url, query))
    }
}

#[derive(Default)]
struct InspectorState {
    rejected: HashSet<String>,
    resized: HashMap<String, String>,
    failing_resize: HashSet<String>,
    verified: Vec<String>,
}

/// Image inspector with scripted answers; every URL is fine unless told
/// otherwise.
#[derive(Clone, Default)]
pub struct FakeInspector {
    state: Arc<Mutex<InspectorState>>,
}

impl FakeInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// `verify` reports `url` as unreachable
    pub fn reject(self, url: &str) -> Self {
        locked(&self.state).rejected.insert(url.to_string());
        self
    }

    /// `ensure_instagram_compatible` swaps `url` for `resized`
    pub fn resize(self, url: &str, resized: &str) -> Self {
        locked(&self.state)
            .resized
            .insert(url.to_string(), resized.to_string());
        self
    }

    /// `ensure_instagram_compatible` fails for `url`
    pub fn fail_resize(self, url: &str) -> Self {
        locked(&self.state).failing_resize.insert(url.to_string());
        self
    }

    pub fn verified(&self) -> Vec<String> {
        locked(&self.state).verified.clone()
    }
}

#[async_trait]
impl ImageInspector for FakeInspector {
    async fn verify(&self, url: &str) -> VerifyReport {
        let mut state = locked(&self.state);
        state.verified.push(url.to_string());

        let ok = !state.rejected.contains(url);
        VerifyReport {
            ok,
            status: Some(if ok { 200 } else { 404 }),
            content_type: Some(if ok { "image/jpeg" } else { "text/html" }.to_string()),
            content_length: None,
            final_url: url.to_string(),
            error: None,
        }
    }

    async fn ensure_instagram_compatible(&self, url: &str) -> PublishResult<String> {
        let state = locked(&self.state);
        if state.failing_resize.contains(url) {
            return Err(PublishError::ImageDecode(format!("cannot decode {}", url)));
        }
        Ok(state
            .resized
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string()))
    }
}

/// Asset host that "uploads" to `https://assets.test/<folder>/<n>.jpg`.
#[derive(Clone, Default)]
pub struct RecordingAssetHost {
    uploads: Arc<Mutex<Vec<(UploadSource, String)>>>,
    failing: bool,
}

impl RecordingAssetHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upload fails
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<(UploadSource, String)> {
        locked(&self.uploads).clone()
    }
}

#[async_trait]
impl AssetHost for RecordingAssetHost {
    async fn upload(&self, source: UploadSource, folder: &str) -> PublishResult<UploadedAsset> {
        if self.failing {
            return Err(PublishError::AssetUpload("HTTP 500: upstream unavailable".into()));
        }
        let mut uploads = locked(&self.uploads);
        uploads.push((source, folder.to_string()));
        let n = uploads.len();
        Ok(UploadedAsset {
            secure_url: format!("https://assets.test/{}/{}.jpg", folder, n),
            public_id: format!("{}/{}", folder, n),
        })
    }

    fn folder(&self) -> String {
        "products".to_string()
    }
}

#[derive(Default)]
struct CatalogState {
    products: HashMap<ProductId, Product>,
    published: Vec<(ProductId, DateTime<Utc>)>,
}

/// Catalog kept in memory; `mark_published` updates the stored product.
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, product: Product) {
        locked(&self.state).products.insert(product.id, product);
    }

    pub fn product(&self, id: ProductId) -> Option<Product> {
        locked(&self.state).products.get(&id).cloned()
    }

    pub fn published_calls(&self) -> Vec<(ProductId, DateTime<Utc>)> {
        locked(&self.state).published.clone()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn load_product(&self, id: ProductId) -> PublishResult<Option<Product>> {
        Ok(self.product(id))
    }

    async fn mark_published(&self, id: ProductId, at: DateTime<Utc>) -> PublishResult<()> {
        let mut state = locked(&self.state);
        let product = state
            .products
            .get_mut(&id)
            .ok_or_else(|| PublishError::Catalog(format!("product {} not found", id)))?;
        product.is_published = true;
        product.published_at = Some(at);
        state.published.push((id, at));
        Ok(())
    }
}

/// Executor that keeps the handles of spawned tasks so tests can wait for
/// them.
#[derive(Clone, Default)]
pub struct TrackingExecutor {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
    spawned: Arc<AtomicUsize>,
}

impl TrackingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks spawned over the executor's lifetime
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Wait for every task spawned so far. A task that panicked re-raises
    /// its panic here.
    pub async fn join_all(&self) {
        let handles: Vec<_> = locked(&self.handles).drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
            }
        }
    }
}

impl TaskExecutor for TrackingExecutor {
    fn spawn(&self, task: PublishTask) {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        let handle = tokio::spawn(task);
        locked(&self.handles).push(handle);
    }
}
