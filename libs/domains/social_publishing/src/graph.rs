//! Graph API plumbing shared by the Facebook and Instagram publishers.
//!
//! `GraphTransport` is the raw HTTP seam (form POST / query GET);
//! `GraphClient` binds one node (page or IG account) with its credentials and
//! turns error responses into `PublishError::Graph`.

use crate::error::{PublishError, PublishResult};
use crate::signing::appsecret_proof;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// Status and body of a Graph API response.
///
/// Bodies that are not JSON are kept as `{"error": "invalid_json", "text": <raw>}`
/// so diagnostics never lose the provider's answer.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphResponse {
    pub status: u16,
    pub body: Value,
}

impl GraphResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn from_text(status: u16, text: &str) -> Self {
        let body = serde_json::from_str(text)
            .unwrap_or_else(|_| json!({"error": "invalid_json", "text": text}));
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) && self.body.get("error").is_none()
    }

    /// Body on success, `PublishError::Graph` otherwise.
    pub fn into_result(self) -> PublishResult<Value> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(PublishError::Graph {
                status: self.status,
                body: self.body,
            })
        }
    }
}

/// Raw HTTP seam to the Graph API.
#[async_trait]
pub trait GraphTransport: Send + Sync {
    /// POST `form` as `application/x-www-form-urlencoded`
    async fn post_form(&self, url: &str, form: &[(String, String)]) -> PublishResult<GraphResponse>;

    /// GET with `query` parameters
    async fn get(&self, url: &str, query: &[(String, String)]) -> PublishResult<GraphResponse>;
}

/// Production transport backed by reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> PublishResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn read(response: reqwest::Response) -> PublishResult<GraphResponse> {
        let status = response.status().as_u16();
        let text = response.text().await?;
        Ok(GraphResponse::from_text(status, &text))
    }
}

#[async_trait]
impl GraphTransport for ReqwestTransport {
    async fn post_form(&self, url: &str, form: &[(String, String)]) -> PublishResult<GraphResponse> {
        let response = self.client.post(url).form(form).send().await?;
        Self::read(response).await
    }

    async fn get(&self, url: &str, query: &[(String, String)]) -> PublishResult<GraphResponse> {
        let response = self.client.get(url).query(query).send().await?;
        Self::read(response).await
    }
}

/// Credentials-bound client for one Graph node.
#[derive(Clone)]
pub struct GraphClient<T: GraphTransport> {
    transport: T,
    base_url: String,
    node_id: String,
    access_token: String,
    proof: String,
}

impl<T: GraphTransport> GraphClient<T> {
    pub fn new(
        transport: T,
        api_base: &str,
        api_version: &str,
        node_id: impl Into<String>,
        access_token: impl Into<String>,
        app_secret: &str,
    ) -> Self {
        let access_token = access_token.into();
        let base_url = if api_version.is_empty() {
            api_base.trim_end_matches('/').to_string()
        } else {
            format!("{}/{}", api_base.trim_end_matches('/'), api_version)
        };
        Self {
            transport,
            base_url,
            node_id: node_id.into(),
            proof: appsecret_proof(&access_token, app_secret),
            access_token,
        }
    }

    /// Full URL of an edge on the bound node, e.g. `/{page}/photos`
    pub fn edge_url(&self, edge: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.node_id, edge)
    }

    /// Full URL of an arbitrary node, e.g. a creation id
    pub fn node_url(&self, node: &str) -> String {
        format!("{}/{}", self.base_url, node)
    }

    fn signed(&self, params: &[(&str, String)]) -> Vec<(String, String)> {
        let mut form: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        form.push(("access_token".to_string(), self.access_token.clone()));
        form.push(("appsecret_proof".to_string(), self.proof.clone()));
        form
    }

    /// POST to an edge of the bound node
    pub async fn post(&self, edge: &str, params: &[(&str, String)]) -> PublishResult<Value> {
        let url = self.edge_url(edge);
        let response = self.transport.post_form(&url, &self.signed(params)).await?;
        debug!(url = %url, status = response.status, body = %response.body, "Graph API response");
        response.into_result()
    }

    /// GET an arbitrary node
    pub async fn get(&self, node: &str, params: &[(&str, String)]) -> PublishResult<Value> {
        let url = self.node_url(node);
        let response = self.transport.get(&url, &self.signed(params)).await?;
        debug!(url = %url, status = response.status, body = %response.body, "Graph API response");
        response.into_result()
    }
}

/// Extract the `id` field of a creation response.
pub fn response_id(body: &Value) -> PublishResult<String> {
    match body.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(PublishError::MissingField("id")),
    }
}
