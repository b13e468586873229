//! Qdrant vector store client (REST)

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

/// One vector with its payload, ready for upsert
#[derive(Debug, Clone, Serialize)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: Value,
}

#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    /// Create the collection if it does not exist
    async fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Upsert a batch of points into the collection
    async fn upsert(&self, name: &str, points: &[VectorPoint]) -> Result<()>;
}

pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }
}

#[async_trait]
impl VectorStoreProvider for QdrantStore {
    async fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let existing = self
            .request(reqwest::Method::GET, &format!("/collections/{name}"))
            .send()
            .await?;
        if existing.status().is_success() {
            return Ok(());
        }
        if existing.status() != reqwest::StatusCode::NOT_FOUND {
            let status = existing.status();
            let body = existing.text().await.unwrap_or_default();
            return Err(Error::vector_db(format!(
                "collection lookup returned {status}: {body}"
            )));
        }

        debug!(collection = name, dimensions, "creating collection");
        let created = self
            .request(reqwest::Method::PUT, &format!("/collections/{name}"))
            .json(&json!({
                "vectors": { "size": dimensions, "distance": "Cosine" }
            }))
            .send()
            .await?;
        if !created.status().is_success() {
            let status = created.status();
            let body = created.text().await.unwrap_or_default();
            return Err(Error::vector_db(format!(
                "collection create returned {status}: {body}"
            )));
        }
        Ok(())
    }

    async fn upsert(&self, name: &str, points: &[VectorPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/collections/{name}/points?wait=true"),
            )
            .json(&json!({ "points": points }))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::vector_db(format!(
                "point upsert returned {status}: {body}"
            )));
        }
        Ok(())
    }
}
