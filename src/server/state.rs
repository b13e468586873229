//! Shared application state

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::Result;
use crate::keys::ApiKeyStore;
use crate::pipeline::{JobStore, PipelineRunner};
use crate::providers::{
    DisabledOcr, OcrBackendClient, OllamaEmbedder, OpenAiChat, QdrantStore, VectorStoreProvider,
};
use crate::storage::{JobRepo, JobSnapshots};

/// Cloneable handle shared across request handlers
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub config: AppConfig,
    pub store: Arc<JobStore>,
    pub runner: Arc<PipelineRunner>,
    pub repo: Option<Arc<JobRepo>>,
}

impl AppState {
    /// Wire up storage, providers, and the runner from configuration
    pub fn new(config: AppConfig) -> Result<Self> {
        let repo = match &config.database.path {
            Some(path) => {
                let repo = Arc::new(JobRepo::open(path)?);
                info!(path = %path.display(), "database opened");
                Some(repo)
            }
            None => None,
        };

        let snapshots = if config.data.persist_snapshots {
            Some(JobSnapshots::open(config.data.jobs_dir())?)
        } else {
            None
        };

        let keys = Arc::new(ApiKeyStore::new(repo.clone()));
        let store = Arc::new(JobStore::new(snapshots, repo.clone(), keys));

        let ocr: Arc<dyn crate::providers::OcrProvider> = match &config.ocr.backend_url {
            Some(url) => Arc::new(OcrBackendClient::new(url.clone(), config.ocr.model.clone())),
            None => {
                warn!("no OCR backend configured, PDF and image uploads will fail");
                Arc::new(DisabledOcr)
            }
        };

        let chat: Arc<dyn crate::providers::ChatProvider> = Arc::new(OpenAiChat::new(
            config.chat.base_url.clone(),
            config.chat.api_key.clone(),
            config.chat.model.clone(),
        ));

        let embedder: Arc<dyn crate::providers::EmbeddingProvider> = Arc::new(
            OllamaEmbedder::new(
                config.embeddings.ollama_url.clone(),
                config.embeddings.default_model.clone(),
            ),
        );

        let vectors: Option<Arc<dyn VectorStoreProvider>> = match &config.vector_db.url {
            Some(url) => Some(Arc::new(QdrantStore::new(
                url.clone(),
                config.vector_db.api_key.clone(),
            ))),
            None => {
                warn!("no vector database configured, store stage runs dry");
                None
            }
        };

        let runner = Arc::new(PipelineRunner::new(
            Arc::clone(&store),
            ocr,
            chat,
            embedder,
            vectors,
        ));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                runner,
                repo,
            }),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.inner.store
    }

    pub fn runner(&self) -> &Arc<PipelineRunner> {
        &self.inner.runner
    }

    pub fn repo(&self) -> Option<&Arc<JobRepo>> {
        self.inner.repo.as_ref()
    }
}
