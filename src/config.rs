//! Configuration for the pipeline server

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main server configuration
///
/// Loaded from an optional TOML file, then overridden by environment
/// variables for the handful of deploy-time settings (backend URLs, keys).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Data directory / snapshot configuration
    #[serde(default)]
    pub data: DataConfig,
    /// Optional SQLite durable store
    #[serde(default)]
    pub database: DatabaseConfig,
    /// OCR backend configuration
    #[serde(default)]
    pub ocr: OcrConfig,
    /// Embedding backend configuration
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    /// Chat LLM configuration (entity extraction)
    #[serde(default)]
    pub chat: ChatConfig,
    /// Vector database configuration
    #[serde(default)]
    pub vector_db: VectorDbConfig,
    /// Default chunking parameters applied when a submission omits them
    #[serde(default)]
    pub chunking: ChunkingDefaults,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Maximum upload size in bytes
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_upload_size: 100 * 1024 * 1024,
        }
    }
}

/// Data directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root directory for job snapshots
    pub dir: PathBuf,
    /// Write per-job JSON snapshots (disable for purely in-memory runs)
    pub persist_snapshots: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".data"),
            persist_snapshots: true,
        }
    }
}

impl DataConfig {
    /// Directory holding per-job snapshot files
    pub fn jobs_dir(&self) -> PathBuf {
        self.dir.join("jobs")
    }
}

/// Optional SQLite durable store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file; None disables the relational store
    pub path: Option<PathBuf>,
}

/// OCR backend configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Base URL of the OCR backend; None degrades PDF/image submissions
    /// to an OCR stage error
    pub backend_url: Option<String>,
    /// Model name passed to the backend
    #[serde(default = "default_ocr_model")]
    pub model: String,
}

fn default_ocr_model() -> String {
    "typhoon-ocr".to_string()
}

/// Embedding backend configuration (Ollama)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// Ollama base URL
    pub ollama_url: String,
    /// Default embedding model when a submission omits one
    pub default_model: String,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            default_model: "bge-m3".to_string(),
        }
    }
}

/// Chat LLM configuration for entity extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// OpenAI-compatible base URL
    pub base_url: String,
    /// API key; None makes extraction fail per-chunk (non-fatal)
    pub api_key: Option<String>,
    /// Model name
    pub model: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4.1-mini".to_string(),
        }
    }
}

/// Vector database configuration (Qdrant)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorDbConfig {
    /// Qdrant base URL; None degrades the persist stage to a dry-run
    pub url: Option<String>,
    /// Optional Qdrant API key
    pub api_key: Option<String>,
}

/// Default chunking parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingDefaults {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap carried between adjacent chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingDefaults {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .map_err(|e| Error::Config(format!("Failed to read {}: {}", p.display(), e)))?;
                toml::from_str(&raw)
                    .map_err(|e| Error::Config(format!("Invalid config {}: {}", p.display(), e)))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Environment overrides for deploy-time settings
    fn apply_env(&mut self) {
        if let Some(url) = env_var("OCR_BACKEND_URL") {
            self.ocr.backend_url = Some(url.trim_end_matches('/').to_string());
        }
        if let Some(url) = env_var("OLLAMA_URL") {
            self.embeddings.ollama_url = url.trim_end_matches('/').to_string();
        }
        if let Some(key) = env_var("OPENAI_API_KEY") {
            self.chat.api_key = Some(key);
        }
        if let Some(model) = env_var("OPENAI_MODEL") {
            self.chat.model = model;
        }
        if let Some(url) = env_var("QDRANT_URL") {
            self.vector_db.url = Some(url.trim_end_matches('/').to_string());
        }
        if let Some(key) = env_var("QDRANT_API_KEY") {
            self.vector_db.api_key = Some(key);
        }
        if let Some(dir) = env_var("DOCPIPE_DATA_DIR") {
            self.data.dir = PathBuf::from(dir);
        }
        if let Some(path) = env_var("DOCPIPE_DB_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert!(config.vector_db.url.is_none());
        assert!(config.database.path.is_none());
        assert!(config.data.persist_snapshots);
    }

    #[test]
    fn parses_partial_toml() {
        let raw = r#"
            [server]
            host = "127.0.0.1"
            port = 9000
            max_upload_size = 1048576

            [vector_db]
            url = "http://localhost:6333"
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.vector_db.url.as_deref(), Some("http://localhost:6333"));
        // Unspecified sections fall back to defaults.
        assert_eq!(config.embeddings.default_model, "bge-m3");
    }
}
