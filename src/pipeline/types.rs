//! Job, stage, and collection data model
//!
//! All wire types serialize as camelCase JSON; this is the contract spoken
//! by stream consumers and the HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::chunking::ChunkingStrategy;
use crate::error::{Error, Result};

/// Media types accepted at submission (plus extension fallbacks and images)
pub const SUPPORTED_MEDIA_TYPES: [&str; 3] = ["application/pdf", "text/csv", "text/plain"];

/// Maximum accepted file size (50 MB)
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// The six fixed pipeline stages, in execution order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Upload,
    Ocr,
    Chunk,
    Extract,
    Embed,
    Store,
}

impl StageName {
    /// All stages in execution order
    pub const ALL: [StageName; 6] = [
        StageName::Upload,
        StageName::Ocr,
        StageName::Chunk,
        StageName::Extract,
        StageName::Embed,
        StageName::Store,
    ];

    /// Human-readable label shown in stage panels
    pub fn label(&self) -> &'static str {
        match self {
            StageName::Upload => "Upload & Validate",
            StageName::Ocr => "OCR / Parse",
            StageName::Chunk => "Chunking",
            StageName::Extract => "Entity Extract",
            StageName::Embed => "Embedding",
            StageName::Store => "Vector Store",
        }
    }
}

/// Stage lifecycle status
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Idle,
    Running,
    Success,
    Error,
    Skipped,
}

/// Log severity
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    Warn,
    Error,
}

/// One append-only stage log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageLog {
    /// Unix milliseconds
    pub timestamp: i64,
    pub message: String,
    pub level: LogLevel,
}

/// One of the six stage records of a job
///
/// Logs are append-only for the lifetime of the job: a reset between files
/// clears status/timestamps/output/error but never the logs, so the panel
/// shows cumulative history across files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStage {
    pub name: StageName,
    pub label: String,
    pub status: StageStatus,
    pub logs: Vec<StageLog>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl PipelineStage {
    pub fn new(name: StageName) -> Self {
        Self {
            name,
            label: name.label().to_string(),
            status: StageStatus::Idle,
            logs: Vec::new(),
            started_at: None,
            completed_at: None,
            output: None,
            error: None,
        }
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal statuses allow no further stage execution
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Descriptor of one submitted input file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub media_type: String,
    pub size: u64,
}

/// Embedding backend choice (locked to Ollama)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    #[default]
    Ollama,
}

/// Embedding configuration snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    #[serde(default = "default_embedding_model")]
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Ollama,
            model: default_embedding_model(),
        }
    }
}

fn default_embedding_model() -> String {
    "bge-m3".to_string()
}

/// Per-job configuration snapshot, validated once at submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking_strategy: ChunkingStrategy,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default)]
    pub entity_types: Vec<String>,
    #[serde(default)]
    pub collection_name: String,
    #[serde(default)]
    pub system_prompt: String,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            chunking_strategy: ChunkingStrategy::default(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            entity_types: Vec::new(),
            collection_name: String::new(),
            system_prompt: String::new(),
        }
    }
}

impl PipelineConfig {
    /// Single validation pass before job creation; fills in the collection
    /// name when blank and drops empty entity-type labels.
    pub fn normalize(&mut self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::validation("chunkSize must be greater than 0"));
        }
        if self.embedding.model.trim().is_empty() {
            self.embedding.model = default_embedding_model();
        }
        self.entity_types = self
            .entity_types
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        self.collection_name = self.collection_name.trim().to_string();
        if self.collection_name.is_empty() {
            self.collection_name = random_collection_name();
        }
        Ok(())
    }
}

/// Collection name generated when a submission omits one
pub fn random_collection_name() -> String {
    format!("col_{}", Uuid::new_v4().simple())
}

/// One orchestrated run processing one or more files into a collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub files: Vec<FileInfo>,
    pub config: PipelineConfig,
    pub stages: Vec<PipelineStage>,
    /// Unix milliseconds
    pub created_at: i64,
    /// Set if and only if the status is terminal
    pub completed_at: Option<i64>,
    pub error: Option<String>,
    /// Index of the file currently being processed
    pub current_file_index: usize,
}

impl PipelineJob {
    pub fn stage(&self, name: StageName) -> Option<&PipelineStage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub(crate) fn stage_mut(&mut self, name: StageName) -> Option<&mut PipelineStage> {
        self.stages.iter_mut().find(|s| s.name == name)
    }
}

/// Metadata for the named destination of embedded chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionInfo {
    pub name: String,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub dimensions: usize,
    pub document_count: u64,
    pub vector_count: u64,
    pub created_at: i64,
    pub last_updated: i64,
    pub pipeline_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity_types: Vec<String>,
}

/// Event pushed over the live progress stream
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    JobUpdate { job: PipelineJob },
    Error { error: String },
}

/// Current unix-millisecond timestamp
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
