//! External service providers: OCR backend, embeddings, chat, vectors

pub mod embedding;
pub mod llm;
pub mod ocr;
pub mod ollama;
pub mod vector_store;

pub use embedding::EmbeddingProvider;
pub use llm::{ChatProvider, OpenAiChat};
pub use ocr::{DisabledOcr, OcrBackendClient, OcrProvider};
pub use ollama::OllamaEmbedder;
pub use vector_store::{QdrantStore, VectorPoint, VectorStoreProvider};
