//! Durable persistence: JSON snapshots plus an optional SQLite repository

pub mod repo;
pub mod snapshot;

pub use repo::JobRepo;
pub use snapshot::JobSnapshots;
