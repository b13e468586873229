//! Per-collection API keys
//!
//! Each completed pipeline provisions exactly one key for its target
//! collection. Keys gate the external processing endpoint.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::pipeline::types::now_ms;
use crate::storage::JobRepo;

/// A provisioned API key bound to one collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub id: Uuid,
    pub key: String,
    pub collection_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<i64>,
    pub request_count: u64,
    pub active: bool,
}

fn generate_key() -> String {
    format!("dp_{}", Uuid::new_v4().simple())
}

/// In-memory key registry with optional SQLite write-behind
pub struct ApiKeyStore {
    // keyed by the secret itself for O(1) validation
    keys: DashMap<String, ApiKey>,
    repo: Option<Arc<JobRepo>>,
}

impl ApiKeyStore {
    pub fn new(repo: Option<Arc<JobRepo>>) -> Self {
        let keys = DashMap::new();
        if let Some(repo) = &repo {
            // warm the cache so validation works across restarts
            match repo.list_collections(500) {
                Ok(collections) => {
                    for info in collections {
                        if let Ok(Some(key)) = repo.key_for_collection(&info.name) {
                            keys.insert(key.key.clone(), key);
                        }
                    }
                }
                Err(err) => warn!(error = %err, "failed to warm api key cache"),
            }
        }
        Self { keys, repo }
    }

    /// Return the existing key for a collection, creating one if absent.
    /// A provided system prompt always replaces the stored one.
    pub fn ensure_key_for_collection(
        &self,
        collection_name: &str,
        system_prompt: Option<&str>,
    ) -> ApiKey {
        if let Some(mut entry) = self
            .keys
            .iter_mut()
            .find(|e| e.value().collection_name == collection_name)
        {
            if let Some(prompt) = system_prompt {
                entry.value_mut().system_prompt = Some(prompt.to_string());
            }
            let key = entry.value().clone();
            drop(entry);
            self.persist(&key);
            return key;
        }

        let key = ApiKey {
            id: Uuid::new_v4(),
            key: generate_key(),
            collection_name: collection_name.to_string(),
            system_prompt: system_prompt.map(str::to_string),
            created_at: now_ms(),
            last_used: None,
            request_count: 0,
            active: true,
        };
        self.keys.insert(key.key.clone(), key.clone());
        self.persist(&key);
        key
    }

    /// Validate a presented key, recording the use. Returns None for
    /// unknown or deactivated keys.
    pub fn validate(&self, presented: &str) -> Option<ApiKey> {
        let mut entry = self.keys.get_mut(presented)?;
        if !entry.value().active {
            return None;
        }
        entry.value_mut().last_used = Some(now_ms());
        entry.value_mut().request_count += 1;
        let key = entry.value().clone();
        drop(entry);
        self.persist(&key);
        Some(key)
    }

    /// Look up the key provisioned for a collection
    pub fn key_for_collection(&self, collection_name: &str) -> Option<ApiKey> {
        self.keys
            .iter()
            .find(|e| e.value().collection_name == collection_name)
            .map(|e| e.value().clone())
    }

    fn persist(&self, key: &ApiKey) {
        if let Some(repo) = &self.repo {
            if let Err(err) = repo.upsert_key(key) {
                warn!(error = %err, key_id = %key.id, "failed to persist api key");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_is_idempotent_per_collection() {
        let store = ApiKeyStore::new(None);
        let first = store.ensure_key_for_collection("col_a", None);
        let second = store.ensure_key_for_collection("col_a", Some("answer briefly"));
        assert_eq!(first.key, second.key);
        assert_eq!(second.system_prompt.as_deref(), Some("answer briefly"));

        let other = store.ensure_key_for_collection("col_b", None);
        assert_ne!(first.key, other.key);
    }

    #[test]
    fn validate_tracks_usage_and_rejects_unknown() {
        let store = ApiKeyStore::new(None);
        let issued = store.ensure_key_for_collection("col_a", None);

        assert!(store.validate("dp_bogus").is_none());

        let used = store.validate(&issued.key).unwrap();
        assert_eq!(used.request_count, 1);
        assert!(used.last_used.is_some());

        let again = store.validate(&issued.key).unwrap();
        assert_eq!(again.request_count, 2);
    }

    #[test]
    fn key_format() {
        let store = ApiKeyStore::new(None);
        let key = store.ensure_key_for_collection("col_a", None);
        assert!(key.key.starts_with("dp_"));
        assert_eq!(key.key.len(), 3 + 32);
    }
}
