//! Persisted state records and the store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::scope::Scope;
use crate::secret::SecretDigest;

/// The persisted form of a resource instance.
///
/// A record exists if and only if the remote object is believed to exist.
/// Every secret inside `last_inputs` and `last_output` is stored as the
/// redaction placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub identity: String,
    pub type_tag: String,
    pub last_inputs: Value,
    pub last_output: Value,
    /// Same-scope identities this resource waited on when last applied
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Outputs of superseded objects still awaiting deletion
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replaced: Vec<Value>,
    /// Keyed hashes of the secrets in the last inputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<SecretDigest>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read/write access to persisted records, keyed by `(scope, identity)`.
///
/// Implementations must give read-your-writes consistency within one
/// process and atomic writes per key. The engine never writes one key
/// concurrently.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the record for an identity, if any.
    async fn load(&self, scope: &Scope, identity: &str) -> Result<Option<StateRecord>>;

    /// Create or overwrite the record for an identity.
    async fn save(&self, scope: &Scope, identity: &str, record: &StateRecord) -> Result<()>;

    /// Remove the record for an identity. Missing records are not an error.
    async fn delete(&self, scope: &Scope, identity: &str) -> Result<()>;

    /// Every record stored directly under a scope, oldest first.
    async fn list(&self, scope: &Scope) -> Result<Vec<StateRecord>>;

    /// Names of child scopes that hold records.
    async fn child_scopes(&self, _scope: &Scope) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// A process-local store, used by tests and short-lived runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: RwLock<HashMap<String, BTreeMap<String, StateRecord>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all scopes
    pub async fn len(&self) -> usize {
        self.records.read().await.values().map(BTreeMap::len).sum()
    }

    /// Whether the store holds no records
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Serialized form of every record, as it would be persisted
    pub async fn dump_json(&self) -> Result<String> {
        let records = self.records.read().await;
        let sorted: BTreeMap<_, _> = records.iter().collect();
        Ok(serde_json::to_string_pretty(&sorted)?)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, scope: &Scope, identity: &str) -> Result<Option<StateRecord>> {
        Ok(self
            .records
            .read()
            .await
            .get(&scope.key())
            .and_then(|records| records.get(identity))
            .cloned())
    }

    async fn save(&self, scope: &Scope, identity: &str, record: &StateRecord) -> Result<()> {
        self.records
            .write()
            .await
            .entry(scope.key())
            .or_default()
            .insert(identity.to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, scope: &Scope, identity: &str) -> Result<()> {
        let mut records = self.records.write().await;
        let key = scope.key();
        if let Some(scoped) = records.get_mut(&key) {
            scoped.remove(identity);
            if scoped.is_empty() {
                records.remove(&key);
            }
        }
        Ok(())
    }

    async fn list(&self, scope: &Scope) -> Result<Vec<StateRecord>> {
        let mut list: Vec<StateRecord> = self
            .records
            .read()
            .await
            .get(&scope.key())
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default();
        list.sort_by_key(|r| r.created_at);
        Ok(list)
    }

    async fn child_scopes(&self, scope: &Scope) -> Result<Vec<String>> {
        let prefix = format!("{}/", scope.key());
        let mut names: Vec<String> = self
            .records
            .read()
            .await
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}
