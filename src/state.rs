//! File-backed state store
//!
//! One JSON file per record, laid out by scope path:
//!
//! ```text
//! <root>/<app>/<stage>/<child>/<identity>.json
//! ```
//!
//! Writes go to a sibling temp file that is renamed over the record, so a
//! crash never leaves a half-written record behind. Deleting the last
//! record of a scope prunes its empty directories; that pruning excludes
//! writes through any clone of the same store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use declarative::{Error, Scope, StateRecord, StateStore};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;

const RECORD_EXT: &str = "json";

/// Persists records as JSON files under a root directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
    /// Shared by writers, held exclusively while pruning directories
    dirs: Arc<RwLock<()>>,
}

impl FileStateStore {
    /// Create a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dirs: Arc::new(RwLock::new(())),
        }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scope_dir(&self, scope: &Scope) -> PathBuf {
        scope
            .path()
            .iter()
            .fold(self.root.clone(), |dir, part| dir.join(encode(part)))
    }

    fn record_path(&self, scope: &Scope, identity: &str) -> PathBuf {
        self.scope_dir(scope)
            .join(format!("{}.{RECORD_EXT}", encode(identity)))
    }

    async fn read_record(&self, path: &Path) -> Result<Option<StateRecord>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read state file: {}", path.display()));
            }
        };
        let record = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
        Ok(Some(record))
    }

    async fn write_record(&self, path: &Path, record: &StateRecord) -> Result<()> {
        let dir = path.parent().context("State file has no parent directory")?;
        let _dirs = self.dirs.read().await;
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;

        let content = serde_json::to_string_pretty(record).context("Failed to serialize state record")?;
        let tmp = path.with_extension(format!("{RECORD_EXT}.tmp"));
        fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to move state file into place: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    async fn remove_record(&self, scope: &Scope, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to remove state file: {}", path.display()));
            }
        }

        // Drop directories left empty, up to the store root.
        let _dirs = self.dirs.write().await;
        let mut dir = self.scope_dir(scope);
        while dir != self.root && dir.starts_with(&self.root) {
            if fs::remove_dir(&dir).await.is_err() {
                break;
            }
            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => break,
            }
        }
        Ok(())
    }

    async fn list_records(&self, scope: &Scope) -> Result<Vec<StateRecord>> {
        let dir = self.scope_dir(scope);
        let mut records = Vec::new();
        for path in entries(&dir).await? {
            if path.extension().is_some_and(|ext| ext == RECORD_EXT)
                && fs::metadata(&path).await.is_ok_and(|m| m.is_file())
                && let Some(record) = self.read_record(&path).await?
            {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn list_children(&self, scope: &Scope) -> Result<Vec<String>> {
        let dir = self.scope_dir(scope);
        let mut names = Vec::new();
        for path in entries(&dir).await? {
            if fs::metadata(&path).await.is_ok_and(|m| m.is_dir())
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
            {
                names.push(decode(name));
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Paths inside `dir`; empty when it does not exist.
async fn entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut read_dir = match fs::read_dir(dir).await {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to list state directory: {}", dir.display()));
        }
    };

    let mut paths = Vec::new();
    while let Some(entry) = read_dir
        .next_entry()
        .await
        .with_context(|| format!("Failed to list state directory: {}", dir.display()))?
    {
        paths.push(entry.path());
    }
    Ok(paths)
}

fn to_store_error(err: &anyhow::Error) -> Error {
    Error::state(format!("{err:#}"))
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, scope: &Scope, identity: &str) -> declarative::Result<Option<StateRecord>> {
        self.read_record(&self.record_path(scope, identity))
            .await
            .map_err(|e| to_store_error(&e))
    }

    async fn save(&self, scope: &Scope, identity: &str, record: &StateRecord) -> declarative::Result<()> {
        self.write_record(&self.record_path(scope, identity), record)
            .await
            .map_err(|e| to_store_error(&e))
    }

    async fn delete(&self, scope: &Scope, identity: &str) -> declarative::Result<()> {
        self.remove_record(scope, &self.record_path(scope, identity))
            .await
            .map_err(|e| to_store_error(&e))
    }

    async fn list(&self, scope: &Scope) -> declarative::Result<Vec<StateRecord>> {
        self.list_records(scope).await.map_err(|e| to_store_error(&e))
    }

    async fn child_scopes(&self, scope: &Scope) -> declarative::Result<Vec<String>> {
        self.list_children(scope).await.map_err(|e| to_store_error(&e))
    }
}

/// Make a name safe to use as a single path component.
///
/// Bytes outside `[A-Za-z0-9_-]` become `%XX`, which also keeps `.` out of
/// names so a scope can never collide with a record file.
fn encode(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn decode(name: &str) -> String {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && let Some(byte) = name
                .get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        {
            out.push(byte);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
