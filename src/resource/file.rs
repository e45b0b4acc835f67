//! Local file resource

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use declarative::secret::unwrap;
use declarative::{Context, Error, MaybeSecret, Outcome, Phase, REDACTED, ResourceType};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Declared file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileProps {
    /// Where to write the file. Defaults to the physical name inside the
    /// resource type's base directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// File content; a secret content is never recorded
    pub content: MaybeSecret,
}

impl FileProps {
    pub fn new(content: impl Into<MaybeSecret>) -> Self {
        Self {
            path: None,
            content: content.into(),
        }
    }

    pub fn at(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// What was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutput {
    pub path: PathBuf,
    /// blake3 hash of the content, hex encoded. Secret content is not
    /// hashed here: the field holds the redaction placeholder instead.
    pub hash: String,
}

/// A file on the local disk, managed through the engine.
///
/// Re-verifies the file on every apply, so edits made outside the engine
/// are reverted on the next run.
#[derive(Debug, Clone)]
pub struct LocalFile {
    base_dir: PathBuf,
}

impl LocalFile {
    pub const TYPE_TAG: &'static str = "fs::File";

    /// Files without an explicit path are created in `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn target(&self, ctx: &Context<'_, FileOutput>, props: &FileProps) -> PathBuf {
        match &props.path {
            Some(path) => crate::paths::expand(&path.to_string_lossy()),
            None => self.base_dir.join(ctx.physical_name()),
        }
    }

    async fn converge(&self, path: &Path, content: &MaybeSecret) -> Result<FileOutput> {
        let plaintext = unwrap(content);
        let hash = content_hash(plaintext.as_bytes());
        if current_hash(path).await?.as_deref() == Some(hash.as_str()) {
            log::debug!("{} is up to date", path.display());
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create parent directory: {}", parent.display()))?;
            }
            fs::write(path, plaintext)
                .await
                .with_context(|| format!("Failed to write file: {}", path.display()))?;
            log::info!("Wrote {}", path.display());
        }
        let hash = match content {
            MaybeSecret::Plain(_) => hash,
            MaybeSecret::Secret(_) => REDACTED.to_string(),
        };
        Ok(FileOutput {
            path: path.to_path_buf(),
            hash,
        })
    }
}

#[async_trait]
impl ResourceType for LocalFile {
    type Props = FileProps;
    type Output = FileOutput;

    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn always_update(&self) -> bool {
        true
    }

    async fn handle(
        &self,
        ctx: &Context<'_, FileOutput>,
        _identity: &str,
        props: &FileProps,
    ) -> Result<Outcome<FileOutput>> {
        let path = self.target(ctx, props);

        match ctx.phase() {
            Phase::Delete => {
                if let Some(prior) = ctx.output() {
                    match fs::remove_file(&prior.path).await {
                        Ok(()) => log::info!("Removed {}", prior.path.display()),
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => {
                            return Err(e)
                                .with_context(|| format!("Failed to remove file: {}", prior.path.display()));
                        }
                    }
                }
                Ok(ctx.destroy())
            }
            Phase::Update => {
                if ctx.output().is_some_and(|prior| prior.path != path) {
                    return Ok(ctx.replace(false)?);
                }
                Ok(Outcome::Applied(self.converge(&path, &props.content).await?))
            }
            Phase::Create => {
                if fs::try_exists(&path).await.unwrap_or(false) && !ctx.adopt() {
                    return Err(Error::Conflict {
                        name: path.display().to_string(),
                    }
                    .into());
                }
                Ok(Outcome::Applied(self.converge(&path, &props.content).await?))
            }
        }
    }
}

fn content_hash(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

async fn current_hash(path: &Path) -> Result<Option<String>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(content_hash(&bytes))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read file: {}", path.display())),
    }
}
