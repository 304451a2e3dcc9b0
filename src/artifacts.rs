//! Byte storage for capture and diff images.
//!
//! Records never hold filesystem paths, only locators: relative, slash
//! separated keys that the store resolves against its own root.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::error::{Result, SentinelError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Key is `<target>/<capture>`.
    Capture,
    /// Key is `<run>/<target>`.
    Diff,
}

impl ArtifactKind {
    fn prefix(&self) -> &'static str {
        match self {
            ArtifactKind::Capture => "captures",
            ArtifactKind::Diff => "diffs",
        }
    }

    pub fn locator(&self, owner: &str, name: &str) -> String {
        format!("{}/{}/{}.png", self.prefix(), owner, name)
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` and return the locator to record.
    async fn put(&self, kind: ArtifactKind, owner: &str, name: &str, bytes: &[u8]) -> Result<String>;

    async fn get(&self, locator: &str) -> Result<Vec<u8>>;

    /// Removing a missing artifact is not an error.
    async fn remove(&self, locator: &str) -> Result<()>;
}

pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, locator: &str) -> Result<PathBuf> {
        let relative = Path::new(locator);
        let safe = !locator.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(SentinelError::Configuration(format!(
                "invalid artifact locator '{}'",
                locator
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, kind: ArtifactKind, owner: &str, name: &str, bytes: &[u8]) -> Result<String> {
        let locator = kind.locator(owner, name);
        let path = self.resolve(&locator)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!("Stored {} bytes at {}", bytes.len(), locator);
        Ok(locator)
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>> {
        let path = self.resolve(locator)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SentinelError::NotFound(format!("artifact {}", locator)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, locator: &str) -> Result<()> {
        let path = self.resolve(locator)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
