use anyhow::{bail, Context, Result};
use bytes::Bytes;
use stake_execution::BlobStore;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Proof files on the local filesystem, served back under `public_base_url`.
#[derive(Clone, Debug)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("create proof dir {}", self.root.display()))
    }

    fn path_of(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty()
            || !relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
        {
            bail!("invalid object key {key}");
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, _content_type: &str, body: Bytes) -> Result<String> {
        let path = self.path_of(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        // Write under a temporary name, then rename into place
        let partial = path.with_extension("partial");
        let mut file = tokio::fs::File::create(&partial)
            .await
            .with_context(|| format!("create {}", partial.display()))?;
        file.write_all(&body).await.context("write proof")?;
        file.sync_all().await.context("sync proof")?;
        drop(file);
        tokio::fs::rename(&partial, &path)
            .await
            .with_context(|| format!("publish {}", path.display()))?;
        Ok(format!("{}/{key}", self.public_base_url))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_of(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_then_remove() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "https://cdn.example/proofs/");

        let url = store
            .put("bet-1/stake-1/proof-1.jpg", "image/jpeg", Bytes::from_static(b"jpeg"))
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.example/proofs/bet-1/stake-1/proof-1.jpg");
        let stored = dir.path().join("bet-1/stake-1/proof-1.jpg");
        assert_eq!(tokio::fs::read(&stored).await.unwrap(), b"jpeg");
        assert!(!stored.with_extension("partial").exists());

        store.remove("bet-1/stake-1/proof-1.jpg").await.unwrap();
        assert!(!stored.exists());
        // Removing twice is fine
        store.remove("bet-1/stake-1/proof-1.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "/proofs");
        for key in ["../outside.jpg", "/etc/passwd", "", "a/../../b"] {
            assert!(
                store.put(key, "image/jpeg", Bytes::new()).await.is_err(),
                "{key}"
            );
        }
    }
}
