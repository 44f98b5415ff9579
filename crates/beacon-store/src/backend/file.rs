use super::KvBackend;
use async_trait::async_trait;
use beacon_core::error::BeaconError;
use std::io::ErrorKind;
use std::path::PathBuf;
use uuid::Uuid;

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl KvBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BeaconError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BeaconError::StoreUnavailable(format!(
                "failed to read {key}: {e}"
            ))),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), BeaconError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            BeaconError::StoreUnavailable(format!(
                "failed to create {}: {e}",
                self.dir.display()
            ))
        })?;

        // Write-then-rename so readers never see a half-written collection.
        // Each write gets its own temp file; concurrent writers of a key race
        // only on the rename, and the last one wins.
        let path = self.path_for(key);
        let tmp = self
            .dir
            .join(format!(".{key}.json.{}.tmp", Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::write(&tmp, value).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(BeaconError::StoreUnavailable(format!(
                "failed to write {key}: {e}"
            )));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(BeaconError::StoreUnavailable(format!(
                "failed to commit {key}: {e}"
            )));
        }
        Ok(())
    }
}
