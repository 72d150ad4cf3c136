use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{CheckError, Result};

/// Key the API credential is stored under
pub const API_KEY_KEY: &str = "flash_check_api_key";

/// Small persistent key-value store for the API credential
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Shared credential store type
pub type SharedCredentialStore = Arc<dyn CredentialStore>;

/// JSON file store, rewritten atomically on every `set`
pub struct FileCredentialStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl FileCredentialStore {
    /// Load from a JSON file; a missing file is an empty store
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| CheckError::Internal {
                message: format!("failed to parse '{}': {}", path.display(), e),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(CheckError::StoreLoad {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    async fn save(&self, content: String) -> Result<()> {
        let save_err = |source| CheckError::StoreSave {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(save_err)?;
            }
        }

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &content)
            .await
            .map_err(save_err)?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(save_err)?;

        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let content = {
            let mut values = self.values.write();
            values.insert(key.to_string(), value.to_string());
            serde_json::to_string_pretty(&*values)?
        };
        self.save(content).await?;
        debug!("Stored '{}' in {}", key, self.path.display());
        Ok(())
    }
}

/// In-memory store, nothing survives the process
#[derive(Default)]
pub struct MemoryCredentialStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}
