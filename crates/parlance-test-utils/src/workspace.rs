//! Temporary on-disk workspaces.
//!
//! A [`TestWorkspace`] owns a temp directory holding a config file and a data
//! directory, deleted when the value is dropped (even on panic).

use std::path::PathBuf;

use parlance_config::AppConfig;
use parlance_core::conversation::ConversationStore;
use parlance_core::store::FileStore;
use tempfile::TempDir;

pub struct TestWorkspace {
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    _temp_dir: TempDir,
}

impl TestWorkspace {
    /// Create a workspace whose config file contains `toml_content` followed
    /// by a `[storage]` table pointing at the workspace's data directory.
    pub async fn with_toml(toml_content: &str) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let data_dir = temp_dir.path().join("data");
        let config_path = temp_dir.path().join("parlance.toml");

        let workspace = Self {
            config_path,
            data_dir,
            _temp_dir: temp_dir,
        };
        workspace.write_config(toml_content).await;
        workspace
    }

    pub async fn empty() -> Self {
        Self::with_toml("").await
    }

    /// Overwrite the config file, keeping the storage table.
    pub async fn write_config(&self, toml_content: &str) {
        let content = format!(
            "{toml_content}\n[storage]\ndata_dir = {:?}\n",
            self.data_dir.display().to_string()
        );
        tokio::fs::write(&self.config_path, content)
            .await
            .expect("failed to write test config");
    }

    pub async fn load_config(&self) -> AppConfig {
        AppConfig::load(&self.config_path)
            .await
            .expect("failed to parse test config")
    }

    /// A conversation store over the workspace's data directory.
    pub fn conversations(&self) -> ConversationStore {
        ConversationStore::new(FileStore::new(&self.data_dir))
    }
}
