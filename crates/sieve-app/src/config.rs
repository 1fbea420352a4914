//! Application settings persisted in the database.

use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sieve_export::{ExportOptions, DEFAULT_OPPORTUNISTIC_DECODE_LIMIT};
use sieve_storage::{BodyStore, Database, Result};

/// Config key holding the serialized [`AppConfig`].
pub const CONFIG_KEY: &str = "app_config";

/// Settings shared by every command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where exports are written.
    pub output_dir: PathBuf,
    /// Where captured bodies live.
    pub bodies_dir: PathBuf,
    /// Creator name in HAR documents.
    pub product_name: String,
    /// Largest body of unknown encoding sent through the codec cascade.
    pub opportunistic_decode_limit: usize,
    /// Policy used when a command does not name one.
    pub current_policy_id: Option<i64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            output_dir: data_dir.join("exports"),
            bodies_dir: data_dir.join("bodies"),
            product_name: "Sieve".to_string(),
            opportunistic_decode_limit: DEFAULT_OPPORTUNISTIC_DECODE_LIMIT,
            current_policy_id: None,
        }
    }
}

impl AppConfig {
    /// Loads the stored config, or the defaults if none was saved.
    pub fn load(db: &Database) -> Result<Self> {
        db.get_config_or_default(CONFIG_KEY, Self::default())
    }

    pub fn save(&self, db: &Database) -> Result<()> {
        db.set_config_typed(CONFIG_KEY, self)
    }

    pub fn to_export_options(&self) -> ExportOptions {
        ExportOptions {
            output_dir: self.output_dir.clone(),
            product_name: self.product_name.clone(),
            opportunistic_decode_limit: self.opportunistic_decode_limit,
        }
    }

    pub fn body_store(&self) -> BodyStore {
        BodyStore::new(&self.bodies_dir)
    }
}

/// Application data directory, or the working directory if none is known.
pub fn data_dir() -> PathBuf {
    ProjectDirs::from("com", "sieve", "sieve")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}
