//! Configuration persistence
//!
//! The configuration file is shared ground: other tools (or the user's
//! editor) may add keys this version of the tool does not know about.
//! Overwriting the whole file on save would silently discard them, the
//! classic merge hazard when two parties write one config file. [`save_config`]
//! therefore merges the known keys into whatever JSON object is already on
//! disk instead of replacing it.

use crate::core::chain::Action;
use crate::core::intent::DEFAULT_INTENT_NAME;
use crate::core::reconcile::RuleManagement;
use crate::utils::get_data_dir;
use serde::{Deserialize, Serialize};

/// Tool configuration: active intent profile and chain rendering defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Name of the intent profile commands operate on by default
    #[serde(default = "default_intent")]
    pub active_intent: String,
    /// Configured rule-management mode for rendering and analysis
    #[serde(default)]
    pub management: RuleManagement,
    /// Default disposition when no rule matches
    #[serde(default = "default_policy")]
    pub default_policy: Action,
    /// Write an audit log entry for evaluations and analyses
    #[serde(default = "default_true")]
    pub audit_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            active_intent: default_intent(),
            management: RuleManagement::default(),
            default_policy: default_policy(),
            audit_enabled: true,
        }
    }
}

fn default_intent() -> String {
    DEFAULT_INTENT_NAME.to_string()
}

fn default_policy() -> Action {
    Action::Drop
}

fn default_true() -> bool {
    true
}

fn config_path() -> Option<std::path::PathBuf> {
    get_data_dir().map(|mut p| {
        p.push("config.json");
        p
    })
}

/// Saves the config by merging into the existing file.
///
/// 1. Reads the current file (if any) as a generic JSON object.
/// 2. Overlays our keys onto it, leaving unknown keys untouched.
/// 3. Writes to a temporary file with restrictive permissions (0o600).
/// 4. Atomically renames to the target path.
pub async fn save_config(config: &AppConfig) -> std::io::Result<()> {
    let Some(path) = config_path() else {
        return Ok(());
    };

    // Merge rather than overwrite: keys we don't own survive the save.
    let mut on_disk = match tokio::fs::read_to_string(&path).await {
        Ok(existing) => serde_json::from_str::<serde_json::Value>(&existing)
            .unwrap_or_else(|_| serde_json::json!({})),
        Err(_) => serde_json::json!({}),
    };
    if !on_disk.is_object() {
        on_disk = serde_json::json!({});
    }

    let ours = serde_json::to_value(config)?;
    if let (Some(target), Some(source)) = (on_disk.as_object_mut(), ours.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }

    let json = serde_json::to_string_pretty(&on_disk)?;

    let mut temp_path = path.clone();
    temp_path.set_extension("json.tmp");

    #[cfg(unix)]
    {
        use tokio::fs::OpenOptions;
        use tokio::io::AsyncWriteExt;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(&temp_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    #[cfg(not(unix))]
    {
        use tokio::io::AsyncWriteExt;

        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    tokio::fs::rename(temp_path, path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::StorageFull {
            std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "Disk full: cannot save configuration. Free up space and try again.",
            )
        } else {
            e
        }
    })?;

    Ok(())
}

/// Loads the config from disk, or returns defaults if not found.
pub async fn load_config() -> AppConfig {
    if let Some(path) = config_path()
        && let Ok(json) = tokio::fs::read_to_string(&path).await
        && let Ok(config) = serde_json::from_str::<AppConfig>(&json)
    {
        return config;
    }
    AppConfig::default()
}
