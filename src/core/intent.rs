//! Intent profile management
//!
//! Intent profiles are standalone JSON files containing an [`Intent`]
//! (administrator rules, default policy, declared workloads). They are stored
//! in the application's data directory under `intents/`.

use crate::core::chain::MAX_RULES;
use crate::core::reconcile::Intent;
use crate::utils::get_data_dir;
use std::path::PathBuf;

/// The canonical name for the initial/fallback intent profile.
/// This profile is protected from deletion and renaming so the tool always
/// has at least one valid intent to load.
pub const DEFAULT_INTENT_NAME: &str = "default";

/// Error type for intent profile operations
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("Invalid intent name: {0}")]
    InvalidName(String),

    #[error("Intent not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Data directory not available")]
    DataDirUnavailable,
}

/// Validates an intent profile name for filesystem safety.
///
/// Constraints:
/// - Alphanumeric, underscores, and hyphens only: prevents shell injection
///   and cross-platform filename issues.
/// - Max 64 chars: keeps filenames within system limits.
/// - Rejects "." and "..": path traversal protection.
pub fn validate_intent_name(name: &str) -> Result<(), IntentError> {
    if name.is_empty() {
        return Err(IntentError::InvalidName("Name cannot be empty".into()));
    }

    if name.len() > 64 {
        return Err(IntentError::InvalidName(
            "Name too long (max 64 chars)".into(),
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(IntentError::InvalidName(
            "Name contains invalid characters (use only a-z, 0-9, _, -)".into(),
        ));
    }

    // Prevent path traversal
    if name == "." || name == ".." {
        return Err(IntentError::InvalidName("Invalid name".into()));
    }

    Ok(())
}

/// Gets the directory where intent profiles are stored.
/// Creates the directory if it doesn't exist so subsequent file operations
/// succeed.
pub async fn get_intents_dir() -> Result<PathBuf, IntentError> {
    let mut path = get_data_dir().ok_or(IntentError::DataDirUnavailable)?;
    path.push("intents");

    if !tokio::fs::try_exists(&path).await? {
        tokio::fs::create_dir_all(&path).await?;
    }

    Ok(path)
}

/// Returns the path to a specific intent file.
/// Validates the name first to prevent directory traversal before file access.
pub async fn get_intent_path(name: &str) -> Result<PathBuf, IntentError> {
    validate_intent_name(name)?;
    let mut path = get_intents_dir().await?;
    path.push(format!("{name}.json"));
    Ok(path)
}

/// Lists all available intent profile names.
pub async fn list_intents() -> Result<Vec<String>, IntentError> {
    let dir = get_intents_dir().await?;
    let mut intents = Vec::new();

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();

        if path.is_file()
            && path.extension().and_then(|s| s.to_str()) == Some("json")
            && let Some(name) = path.file_stem().and_then(|s| s.to_str())
        {
            intents.push(name.to_string());
        }
    }

    intents.sort();
    Ok(intents)
}

/// Loads an intent profile by name.
///
/// Verifies the sha256 sidecar checksum if present (warns but does not fail
/// for manually edited profiles) and enforces [`MAX_RULES`].
pub async fn load_intent(name: &str) -> Result<Intent, IntentError> {
    let path = get_intent_path(name).await?;

    if !tokio::fs::try_exists(&path).await? {
        return Err(IntentError::NotFound(name.to_string()));
    }

    let json = tokio::fs::read_to_string(&path).await?;

    let mut checksum_path = path.clone();
    checksum_path.set_extension("json.sha256");

    if let Ok(expected_checksum) = tokio::fs::read_to_string(&checksum_path).await {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        let actual_checksum = format!("{:x}", hasher.finalize());

        if expected_checksum.trim() != actual_checksum {
            tracing::warn!(
                "Intent '{}' checksum mismatch (expected: {}, got: {})",
                name,
                expected_checksum.trim(),
                actual_checksum
            );
            // Don't fail - just warn (intent might be manually edited)
        }
    }

    let intent: Intent = serde_json::from_str(&json)?;

    // Validate rule count to prevent memory exhaustion
    if intent.rules.len() > MAX_RULES {
        return Err(IntentError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "Intent '{}' contains {} rules (max: {})",
                name,
                intent.rules.len(),
                MAX_RULES
            ),
        )));
    }

    Ok(intent)
}

/// Saves an intent profile atomically.
/// Uses a temporary file + rename pattern to prevent data corruption if the
/// process crashes or the disk fills up during write.
pub async fn save_intent(name: &str, intent: &Intent) -> Result<(), IntentError> {
    let path = get_intent_path(name).await?;
    let json = serde_json::to_string_pretty(intent)?;

    let mut temp_path = path.clone();
    temp_path.set_extension("json.tmp");

    #[cfg(unix)]
    {
        use tokio::fs::OpenOptions;
        use tokio::io::AsyncWriteExt;

        // Restrictive permissions (0o600) from creation; the file describes
        // the host's filtering posture
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
        tokio::fs::write(&temp_path, &json).await?;
    }

    tokio::fs::rename(temp_path, &path).await?;

    // Calculate and save checksum for integrity verification
    let checksum = {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    };

    let mut checksum_path = path.clone();
    checksum_path.set_extension("json.sha256");
    tokio::fs::write(checksum_path, checksum).await?;

    Ok(())
}

/// Deletes an intent profile.
/// Protects the default profile so the tool never enters a "no intent" state.
pub async fn delete_intent(name: &str) -> Result<(), IntentError> {
    if name == DEFAULT_INTENT_NAME {
        return Err(IntentError::InvalidName(
            "Cannot delete default intent".into(),
        ));
    }

    let path = get_intent_path(name).await?;
    if tokio::fs::try_exists(&path).await? {
        tokio::fs::remove_file(&path).await?;
        let mut checksum_path = path;
        checksum_path.set_extension("json.sha256");
        let _ = tokio::fs::remove_file(checksum_path).await;
    }
    Ok(())
}

/// Renames an intent profile.
/// Ensures the new name is valid and doesn't collide with an existing
/// profile. The default profile cannot be renamed.
pub async fn rename_intent(old_name: &str, new_name: &str) -> Result<(), IntentError> {
    validate_intent_name(new_name)?;

    if old_name == DEFAULT_INTENT_NAME {
        return Err(IntentError::InvalidName(
            "Cannot rename default intent".into(),
        ));
    }

    let old_path = get_intent_path(old_name).await?;
    let new_path = get_intent_path(new_name).await?;

    if !tokio::fs::try_exists(&old_path).await? {
        return Err(IntentError::NotFound(old_name.to_string()));
    }

    if tokio::fs::try_exists(&new_path).await? {
        return Err(IntentError::InvalidName(
            "Intent with new name already exists".into(),
        ));
    }

    tokio::fs::rename(old_path, new_path).await?;
    Ok(())
}
