//! Local storage for chat exports
//!
//! Writes exported chats to the user's Documents folder,
//! or a custom location if configured.

use crate::transcript::ExportRecord;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Get the default exports directory
pub(crate) fn default_exports_dir() -> Option<PathBuf> {
    dirs::document_dir().map(|d| d.join("AskStream").join("exports"))
}

/// Ensure the exports directory exists
fn ensure_dir(dir: &Path) -> Result<(), StorageError> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| StorageError::CreateDirectory {
            path: dir.to_path_buf(),
            source: e,
        })?;
        info!("Created exports directory: {:?}", dir);
    }
    Ok(())
}

/// Save exported records as pretty-printed JSON
///
/// `dir` overrides the default location. Returns the path to the saved file.
pub(crate) fn save_export(
    records: &[ExportRecord],
    dir: Option<&Path>,
) -> Result<PathBuf, StorageError> {
    if records.is_empty() {
        return Err(StorageError::EmptyTranscript);
    }

    let dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => default_exports_dir().ok_or(StorageError::NoDocumentsDir)?,
    };
    ensure_dir(&dir)?;

    let filename = format!("chat_{}.json", Utc::now().timestamp_millis());
    let filepath = dir.join(&filename);

    let json = serde_json::to_string_pretty(records)?;
    fs::write(&filepath, json).map_err(|e| StorageError::WriteFile {
        path: filepath.clone(),
        source: e,
    })?;

    info!("Saved chat export to: {:?}", filepath);
    Ok(filepath)
}

/// Storage errors with contextual information
#[derive(Debug, thiserror::Error)]
pub(crate) enum StorageError {
    #[error("Could not find Documents directory")]
    NoDocumentsDir,

    #[error("Nothing to export")]
    EmptyTranscript,

    #[error("Failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
