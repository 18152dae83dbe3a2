//! Background music catalog entries.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Extension used when a track's file name carries none.
pub const DEFAULT_TRACK_EXTENSION: &str = "mp3";

/// A background track stored in durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BackgroundTrack {
    pub id: String,
    pub name: String,
    /// Original upload file name, used for its extension
    #[serde(default)]
    pub file_name: String,
    /// Storage key of the audio file
    pub storage_key: String,
}

impl BackgroundTrack {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        file_name: impl Into<String>,
        storage_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            file_name: file_name.into(),
            storage_key: storage_key.into(),
        }
    }

    /// Lowercase file extension without the dot, `mp3` when absent.
    pub fn extension(&self) -> String {
        std::path::Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .map(|e| e.to_lowercase())
            .unwrap_or_else(|| DEFAULT_TRACK_EXTENSION.to_string())
    }
}
