//! Shot artifacts produced by the generation subsystem.
//!
//! Shots are read-only to the assembly pipeline: it only checks that every
//! shot finished successfully and fetches the referenced clip.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Production status of a single shot artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShotStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ShotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShotStatus::Pending => "pending",
            ShotStatus::Processing => "processing",
            ShotStatus::Completed => "completed",
            ShotStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ShotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One generated clip in a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShotArtifact {
    /// Position of the owning scene within the chapter
    #[serde(default)]
    pub scene_index: u32,
    /// Position of the shot within its scene
    pub order_index: u32,
    /// Storage key of the produced clip, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    /// Production status
    #[serde(default)]
    pub status: ShotStatus,
}

impl ShotArtifact {
    /// Create a completed shot pointing at `remote_url`.
    pub fn completed(scene_index: u32, order_index: u32, remote_url: impl Into<String>) -> Self {
        Self {
            scene_index,
            order_index,
            remote_url: Some(remote_url.into()),
            status: ShotStatus::Completed,
        }
    }

    /// Human-readable position label, e.g. `scene 2 / shot 5`.
    pub fn label(&self) -> String {
        format!("scene {} / shot {}", self.scene_index, self.order_index)
    }

    /// True when the shot has a finished artifact that can be assembled.
    pub fn is_ready(&self) -> bool {
        self.status == ShotStatus::Completed
            && self.remote_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }
}

/// Kind of project a chapter belongs to. Only movie chapters are built from shots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Shot-based movie chapter
    #[default]
    Movie,
    /// Narrated image/sentence chapter, assembled elsewhere
    Narration,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Movie => "movie",
            ContentKind::Narration => "narration",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordered shot list for a chapter, as returned by the asset locator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChapterShots {
    pub chapter_id: String,
    #[serde(default)]
    pub content_kind: ContentKind,
    pub shots: Vec<ShotArtifact>,
}

impl ChapterShots {
    pub fn new(chapter_id: impl Into<String>, shots: Vec<ShotArtifact>) -> Self {
        let mut list = Self {
            chapter_id: chapter_id.into(),
            content_kind: ContentKind::Movie,
            shots,
        };
        list.sort();
        list
    }

    /// Sort shots into playback order: scene first, then shot.
    pub fn sort(&mut self) {
        self.shots
            .sort_by_key(|shot| (shot.scene_index, shot.order_index));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shot_readiness() {
        let ready = ShotArtifact::completed(0, 1, "shots/a.mp4");
        assert!(ready.is_ready());

        let blank = ShotArtifact {
            remote_url: Some("  ".into()),
            ..ready.clone()
        };
        assert!(!blank.is_ready());

        let processing = ShotArtifact {
            status: ShotStatus::Processing,
            ..ready
        };
        assert!(!processing.is_ready());
    }

    #[test]
    fn test_chapter_shots_are_sorted() {
        let list = ChapterShots::new(
            "ch-1",
            vec![
                ShotArtifact::completed(1, 0, "c"),
                ShotArtifact::completed(0, 2, "b"),
                ShotArtifact::completed(0, 1, "a"),
            ],
        );
        let keys: Vec<_> = list
            .shots
            .iter()
            .map(|s| s.remote_url.clone().unwrap())
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_content_kind_serde() {
        let movie: ContentKind = serde_json::from_str("\"movie\"").unwrap();
        assert_eq!(movie, ContentKind::Movie);

        let narration: ContentKind = serde_json::from_str("\"narration\"").unwrap();
        assert_eq!(narration, ContentKind::Narration);
        assert_eq!(narration.to_string(), "narration");
    }
}
