//! Publish tasks: sending a finished assembly to the video platform.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use crate::assembly::{AssemblyStatus, AssemblyTask};
use crate::error::{ModelError, ModelResult};
use crate::id::TaskId;

/// Default platform category id.
pub const DEFAULT_CATEGORY_ID: u32 = 171;
/// Default upload line.
pub const DEFAULT_UPLOAD_LINE: &str = "bda2";
/// Default number of concurrent upload chunks.
pub const DEFAULT_UPLOAD_LIMIT: u8 = 3;

/// Publish status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    #[default]
    Pending,
    Uploading,
    Published,
    Failed,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Pending => "pending",
            PublishStatus::Uploading => "uploading",
            PublishStatus::Published => "published",
            PublishStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PublishStatus::Published | PublishStatus::Failed)
    }

    pub fn can_transition_to(&self, next: PublishStatus) -> bool {
        use PublishStatus::*;
        matches!(
            (self, next),
            (Pending, Uploading)
                | (Uploading, Published)
                | (Pending, Failed)
                | (Uploading, Failed)
                | (Failed, Pending)
        )
    }
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Copyright declaration sent with the upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Copyright {
    #[default]
    Original,
    Reproduced,
}

impl Copyright {
    /// Numeric code understood by the uploader.
    pub fn code(&self) -> u8 {
        match self {
            Copyright::Original => 1,
            Copyright::Reproduced => 2,
        }
    }

    pub fn from_code(code: u8) -> ModelResult<Self> {
        match code {
            1 => Ok(Copyright::Original),
            2 => Ok(Copyright::Reproduced),
            other => Err(ModelError::unknown_variant("copyright", other.to_string())),
        }
    }
}

/// Everything the uploader needs besides the video file and credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct PublishMetadata {
    #[validate(length(min = 1, max = 80))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub description: String,
    /// Platform category id
    #[serde(default = "default_category")]
    pub category_id: u32,
    #[serde(default)]
    #[validate(length(max = 12))]
    pub tags: Vec<String>,
    #[serde(default)]
    pub copyright: Copyright,
    /// Original source, for reproduced content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 200))]
    pub source: Option<String>,
    /// Companion post text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 233))]
    pub dynamic: Option<String>,
    /// Storage key of the cover image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_key: Option<String>,
    /// Scheduled publish time (unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<i64>,
    #[serde(default = "default_line")]
    pub upload_line: String,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 10))]
    pub upload_limit: u8,
}

fn default_category() -> u32 {
    DEFAULT_CATEGORY_ID
}
fn default_line() -> String {
    DEFAULT_UPLOAD_LINE.to_string()
}
fn default_limit() -> u8 {
    DEFAULT_UPLOAD_LIMIT
}

impl PublishMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            category_id: DEFAULT_CATEGORY_ID,
            tags: Vec::new(),
            copyright: Copyright::Original,
            source: None,
            dynamic: None,
            cover_key: None,
            scheduled_at: None,
            upload_line: DEFAULT_UPLOAD_LINE.to_string(),
            upload_limit: DEFAULT_UPLOAD_LIMIT,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cover(mut self, key: impl Into<String>) -> Self {
        self.cover_key = Some(key.into());
        self
    }

    /// Tags as the comma-separated list the uploader expects.
    pub fn joined_tags(&self) -> Option<String> {
        let tags: Vec<&str> = self
            .tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if tags.is_empty() {
            None
        } else {
            Some(tags.join(","))
        }
    }

    /// Run field validation, flattening errors into one message.
    pub fn check(&self) -> ModelResult<()> {
        self.validate()
            .map_err(|e| ModelError::InvalidMetadata(e.to_string()))
    }
}

/// A request to upload one completed assembly.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PublishTask {
    pub id: TaskId,
    pub user_id: String,
    pub assembly_task_id: TaskId,
    /// Explicit account; when absent the user's default account is used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub metadata: PublishMetadata,
    #[serde(default)]
    pub status: PublishStatus,
    #[serde(default)]
    pub progress: u8,
    /// Platform video id (BV form)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_video_id: Option<String>,
    /// Platform numeric id (av form, digits only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_numeric_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl PublishTask {
    /// Create a publish task for a finished assembly.
    ///
    /// The assembly must be completed and carry a result key, and the
    /// metadata must pass validation.
    pub fn for_assembly(
        assembly: &AssemblyTask,
        metadata: PublishMetadata,
        account_id: Option<String>,
    ) -> ModelResult<Self> {
        if assembly.status != AssemblyStatus::Completed {
            return Err(ModelError::assembly_not_ready(
                assembly.id.as_str(),
                format!("status is {}", assembly.status),
            ));
        }
        if assembly.result_key.is_none() {
            return Err(ModelError::assembly_not_ready(
                assembly.id.as_str(),
                "no result video",
            ));
        }
        metadata.check()?;

        let now = Utc::now();
        Ok(Self {
            id: TaskId::new(),
            user_id: assembly.user_id.clone(),
            assembly_task_id: assembly.id.clone(),
            account_id,
            metadata,
            status: PublishStatus::Pending,
            progress: 0,
            platform_video_id: None,
            platform_numeric_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            published_at: None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply an update, enforcing the transition table.
    pub fn apply(&mut self, update: &PublishUpdate) -> ModelResult<()> {
        if let Some(next) = update.status {
            if next != self.status {
                if !self.status.can_transition_to(next) {
                    return Err(ModelError::illegal_transition("publish", self.status, next));
                }
                self.status = next;

                if next == PublishStatus::Pending {
                    self.progress = 0;
                    self.error_message = None;
                    self.platform_video_id = None;
                    self.platform_numeric_id = None;
                    self.published_at = None;
                    self.updated_at = Utc::now();
                    return Ok(());
                }
            }
        }

        if let Some(progress) = update.progress {
            self.progress = self.progress.max(progress.min(100));
        }
        if let Some(id) = &update.platform_video_id {
            self.platform_video_id = Some(id.clone());
        }
        if let Some(id) = &update.platform_numeric_id {
            self.platform_numeric_id = Some(id.clone());
        }
        if let Some(message) = &update.error_message {
            self.error_message = Some(message.clone());
        }
        if self.status == PublishStatus::Published {
            self.progress = 100;
            self.published_at.get_or_insert_with(Utc::now);
        }

        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Partial update applied atomically by a publish repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PublishStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_numeric_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PublishUpdate {
    pub fn uploading() -> Self {
        Self {
            status: Some(PublishStatus::Uploading),
            progress: Some(10),
            ..Self::default()
        }
    }

    pub fn published(video_id: Option<String>, numeric_id: Option<String>) -> Self {
        Self {
            status: Some(PublishStatus::Published),
            progress: Some(100),
            platform_video_id: video_id,
            platform_numeric_id: numeric_id,
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(PublishStatus::Failed),
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn reset() -> Self {
        Self {
            status: Some(PublishStatus::Pending),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::AssemblyUpdate;

    fn completed_assembly() -> AssemblyTask {
        let mut task = AssemblyTask::new("u1", "ch1");
        task.status = AssemblyStatus::Uploading;
        task.apply(&AssemblyUpdate::completed("videos/u1/out.mp4", Some(30)))
            .unwrap();
        task
    }

    #[test]
    fn test_for_assembly_requires_completed() {
        let pending = AssemblyTask::new("u1", "ch1");
        let err = PublishTask::for_assembly(&pending, PublishMetadata::new("t"), None).unwrap_err();
        assert!(matches!(err, ModelError::AssemblyNotReady { .. }));

        let mut no_key = completed_assembly();
        no_key.result_key = None;
        assert!(PublishTask::for_assembly(&no_key, PublishMetadata::new("t"), None).is_err());

        let task =
            PublishTask::for_assembly(&completed_assembly(), PublishMetadata::new("t"), None).unwrap();
        assert_eq!(task.status, PublishStatus::Pending);
        assert_eq!(task.user_id, "u1");
    }

    #[test]
    fn test_metadata_validation() {
        assert!(PublishMetadata::new("").check().is_err());
        assert!(PublishMetadata::new("x".repeat(81)).check().is_err());
        assert!(PublishMetadata::new("ok")
            .with_tags((0..13).map(|i| format!("t{i}")))
            .check()
            .is_err());

        let meta = PublishMetadata::new("ok");
        assert!(meta.check().is_ok());
        assert_eq!(meta.category_id, 171);
        assert_eq!(meta.upload_line, "bda2");
        assert_eq!(meta.upload_limit, 3);
    }

    #[test]
    fn test_joined_tags() {
        let meta = PublishMetadata::new("t").with_tags(["a", " ", "b "]);
        assert_eq!(meta.joined_tags().as_deref(), Some("a,b"));
        assert_eq!(PublishMetadata::new("t").joined_tags(), None);
    }

    #[test]
    fn test_copyright_codes() {
        assert_eq!(Copyright::Original.code(), 1);
        assert_eq!(Copyright::from_code(2).unwrap(), Copyright::Reproduced);
        assert!(Copyright::from_code(3).is_err());
    }

    #[test]
    fn test_publish_lifecycle_and_retry() {
        let mut task =
            PublishTask::for_assembly(&completed_assembly(), PublishMetadata::new("t"), None).unwrap();

        assert!(task.apply(&PublishUpdate::published(None, None)).is_err());

        task.apply(&PublishUpdate::uploading()).unwrap();
        task.apply(&PublishUpdate::failed("stderr text")).unwrap();
        assert_eq!(task.error_message.as_deref(), Some("stderr text"));

        task.apply(&PublishUpdate::reset()).unwrap();
        assert_eq!(task.status, PublishStatus::Pending);
        assert_eq!(task.progress, 0);
        assert!(task.error_message.is_none());

        task.apply(&PublishUpdate::uploading()).unwrap();
        task.apply(&PublishUpdate::published(
            Some("BV1xx411c7mD".into()),
            Some("170001".into()),
        ))
        .unwrap();
        assert_eq!(task.progress, 100);
        assert!(task.published_at.is_some());
        assert!(task.is_terminal());
        assert!(!PublishStatus::Published.can_transition_to(PublishStatus::Failed));
    }
}
