//! Chapter assembly tasks and their state machine.
//!
//! An assembly task walks the stages
//! `pending -> validating -> downloading_materials -> concatenating -> [mixing] -> uploading -> completed`.
//! Any non-terminal stage may fail; a failed task goes back to `pending` only
//! through an explicit retry. Every mutation goes through [`AssemblyTask::apply`],
//! which rejects transitions outside the table.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModelError, ModelResult};
use crate::id::TaskId;
use crate::strategy::{ConcatStrategy, TransitionSpec, DEFAULT_TRIM_FRAMES};

/// Default background music gain relative to the original audio.
pub const DEFAULT_BACKGROUND_GAIN: f64 = 0.15;

/// Assembly processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyStatus {
    /// Created, waiting for a worker
    #[default]
    Pending,
    /// Checking that every shot is ready
    Validating,
    /// Fetching shot clips into scratch space
    DownloadingMaterials,
    /// Joining clips into one video
    Concatenating,
    /// Mixing background music
    Mixing,
    /// Uploading the result to durable storage
    Uploading,
    /// Finished; `result_key` is set
    Completed,
    /// Failed; `error_message` is set
    Failed,
}

impl AssemblyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssemblyStatus::Pending => "pending",
            AssemblyStatus::Validating => "validating",
            AssemblyStatus::DownloadingMaterials => "downloading_materials",
            AssemblyStatus::Concatenating => "concatenating",
            AssemblyStatus::Mixing => "mixing",
            AssemblyStatus::Uploading => "uploading",
            AssemblyStatus::Completed => "completed",
            AssemblyStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssemblyStatus::Completed | AssemblyStatus::Failed)
    }

    /// Progress value reported when a run enters this stage.
    pub fn checkpoint(&self) -> Option<u8> {
        match self {
            AssemblyStatus::Pending | AssemblyStatus::Failed => None,
            AssemblyStatus::Validating => Some(5),
            AssemblyStatus::DownloadingMaterials => Some(20),
            AssemblyStatus::Concatenating => Some(60),
            AssemblyStatus::Mixing => Some(75),
            AssemblyStatus::Uploading => Some(85),
            AssemblyStatus::Completed => Some(100),
        }
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: AssemblyStatus) -> bool {
        use AssemblyStatus::*;
        match (self, next) {
            (Pending, Validating) => true,
            (Validating, DownloadingMaterials) => true,
            (DownloadingMaterials, Concatenating) => true,
            (Concatenating, Mixing) | (Concatenating, Uploading) => true,
            (Mixing, Uploading) => true,
            (Uploading, Completed) => true,
            (Failed, Pending) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for AssemblyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-task assembly knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AssemblySettings {
    #[serde(default)]
    pub strategy: ConcatStrategy,
    #[serde(default)]
    pub transition: TransitionSpec,
    /// Leading frames dropped per clip by the frame-trim strategy
    #[serde(default = "default_trim_frames")]
    pub trim_frames: u32,
    /// Background music volume (0.0 - 1.0)
    #[serde(default = "default_gain")]
    pub background_gain: f64,
    /// Loop the background track when it is shorter than the video
    #[serde(default = "default_loop")]
    pub loop_background: bool,
}

fn default_trim_frames() -> u32 {
    DEFAULT_TRIM_FRAMES
}
fn default_gain() -> f64 {
    DEFAULT_BACKGROUND_GAIN
}
fn default_loop() -> bool {
    true
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            strategy: ConcatStrategy::Fast,
            transition: TransitionSpec::default(),
            trim_frames: DEFAULT_TRIM_FRAMES,
            background_gain: DEFAULT_BACKGROUND_GAIN,
            loop_background: true,
        }
    }
}

impl AssemblySettings {
    pub fn with_strategy(mut self, strategy: ConcatStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_transition(mut self, transition: TransitionSpec) -> Self {
        self.transition = transition;
        self
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.background_gain = gain;
        self
    }
}

/// A request to build one finished video for a chapter.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AssemblyTask {
    pub id: TaskId,
    pub user_id: String,
    pub chapter_id: String,
    #[serde(default)]
    pub status: AssemblyStatus,
    /// Progress percentage (0-100)
    #[serde(default)]
    pub progress: u8,
    /// Storage key of the finished video
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_key: Option<String>,
    /// Duration of the finished video in whole seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_track_id: Option<String>,
    #[serde(default)]
    pub settings: AssemblySettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AssemblyTask {
    pub fn new(user_id: impl Into<String>, chapter_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            user_id: user_id.into(),
            chapter_id: chapter_id.into(),
            status: AssemblyStatus::Pending,
            progress: 0,
            result_key: None,
            duration_secs: None,
            error_message: None,
            background_track_id: None,
            settings: AssemblySettings::default(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn with_background_track(mut self, track_id: impl Into<String>) -> Self {
        self.background_track_id = Some(track_id.into());
        self
    }

    pub fn with_settings(mut self, settings: AssemblySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply an update, enforcing the transition table and monotonic progress.
    ///
    /// A transition back to `pending` is a retry: progress, error, and any
    /// previous result are cleared.
    pub fn apply(&mut self, update: &AssemblyUpdate) -> ModelResult<()> {
        if let Some(next) = update.status {
            if next != self.status {
                if !self.status.can_transition_to(next) {
                    return Err(ModelError::illegal_transition("assembly", self.status, next));
                }
                self.status = next;

                if next == AssemblyStatus::Pending {
                    self.progress = 0;
                    self.error_message = None;
                    self.result_key = None;
                    self.duration_secs = None;
                    self.completed_at = None;
                    self.updated_at = Utc::now();
                    return Ok(());
                }
            }
        }

        if let Some(progress) = update.progress {
            self.progress = self.progress.max(progress.min(100));
        }
        if let Some(key) = &update.result_key {
            self.result_key = Some(key.clone());
        }
        if let Some(duration) = update.duration_secs {
            self.duration_secs = Some(duration);
        }
        if let Some(message) = &update.error_message {
            self.error_message = Some(message.clone());
        }
        if self.status == AssemblyStatus::Completed {
            self.progress = 100;
            self.completed_at.get_or_insert_with(Utc::now);
        }

        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Partial update applied atomically by an assembly repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssemblyUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AssemblyStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AssemblyUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `status` with its checkpoint progress.
    pub fn stage(status: AssemblyStatus) -> Self {
        Self {
            status: Some(status),
            progress: status.checkpoint(),
            ..Self::default()
        }
    }

    /// Mark the task failed. Progress is left untouched.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(AssemblyStatus::Failed),
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Mark the task completed with its stored result.
    pub fn completed(result_key: impl Into<String>, duration_secs: Option<u32>) -> Self {
        Self {
            status: Some(AssemblyStatus::Completed),
            progress: Some(100),
            result_key: Some(result_key.into()),
            duration_secs,
            ..Self::default()
        }
    }

    /// Retry reset: back to pending.
    pub fn reset() -> Self {
        Self {
            status: Some(AssemblyStatus::Pending),
            ..Self::default()
        }
    }

    pub fn status(mut self, status: AssemblyStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn result_key(mut self, key: impl Into<String>) -> Self {
        self.result_key = Some(key.into());
        self
    }

    pub fn duration_secs(mut self, duration: u32) -> Self {
        self.duration_secs = Some(duration);
        self
    }
}
