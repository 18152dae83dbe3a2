//! Read-side views returned to pollers.
//!
//! Views wrap an entity and carry derived fields computed once at
//! construction, so entities never grow ad-hoc attributes.

use serde::{Deserialize, Serialize};

use crate::assembly::{AssemblyStatus, AssemblyTask};
use crate::publish::{PublishStatus, PublishTask};

/// Base URL of a published video page.
pub const PLATFORM_VIDEO_URL_BASE: &str = "https://www.bilibili.com/video/";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyTaskView {
    #[serde(flatten)]
    pub task: AssemblyTask,
    pub is_terminal: bool,
    pub can_retry: bool,
}

impl From<AssemblyTask> for AssemblyTaskView {
    fn from(task: AssemblyTask) -> Self {
        Self {
            is_terminal: task.status.is_terminal(),
            can_retry: task.status == AssemblyStatus::Failed,
            task,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishTaskView {
    #[serde(flatten)]
    pub task: PublishTask,
    pub is_terminal: bool,
    pub can_retry: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_url: Option<String>,
}

impl From<PublishTask> for PublishTaskView {
    fn from(task: PublishTask) -> Self {
        let platform_url = task
            .platform_video_id
            .as_ref()
            .filter(|_| task.status == PublishStatus::Published)
            .map(|id| format!("{PLATFORM_VIDEO_URL_BASE}{id}"));
        Self {
            is_terminal: task.status.is_terminal(),
            can_retry: task.status == PublishStatus::Failed,
            platform_url,
            task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::AssemblyUpdate;
    use crate::publish::{PublishMetadata, PublishUpdate};

    #[test]
    fn test_assembly_view_flags() {
        let mut task = AssemblyTask::new("u1", "ch1");
        task.apply(&AssemblyUpdate::failed("boom")).unwrap();
        let view = AssemblyTaskView::from(task);
        assert!(view.is_terminal);
        assert!(view.can_retry);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["can_retry"], true);
    }

    #[test]
    fn test_publish_view_url() {
        let mut assembly = AssemblyTask::new("u1", "ch1");
        assembly.status = crate::assembly::AssemblyStatus::Completed;
        assembly.result_key = Some("videos/u1/a.mp4".into());

        let mut task =
            PublishTask::for_assembly(&assembly, PublishMetadata::new("title"), None).unwrap();
        assert!(PublishTaskView::from(task.clone()).platform_url.is_none());

        task.apply(&PublishUpdate::uploading()).unwrap();
        task.apply(&PublishUpdate::published(Some("BV1ab".into()), None))
            .unwrap();
        let view = PublishTaskView::from(task);
        assert_eq!(
            view.platform_url.as_deref(),
            Some("https://www.bilibili.com/video/BV1ab")
        );
        assert!(!view.can_retry);
    }
}
