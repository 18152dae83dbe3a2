//! Shot completeness checks run before any download.

use std::fmt;

use reel_models::{ShotArtifact, ShotStatus};

use crate::error::{WorkerError, WorkerResult};

/// Violations listed individually in the failure message.
pub const MAX_REPORTED_VIOLATIONS: usize = 10;

/// One shot that cannot be assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub label: String,
    pub reason: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.reason)
    }
}

/// Every violation found in a shot list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    /// Failure message: the first violations, then a count of the rest.
    pub fn message(&self) -> String {
        let mut lines = vec![format!(
            "{} shot(s) are not ready for assembly:",
            self.violations.len()
        )];
        lines.extend(
            self.violations
                .iter()
                .take(MAX_REPORTED_VIOLATIONS)
                .map(|v| format!("  {v}")),
        );
        if self.violations.len() > MAX_REPORTED_VIOLATIONS {
            lines.push(format!(
                "  ... and {} more",
                self.violations.len() - MAX_REPORTED_VIOLATIONS
            ));
        }
        lines.join("\n")
    }
}

fn violation(shot: &ShotArtifact) -> Option<Violation> {
    let has_video = shot
        .remote_url
        .as_deref()
        .is_some_and(|u| !u.trim().is_empty());

    let reason = if !has_video {
        "no video".to_string()
    } else if shot.status != ShotStatus::Completed {
        format!("status={}", shot.status)
    } else {
        return None;
    };

    Some(Violation {
        label: shot.label(),
        reason,
    })
}

/// Collect every violation without failing.
pub fn inspect_shots(shots: &[ShotArtifact]) -> ValidationReport {
    ValidationReport {
        violations: shots.iter().filter_map(violation).collect(),
    }
}

/// Fail unless every shot is completed with a video. An empty list fails too.
pub fn validate_shots(shots: &[ShotArtifact]) -> WorkerResult<()> {
    if shots.is_empty() {
        return Err(WorkerError::validation("chapter has no shots"));
    }

    let report = inspect_shots(shots);
    if report.is_ok() {
        Ok(())
    } else {
        Err(WorkerError::validation(report.message()))
    }
}
