//! Extracting platform identifiers from uploader output.

use regex::Regex;
use std::sync::LazyLock;

static VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"BV[a-zA-Z0-9]+").unwrap());
static NUMERIC_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)av(\d+)").unwrap());

/// Identifiers found in a successful upload's output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadIds {
    /// Alphanumeric id (`BV...`)
    pub video_id: Option<String>,
    /// Numeric id, digits only
    pub numeric_id: Option<String>,
}

impl UploadIds {
    pub fn is_empty(&self) -> bool {
        self.video_id.is_none() && self.numeric_id.is_none()
    }
}

/// Scrapes identifiers out of free-form uploader output.
pub trait OutputParser: Send + Sync {
    fn parse(&self, output: &str) -> UploadIds;
}

/// Default parser for the uploader's stdout. Both patterns are matched independently.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformIdParser;

impl OutputParser for PlatformIdParser {
    fn parse(&self, output: &str) -> UploadIds {
        UploadIds {
            video_id: VIDEO_ID.find(output).map(|m| m.as_str().to_string()),
            numeric_id: NUMERIC_ID
                .captures(output)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string()),
        }
    }
}
