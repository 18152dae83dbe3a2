//! Concatenation strategies and transition settings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// Default dissolve duration between two clips (seconds).
pub const DEFAULT_TRANSITION_SECS: f64 = 0.5;
/// Default number of leading frames removed by the frame-trim strategy.
pub const DEFAULT_TRIM_FRAMES: u32 = 1;

/// How ordered clips are joined into a single video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConcatStrategy {
    /// Stream copy through the concat demuxer. No re-encode.
    #[default]
    Fast,
    /// Drop leading frames of every clip after the first, then re-encode.
    FrameTrim,
    /// Chained cross-dissolves at clip boundaries, re-encoded.
    Crossfade,
}

impl ConcatStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConcatStrategy::Fast => "fast",
            ConcatStrategy::FrameTrim => "frame_trim",
            ConcatStrategy::Crossfade => "crossfade",
        }
    }

    /// Whether this strategy re-encodes its output.
    pub fn reencodes(&self) -> bool {
        !matches!(self, ConcatStrategy::Fast)
    }
}

impl fmt::Display for ConcatStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConcatStrategy {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" | "copy" => Ok(ConcatStrategy::Fast),
            "frame_trim" | "frametrim" | "trim" => Ok(ConcatStrategy::FrameTrim),
            "crossfade" | "xfade" => Ok(ConcatStrategy::Crossfade),
            other => Err(ModelError::unknown_variant("concat strategy", other)),
        }
    }
}

/// FFmpeg `xfade` transition names supported by the crossfade strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    #[default]
    Fade,
    Dissolve,
    #[serde(rename = "fadeblack")]
    FadeBlack,
    #[serde(rename = "fadewhite")]
    FadeWhite,
    #[serde(rename = "wipeleft")]
    WipeLeft,
    #[serde(rename = "wiperight")]
    WipeRight,
    #[serde(rename = "slideleft")]
    SlideLeft,
    #[serde(rename = "slideright")]
    SlideRight,
    #[serde(rename = "circleopen")]
    CircleOpen,
}

impl TransitionKind {
    /// Name passed to `xfade=transition=`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Fade => "fade",
            TransitionKind::Dissolve => "dissolve",
            TransitionKind::FadeBlack => "fadeblack",
            TransitionKind::FadeWhite => "fadewhite",
            TransitionKind::WipeLeft => "wipeleft",
            TransitionKind::WipeRight => "wiperight",
            TransitionKind::SlideLeft => "slideleft",
            TransitionKind::SlideRight => "slideright",
            TransitionKind::CircleOpen => "circleopen",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Dissolve type and length for the crossfade strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TransitionSpec {
    #[serde(default)]
    pub kind: TransitionKind,
    #[serde(default = "default_transition_secs")]
    pub duration_secs: f64,
}

fn default_transition_secs() -> f64 {
    DEFAULT_TRANSITION_SECS
}

impl Default for TransitionSpec {
    fn default() -> Self {
        Self {
            kind: TransitionKind::Fade,
            duration_secs: DEFAULT_TRANSITION_SECS,
        }
    }
}

impl TransitionSpec {
    pub fn new(kind: TransitionKind, duration_secs: f64) -> Self {
        Self {
            kind,
            duration_secs,
        }
    }

    /// Expected output length when `durations` are joined with this transition.
    pub fn joined_duration(&self, durations: &[f64]) -> f64 {
        let total: f64 = durations.iter().sum();
        let overlaps = durations.len().saturating_sub(1) as f64;
        total - overlaps * self.duration_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parse() {
        assert_eq!("fast".parse::<ConcatStrategy>().unwrap(), ConcatStrategy::Fast);
        assert_eq!("XFADE".parse::<ConcatStrategy>().unwrap(), ConcatStrategy::Crossfade);
        assert_eq!("frame_trim".parse::<ConcatStrategy>().unwrap(), ConcatStrategy::FrameTrim);
        assert!("blend".parse::<ConcatStrategy>().is_err());
    }

    #[test]
    fn test_transition_names_match_serde() {
        let kind: TransitionKind = serde_json::from_str("\"fadeblack\"").unwrap();
        assert_eq!(kind, TransitionKind::FadeBlack);
        assert_eq!(kind.as_str(), "fadeblack");
    }

    #[test]
    fn test_joined_duration() {
        let spec = TransitionSpec::new(TransitionKind::Fade, 0.5);
        let joined = spec.joined_duration(&[4.0, 5.0, 6.0]);
        assert!((joined - 14.0).abs() < 1e-9);
        assert!((spec.joined_duration(&[3.0]) - 3.0).abs() < 1e-9);
    }
}
