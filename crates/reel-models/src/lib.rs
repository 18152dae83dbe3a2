//! Shared data models for the ReelForge pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Shot artifacts and chapter shot lists
//! - Assembly and publish tasks with their state machines
//! - Publish accounts and background tracks
//! - Concatenation strategy and encoding configuration
//! - Read-side views returned to pollers

pub mod account;
pub mod assembly;
pub mod background;
pub mod encoding;
pub mod error;
pub mod id;
pub mod publish;
pub mod shot;
pub mod strategy;
pub mod view;

// Re-export common types
pub use account::{LoginStatus, PublishAccount};
pub use assembly::{AssemblySettings, AssemblyStatus, AssemblyTask, AssemblyUpdate};
pub use background::BackgroundTrack;
pub use encoding::EncodingConfig;
pub use error::{ModelError, ModelResult};
pub use id::TaskId;
pub use publish::{Copyright, PublishMetadata, PublishStatus, PublishTask, PublishUpdate};
pub use shot::{ChapterShots, ContentKind, ShotArtifact, ShotStatus};
pub use strategy::{ConcatStrategy, TransitionKind, TransitionSpec};
pub use view::{AssemblyTaskView, PublishTaskView};
