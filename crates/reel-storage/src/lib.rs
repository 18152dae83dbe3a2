//! Blob storage for shot clips, background tracks and assembled videos.
//!
//! Provides:
//! - `BlobStore` trait consumed by the worker pipelines
//! - `R2Client` for Cloudflare R2 (S3-compatible)
//! - `MemoryBlobStore` for tests and local runs

pub mod blob;
pub mod client;
pub mod error;
pub mod memory;

pub use blob::{content_type_for, generate_key, BlobStore};
pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBlobStore;
