//! Publishing finished videos through the external uploader CLI.
//!
//! This crate provides:
//! - `UploaderCli`, which builds the uploader command line and runs it under a timeout
//! - `OutputParser` for pulling platform ids out of the uploader's stdout
//! - Cookie file checks and login instructions for publish accounts

pub mod cli;
pub mod config;
pub mod cookie;
pub mod error;
pub mod parser;

pub use cli::{UploadReceipt, UploadRequest, Uploader, UploaderCli};
pub use config::{UploaderConfig, DEFAULT_UPLOADER_TIMEOUT_SECS};
pub use cookie::{absolutize, cookie_file_is_valid, cookie_has_token, LoginInstructions};
pub use error::{PublishError, PublishResult};
pub use parser::{OutputParser, PlatformIdParser, UploadIds};
