//! Uploader CLI invocation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use reel_models::PublishMetadata;

use crate::config::UploaderConfig;
use crate::cookie::absolutize;
use crate::error::{PublishError, PublishResult};
use crate::parser::{OutputParser, PlatformIdParser, UploadIds};

/// One upload: local files plus the metadata flags.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub video_path: PathBuf,
    pub cover_path: Option<PathBuf>,
    pub cookie_path: Option<PathBuf>,
    pub metadata: PublishMetadata,
}

impl UploadRequest {
    pub fn new(video_path: impl Into<PathBuf>, metadata: PublishMetadata) -> Self {
        Self {
            video_path: video_path.into(),
            cover_path: None,
            cookie_path: None,
            metadata,
        }
    }

    pub fn with_cover(mut self, path: impl Into<PathBuf>) -> Self {
        self.cover_path = Some(path.into());
        self
    }

    pub fn with_cookie(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookie_path = Some(path.into());
        self
    }

    /// Command-line arguments, without the binary.
    ///
    /// `-u <cookie>` precedes the `upload` subcommand. Optional flags are
    /// omitted when empty.
    pub fn to_args(&self) -> Vec<String> {
        let meta = &self.metadata;
        let mut args = Vec::new();

        if let Some(cookie) = &self.cookie_path {
            args.push("-u".to_string());
            args.push(path_arg(&absolutize(cookie)));
        }

        args.push("upload".to_string());
        args.push(path_arg(&self.video_path));

        args.extend([
            "--title".to_string(),
            meta.title.clone(),
            "--desc".to_string(),
            meta.description.clone(),
            "--tid".to_string(),
            meta.category_id.to_string(),
            "--copyright".to_string(),
            meta.copyright.code().to_string(),
            "--line".to_string(),
            meta.upload_line.clone(),
            "--limit".to_string(),
            meta.upload_limit.to_string(),
        ]);

        if let Some(cover) = &self.cover_path {
            args.push("--cover".to_string());
            args.push(path_arg(cover));
        }
        if let Some(tags) = meta.joined_tags() {
            args.push("--tag".to_string());
            args.push(tags);
        }
        if let Some(source) = meta.source.as_ref().filter(|s| !s.is_empty()) {
            args.push("--source".to_string());
            args.push(source.clone());
        }
        if let Some(dynamic) = meta.dynamic.as_ref().filter(|s| !s.is_empty()) {
            args.push("--dynamic".to_string());
            args.push(dynamic.clone());
        }
        if let Some(at) = meta.scheduled_at.filter(|t| *t > 0) {
            args.push("--dtime".to_string());
            args.push(at.to_string());
        }

        args
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub ids: UploadIds,
    pub stdout: String,
}

/// Sends a finished video to the platform.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, request: &UploadRequest) -> PublishResult<UploadReceipt>;
}

/// Runs the uploader binary as a child process.
#[derive(Clone)]
pub struct UploaderCli {
    config: UploaderConfig,
    parser: Arc<dyn OutputParser>,
}

impl UploaderCli {
    pub fn new(config: UploaderConfig) -> Self {
        Self {
            config,
            parser: Arc::new(PlatformIdParser),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn OutputParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Locate the uploader binary, either as a path or on PATH.
    pub fn check_binary(&self) -> PublishResult<PathBuf> {
        let binary = &self.config.binary_path;
        if binary.exists() {
            return Ok(absolutize(binary));
        }
        which::which(binary).map_err(|_| PublishError::BinaryNotFound(binary.clone()))
    }
}

#[async_trait]
impl Uploader for UploaderCli {
    async fn upload(&self, request: &UploadRequest) -> PublishResult<UploadReceipt> {
        let binary = self.check_binary()?;
        if !request.video_path.exists() {
            return Err(PublishError::invalid_request(format!(
                "video file missing: {}",
                request.video_path.display()
            )));
        }

        let args = request.to_args();
        info!("Running uploader: {} {}", binary.display(), args.join(" "));

        let child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the future on timeout kills the child
        let output = match tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Ok(output) => output?,
            Err(_) => {
                warn!("Uploader timed out after {} seconds", self.config.timeout_secs);
                return Err(PublishError::Timeout(self.config.timeout_secs));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!("Uploader failed with status {:?}", output.status.code());
            return Err(PublishError::rejected(stderr, output.status.code()));
        }

        debug!("Uploader output: {}", stdout);
        let ids = self.parser.parse(&stdout);
        if ids.is_empty() {
            warn!("Upload succeeded but no platform ids were found in the output");
        }

        Ok(UploadReceipt { ids, stdout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::Copyright;

    fn metadata() -> PublishMetadata {
        PublishMetadata::new("Chapter 1")
            .with_description("the beginning")
            .with_tags(vec!["anime".to_string(), "ai".to_string()])
    }

    #[test]
    fn test_upload_args_order() {
        let req = UploadRequest::new("/tmp/v.mp4", metadata()).with_cookie("/c/acc.json");
        let args = req.to_args();
        assert_eq!(
            args,
            vec![
                "-u", "/c/acc.json", "upload", "/tmp/v.mp4", "--title", "Chapter 1", "--desc",
                "the beginning", "--tid", "171", "--copyright", "1", "--line", "bda2", "--limit",
                "3", "--tag", "anime,ai",
            ]
        );
    }

    #[test]
    fn test_optional_flags() {
        let mut meta = metadata();
        meta.copyright = Copyright::Reproduced;
        meta.source = Some("https://example.com/src".to_string());
        meta.dynamic = Some("new chapter!".to_string());
        meta.scheduled_at = Some(1_900_000_000);
        meta.tags.clear();

        let req = UploadRequest::new("v.mp4", meta).with_cover("/tmp/cover.jpg");
        let args = req.to_args();
        let joined = args.join(" ");

        assert_eq!(args[0], "upload");
        assert!(joined.contains("--copyright 2"));
        assert!(joined.contains("--cover /tmp/cover.jpg"));
        assert!(joined.contains("--source https://example.com/src"));
        assert!(args.windows(2).any(|w| w[0] == "--dynamic" && w[1] == "new chapter!"));
        assert!(joined.ends_with("--dtime 1900000000"));
        assert!(!args.contains(&"--tag".to_string()));
    }

    #[test]
    fn test_relative_cookie_made_absolute() {
        let req = UploadRequest::new("v.mp4", metadata()).with_cookie("cookies/a.json");
        let args = req.to_args();
        assert!(Path::new(&args[1]).is_absolute());
        assert!(args[1].ends_with("cookies/a.json"));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let cli = UploaderCli::new(UploaderConfig::default().with_binary("/nonexistent/uploader-bin"));
        let req = UploadRequest::new("v.mp4", metadata());
        assert!(matches!(cli.upload(&req).await, Err(PublishError::BinaryNotFound(_))));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("uploader.sh");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn video(dir: &Path) -> PathBuf {
            let path = dir.join("v.mp4");
            std::fs::write(&path, b"video").unwrap();
            path
        }

        #[tokio::test]
        async fn test_success_parses_stdout() {
            let dir = TempDir::new().unwrap();
            let bin = script(dir.path(), "echo 'submitted BV1Q541167Qg av170001'");
            let cli = UploaderCli::new(UploaderConfig::default().with_binary(bin));

            let receipt =
                tokio_test::assert_ok!(cli.upload(&UploadRequest::new(video(dir.path()), metadata())).await);
            assert_eq!(receipt.ids.video_id.as_deref(), Some("BV1Q541167Qg"));
            assert_eq!(receipt.ids.numeric_id.as_deref(), Some("170001"));
        }

        #[tokio::test]
        async fn test_failure_keeps_raw_stderr() {
            let dir = TempDir::new().unwrap();
            let bin = script(dir.path(), "echo 'cookie expired: -101' >&2\nexit 3");
            let cli = UploaderCli::new(UploaderConfig::default().with_binary(bin));

            let err = cli
                .upload(&UploadRequest::new(video(dir.path()), metadata()))
                .await
                .unwrap_err();
            match err {
                PublishError::UploadRejected { stderr, exit_code } => {
                    assert_eq!(stderr, "cookie expired: -101\n");
                    assert_eq!(exit_code, Some(3));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_timeout_kills_uploader() {
            let dir = TempDir::new().unwrap();
            let bin = script(dir.path(), "sleep 30");
            let cli = UploaderCli::new(UploaderConfig::default().with_binary(bin).with_timeout(1));

            let err = cli
                .upload(&UploadRequest::new(video(dir.path()), metadata()))
                .await
                .unwrap_err();
            assert!(matches!(err, PublishError::Timeout(1)));
        }
    }
}
