//! Stream-copy concatenation through the concat demuxer.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use reel_models::ConcatStrategy;

use super::{ConcatBackend, ConcatOptions};
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::filters::concat_list_contents;

/// Joins clips without re-encoding. Requires matching codecs across clips.
#[derive(Debug, Clone)]
pub struct FastConcat {
    runner: FfmpegRunner,
}

impl FastConcat {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ConcatBackend for FastConcat {
    fn strategy(&self) -> ConcatStrategy {
        ConcatStrategy::Fast
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path, _options: &ConcatOptions) -> MediaResult<()> {
        let mut absolute = Vec::with_capacity(inputs.len());
        for input in inputs {
            absolute.push(tokio::fs::canonicalize(input).await?);
        }

        // List file lives beside the output and is removed on drop
        let dir = output.parent().unwrap_or_else(|| Path::new("."));
        let list = tempfile::Builder::new()
            .prefix("concat_")
            .suffix(".txt")
            .tempfile_in(dir)?;
        tokio::fs::write(list.path(), concat_list_contents(&absolute)).await?;
        debug!("Concat list written to {}", list.path().display());

        let cmd = FfmpegCommand::new(list.path(), output)
            .concat_demuxer()
            .stream_copy();

        self.runner.run(&cmd).await
    }
}
