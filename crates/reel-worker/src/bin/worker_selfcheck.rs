use std::path::Path;

use reel_media::{check_ffmpeg, check_ffprobe};
use reel_publish::{UploaderCli, UploaderConfig};
use reel_queue::JobQueue;
use reel_storage::R2Client;
use reel_worker::{RedisStore, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;

    let ffmpeg = check_ffmpeg().map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    let ffprobe = check_ffprobe().map_err(|e| anyhow::anyhow!("ffprobe not available: {}", e))?;
    println!("worker-selfcheck: ffmpeg={} ffprobe={}", ffmpeg.display(), ffprobe.display());

    let uploader = UploaderCli::new(UploaderConfig::from_env());
    let binary = uploader
        .check_binary()
        .map_err(|e| anyhow::anyhow!("uploader not available: {}", e))?;
    println!("worker-selfcheck: uploader={}", binary.display());

    ensure_env_present(&["REDIS_URL", "R2_ENDPOINT_URL", "R2_BUCKET_NAME"])?;

    if std::env::args().any(|arg| arg == "--connect") {
        check_services().await?;
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok")
        .await
        .map_err(|e| anyhow::anyhow!("work dir {} is not writable: {}", path.display(), e))?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

async fn check_services() -> anyhow::Result<()> {
    let r2 = R2Client::from_env()?;
    r2.check_connectivity().await?;
    println!("worker-selfcheck: r2 bucket={} reachable", r2.bucket());

    JobQueue::from_env()?.check_connectivity().await?;
    RedisStore::from_env()?.check_connectivity().await?;
    println!("worker-selfcheck: redis reachable");
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
