//! Full assembly runs against a real FFmpeg with in-memory collaborators.
//!
//! Each test returns early when ffmpeg/ffprobe are not on PATH.

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::process::Command;

use reel_media::{check_ffmpeg, check_ffprobe};
use reel_models::{
    AssemblySettings, AssemblyStatus, AssemblyTask, BackgroundTrack, ChapterShots, ConcatStrategy,
    EncodingConfig, ShotArtifact,
};
use reel_storage::MemoryBlobStore;
use reel_worker::{AssemblyPipeline, AssemblyTaskRepository, MemoryStore, WorkerConfig};

fn ffmpeg_available() -> bool {
    check_ffmpeg().is_ok() && check_ffprobe().is_ok()
}

async fn render(args: &[String], output: &Path) -> Vec<u8> {
    let status = Command::new("ffmpeg")
        .args(["-y", "-v", "error"])
        .args(args)
        .arg(output)
        .status()
        .await
        .unwrap();
    assert!(status.success(), "fixture generation failed");
    tokio::fs::read(output).await.unwrap()
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

async fn clip_bytes(dir: &Path, name: &str, secs: u32) -> Vec<u8> {
    let video = format!("testsrc=size=320x240:rate=25:duration={secs}");
    let audio = format!("sine=frequency=440:duration={secs}");
    let args = args(&[
        "-f", "lavfi", "-i", &video, "-f", "lavfi", "-i", &audio, "-c:v", "libx264", "-pix_fmt",
        "yuv420p", "-c:a", "aac", "-shortest",
    ]);
    render(&args, &dir.join(name)).await
}

struct Setup {
    store: MemoryStore,
    blobs: MemoryBlobStore,
    pipeline: AssemblyPipeline,
    fixtures: TempDir,
    _work: TempDir,
}

async fn setup(clips: &[u32]) -> Setup {
    let store = MemoryStore::new();
    let blobs = MemoryBlobStore::new();
    let fixtures = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();

    let mut shots = Vec::new();
    for (i, secs) in clips.iter().enumerate() {
        let key = format!("shots/user-1/{i}.mp4");
        let bytes = clip_bytes(fixtures.path(), &format!("{i}.mp4"), *secs).await;
        blobs.insert(key.clone(), bytes).await;
        shots.push(ShotArtifact::completed(1, i as u32 + 1, key));
    }
    store.insert_chapter(ChapterShots::new("ch-1", shots)).await;

    let mut config = WorkerConfig::default().with_work_dir(work.path());
    config.encoding = EncodingConfig::default().with_preset("ultrafast");
    let shared = Arc::new(store.clone());
    let pipeline = AssemblyPipeline::new(
        config,
        shared.clone(),
        shared.clone(),
        shared.clone(),
        shared,
        Arc::new(blobs.clone()),
    );

    Setup {
        store,
        blobs,
        pipeline,
        fixtures,
        _work: work,
    }
}

#[tokio::test]
async fn test_fast_assembly_completes_and_attaches_video() {
    if !ffmpeg_available() {
        return;
    }
    let setup = setup(&[2, 2]).await;
    let task = AssemblyTask::new("user-1", "ch-1");
    setup.store.insert_assembly(task.clone()).await;

    let stats = setup.pipeline.run_assembly(&task.id).await.unwrap();

    assert_eq!(stats.total_shots, 2);
    assert_eq!(stats.strategy_used, ConcatStrategy::Fast);
    assert!(!stats.mixed);
    assert!(stats.result_key.starts_with("videos/user-1/"));
    assert!(stats.result_key.ends_with("_chapter_ch-1_movie.mp4"));
    assert!((3..=4).contains(&stats.duration_secs));

    assert!(setup.blobs.contains(&stats.result_key).await);
    assert_eq!(
        setup.blobs.content_type(&stats.result_key).await.as_deref(),
        Some("video/mp4")
    );

    let video = setup.store.chapter_video("ch-1").await.unwrap();
    assert_eq!(video.key, stats.result_key);
    assert_eq!(video.duration_secs, stats.duration_secs);

    let stored = setup.store.get(&task.id).await.unwrap();
    assert_eq!(stored.status, AssemblyStatus::Completed);
    assert_eq!(stored.progress, 100);
    assert_eq!(stored.result_key.as_deref(), Some(stats.result_key.as_str()));

    let history = setup.store.assembly_history(&task.id).await;
    let statuses: Vec<AssemblyStatus> = history.iter().map(|t| t.status).collect();
    assert_eq!(
        statuses,
        vec![
            AssemblyStatus::Validating,
            AssemblyStatus::DownloadingMaterials,
            AssemblyStatus::Concatenating,
            AssemblyStatus::Uploading,
            AssemblyStatus::Completed,
        ]
    );
    let progress: Vec<u8> = history.iter().map(|t| t.progress).collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_crossfade_with_background_track() {
    if !ffmpeg_available() {
        return;
    }
    let setup = setup(&[2, 2, 2]).await;

    let tone_args = args(&["-f", "lavfi", "-i", "sine=frequency=220:duration=1", "-c:a", "aac"]);
    let tone = render(&tone_args, &setup.fixtures.path().join("bgm.m4a")).await;
    setup.blobs.insert("tracks/calm.m4a", tone).await;
    setup
        .store
        .insert_track(BackgroundTrack::new("bgm-1", "Calm", "calm.m4a", "tracks/calm.m4a"))
        .await;

    let task = AssemblyTask::new("user-1", "ch-1")
        .with_background_track("bgm-1")
        .with_settings(AssemblySettings::default().with_strategy(ConcatStrategy::Crossfade));
    setup.store.insert_assembly(task.clone()).await;

    let stats = setup.pipeline.run_assembly(&task.id).await.unwrap();

    assert!(stats.mixed);
    assert!(!stats.fell_back);
    assert_eq!(stats.strategy_used, ConcatStrategy::Crossfade);
    // 3 x 2s minus two 0.5s overlaps
    assert!((4..=5).contains(&stats.duration_secs), "{}", stats.duration_secs);

    let history = setup.store.assembly_history(&task.id).await;
    assert!(history.iter().any(|t| t.status == AssemblyStatus::Mixing && t.progress == 75));
}

#[tokio::test]
async fn test_missing_track_is_skipped() {
    if !ffmpeg_available() {
        return;
    }
    let setup = setup(&[1]).await;
    let task = AssemblyTask::new("user-1", "ch-1").with_background_track("gone");
    setup.store.insert_assembly(task.clone()).await;

    let stats = setup.pipeline.run_assembly(&task.id).await.unwrap();

    assert!(!stats.mixed);
    let stored = setup.store.get(&task.id).await.unwrap();
    assert_eq!(stored.status, AssemblyStatus::Completed);
}

#[tokio::test]
async fn test_missing_clip_fails_download_stage() {
    if !ffmpeg_available() {
        return;
    }
    let setup = setup(&[1]).await;
    setup
        .store
        .insert_chapter(ChapterShots::new(
            "ch-1",
            vec![
                ShotArtifact::completed(1, 1, "shots/user-1/0.mp4"),
                ShotArtifact::completed(1, 2, "shots/user-1/missing.mp4"),
            ],
        ))
        .await;
    let task = AssemblyTask::new("user-1", "ch-1");
    setup.store.insert_assembly(task.clone()).await;

    let err = setup.pipeline.run_assembly(&task.id).await.unwrap_err();
    assert!(err.to_string().contains("shot #2"));

    let stored = setup.store.get(&task.id).await.unwrap();
    assert_eq!(stored.status, AssemblyStatus::Failed);
    assert_eq!(stored.progress, 20);
    assert!(setup.store.chapter_video("ch-1").await.is_none());
}
