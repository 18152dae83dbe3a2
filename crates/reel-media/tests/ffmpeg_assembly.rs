//! End-to-end concat and mix tests against a real FFmpeg.
//!
//! Each test returns early when ffmpeg/ffprobe are not on PATH.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::process::Command;

use reel_media::{
    check_ffmpeg, check_ffprobe, probe_duration, probe_video, AudioMixer, ConcatEngine, ConcatOptions,
    FfmpegRunner, MixSettings,
};
use reel_models::{ConcatStrategy, EncodingConfig, TransitionKind, TransitionSpec};

fn ffmpeg_available() -> bool {
    check_ffmpeg().is_ok() && check_ffprobe().is_ok()
}

async fn make_clip(dir: &Path, name: &str, secs: f64, with_audio: bool) -> PathBuf {
    let path = dir.join(name);
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-y", "-v", "error", "-f", "lavfi", "-i"])
        .arg(format!("testsrc=size=320x240:rate=25:duration={secs}"));
    if with_audio {
        cmd.args(["-f", "lavfi", "-i"])
            .arg(format!("sine=frequency=440:sample_rate=44100:duration={secs}"))
            .args(["-c:a", "aac", "-shortest"]);
    }
    let status = cmd
        .args(["-c:v", "libx264", "-preset", "ultrafast", "-pix_fmt", "yuv420p"])
        .arg(&path)
        .status()
        .await
        .unwrap();
    assert!(status.success(), "fixture generation failed");
    path
}

async fn make_tone(dir: &Path, secs: f64) -> PathBuf {
    let path = dir.join("bgm.m4a");
    let status = Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-f", "lavfi", "-i"])
        .arg(format!("sine=frequency=220:duration={secs}"))
        .args(["-c:a", "aac"])
        .arg(&path)
        .status()
        .await
        .unwrap();
    assert!(status.success());
    path
}

fn engine() -> ConcatEngine {
    ConcatEngine::new(FfmpegRunner::new().with_timeout(120), EncodingConfig::default().with_preset("ultrafast"), 30)
}

#[tokio::test]
async fn test_fast_concat_sums_durations() {
    if !ffmpeg_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let clips = vec![
        make_clip(dir.path(), "a.mp4", 2.0, true).await,
        make_clip(dir.path(), "b.mp4", 3.0, true).await,
    ];
    let output = dir.path().join("out.mp4");

    let outcome = engine()
        .concatenate(&clips, &output, &ConcatOptions::new(ConcatStrategy::Fast))
        .await
        .unwrap();

    assert_eq!(outcome.strategy_used, ConcatStrategy::Fast);
    let duration = probe_video(&output).await.unwrap().duration;
    assert!((duration - 5.0).abs() < 0.3, "duration was {duration}");
}

#[tokio::test]
async fn test_crossfade_duration_matches_overlap() {
    if !ffmpeg_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let clips = vec![
        make_clip(dir.path(), "a.mp4", 2.0, true).await,
        make_clip(dir.path(), "b.mp4", 2.0, false).await,
        make_clip(dir.path(), "c.mp4", 3.0, true).await,
    ];
    let output = dir.path().join("out.mp4");
    let options = ConcatOptions {
        strategy: ConcatStrategy::Crossfade,
        transition: TransitionSpec::new(TransitionKind::Fade, 0.5),
        ..ConcatOptions::default()
    };

    let outcome = engine().concatenate(&clips, &output, &options).await.unwrap();

    assert_eq!(outcome.strategy_used, ConcatStrategy::Crossfade);
    assert!(!outcome.fell_back);
    let info = probe_video(&output).await.unwrap();
    assert!(info.has_audio);
    assert!((info.duration - 6.0).abs() < 0.3, "duration was {}", info.duration);
}

#[tokio::test]
async fn test_crossfade_three_clips_of_four_five_six_seconds() {
    if !ffmpeg_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let clips = vec![
        make_clip(dir.path(), "a.mp4", 4.0, true).await,
        make_clip(dir.path(), "b.mp4", 5.0, true).await,
        make_clip(dir.path(), "c.mp4", 6.0, true).await,
    ];
    let output = dir.path().join("out.mp4");
    let options = ConcatOptions {
        strategy: ConcatStrategy::Crossfade,
        transition: TransitionSpec::new(TransitionKind::Dissolve, 0.5),
        ..ConcatOptions::default()
    };

    let outcome = engine().concatenate(&clips, &output, &options).await.unwrap();

    assert_eq!(outcome.strategy_used, ConcatStrategy::Crossfade);
    assert!(!outcome.fell_back);
    let duration = probe_video(&output).await.unwrap().duration;
    assert!((duration - 14.0).abs() < 0.3, "duration was {duration}");
}

#[tokio::test]
async fn test_frame_trim_concat() {
    if !ffmpeg_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let clips = vec![
        make_clip(dir.path(), "a.mp4", 2.0, true).await,
        make_clip(dir.path(), "b.mp4", 2.0, true).await,
    ];
    let output = dir.path().join("out.mp4");

    let outcome = engine()
        .concatenate(&clips, &output, &ConcatOptions::new(ConcatStrategy::FrameTrim))
        .await
        .unwrap();

    assert_eq!(outcome.strategy_used, ConcatStrategy::FrameTrim);
    let duration = probe_video(&output).await.unwrap().duration;
    assert!((duration - 3.96).abs() < 0.3, "duration was {duration}");
}

#[tokio::test]
async fn test_mix_loops_short_track_to_video_length() {
    if !ffmpeg_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let video = make_clip(dir.path(), "video.mp4", 5.0, true).await;
    let track = make_tone(dir.path(), 1.5).await;
    let output = dir.path().join("mixed.mp4");

    let mixer = AudioMixer::new(FfmpegRunner::new().with_timeout(120), EncodingConfig::default(), 30);
    let outcome = mixer
        .mix(&video, Some(&track), &MixSettings::default(), &output)
        .await;

    assert!(outcome.was_mixed(), "mix skipped: {outcome:?}");
    let duration = probe_duration(&output, 30).await.unwrap();
    assert!((duration - 5.0).abs() < 0.3, "duration was {duration}");
}

fn mixer() -> AudioMixer {
    AudioMixer::new(
        FfmpegRunner::new().with_timeout(120),
        EncodingConfig::default().with_preset("ultrafast"),
        30,
    )
}

#[tokio::test]
async fn test_mix_cuts_long_track_to_video_length() {
    if !ffmpeg_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let video = make_clip(dir.path(), "video.mp4", 3.0, true).await;
    let track = make_tone(dir.path(), 12.0).await;
    let output = dir.path().join("mixed.mp4");

    let outcome = mixer()
        .mix(&video, Some(&track), &MixSettings::default(), &output)
        .await;

    assert!(outcome.was_mixed(), "mix skipped: {outcome:?}");
    let duration = probe_duration(&output, 30).await.unwrap();
    assert!((duration - 3.0).abs() < 0.3, "duration was {duration}");
}

#[tokio::test]
async fn test_mix_ten_second_track_under_thirty_five_second_video() {
    if !ffmpeg_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let video = make_clip(dir.path(), "video.mp4", 35.0, false).await;
    let track = make_tone(dir.path(), 10.0).await;
    let output = dir.path().join("mixed.mp4");

    let outcome = mixer()
        .mix(&video, Some(&track), &MixSettings::default(), &output)
        .await;

    assert!(outcome.was_mixed(), "mix skipped: {outcome:?}");
    let info = probe_video(&output).await.unwrap();
    assert!(info.has_audio);
    assert!((info.duration - 35.0).abs() < 0.3, "duration was {}", info.duration);
}
