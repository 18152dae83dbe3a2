//! FFmpeg filter graph builders for concatenation and mixing.
//!
//! Everything here is pure string construction so graphs can be checked
//! without running FFmpeg.

use std::fmt::Write as _;
use std::path::Path;

use reel_models::TransitionSpec;

/// Sample rate used for generated silence.
const SILENCE_SAMPLE_RATE: u32 = 44100;

/// Where a clip's audio comes from inside a filter graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioSource {
    /// The clip's own audio stream
    Stream,
    /// Generated silence of the given length (clip has no audio)
    Silence(f64),
}

impl AudioSource {
    /// Filter chain head producing this input's audio. Chained filters
    /// follow directly.
    fn head(&self, input: usize) -> String {
        match self {
            AudioSource::Stream => format!("[{input}:a]"),
            AudioSource::Silence(secs) => format!(
                "anullsrc=r={SILENCE_SAMPLE_RATE}:cl=stereo,atrim=0:{secs:.3},"
            ),
        }
    }
}

/// Contents of a concat demuxer list file.
///
/// Single quotes inside paths are escaped the way the demuxer expects.
pub fn concat_list_contents<P: AsRef<Path>>(paths: &[P]) -> String {
    let mut out = String::new();
    for path in paths {
        let escaped = path.as_ref().to_string_lossy().replace('\'', r"'\''");
        let _ = writeln!(out, "file '{escaped}'");
    }
    out
}

/// Seconds of audio matching `frames` frames at `fps`.
pub fn frames_to_secs(frames: u32, fps: f64) -> f64 {
    if fps <= 0.0 {
        return 0.0;
    }
    frames as f64 / fps
}

/// Filter graph dropping `trim_frames` leading frames from every clip but the
/// first, then joining everything with the concat filter.
///
/// Produces `[outv]` and `[outa]`.
pub fn frame_trim_graph(audio: &[AudioSource], trim_frames: u32, fps: f64) -> String {
    let n = audio.len();
    let trim_secs = frames_to_secs(trim_frames, fps);
    let mut parts = Vec::with_capacity(n * 2 + 1);
    let mut pads = String::new();

    for (i, source) in audio.iter().enumerate() {
        if i == 0 || trim_frames == 0 {
            parts.push(format!("[{i}:v]setpts=PTS-STARTPTS[v{i}]"));
            parts.push(format!("{}asetpts=PTS-STARTPTS[a{i}]", source.head(i)));
        } else {
            parts.push(format!(
                "[{i}:v]trim=start_frame={trim_frames},setpts=PTS-STARTPTS[v{i}]"
            ));
            parts.push(format!(
                "{}atrim=start={trim_secs:.6},asetpts=PTS-STARTPTS[a{i}]",
                source.head(i)
            ));
        }
        let _ = write!(pads, "[v{i}][a{i}]");
    }

    parts.push(format!("{pads}concat=n={n}:v=1:a=1[outv][outa]"));
    parts.join(";")
}

/// Transition length actually used.
///
/// Stays at least one frame shorter than the shortest clip, so every clip
/// keeps some audio of its own and consecutive fades never start together.
/// Returns 0 when a clip is too short to carry any transition.
pub fn clamp_transition(requested: f64, durations: &[f64], fps: f64) -> f64 {
    let requested = requested.max(0.0);
    let shortest = durations.iter().copied().fold(f64::INFINITY, f64::min);
    if !shortest.is_finite() {
        return requested;
    }
    let frame = if fps > 0.0 { 1.0 / fps } else { 1.0 / 25.0 };
    requested.min((shortest - frame).max(0.0))
}

/// Start offset of each `xfade`: `offset_i = sum(d_0..=d_i) - (i + 1) * t`.
///
/// One offset per clip boundary, so `durations.len() - 1` values.
pub fn crossfade_offsets(durations: &[f64], transition: f64) -> Vec<f64> {
    let mut offsets = Vec::with_capacity(durations.len().saturating_sub(1));
    let mut cumulative = 0.0;
    for (i, duration) in durations
        .iter()
        .enumerate()
        .take(durations.len().saturating_sub(1))
    {
        cumulative += duration;
        offsets.push(cumulative - (i + 1) as f64 * transition);
    }
    offsets
}

/// Expected length of a crossfaded output: `sum - (n - 1) * t`.
pub fn crossfade_duration(durations: &[f64], transition: f64) -> f64 {
    let total: f64 = durations.iter().sum();
    total - durations.len().saturating_sub(1) as f64 * transition
}

/// Filter graph chaining `xfade` across all clips with matching audio.
///
/// `transition.duration_secs` must already be clamped. Video inputs are
/// normalized to a common frame rate and timebase before fading. Every clip
/// except the last loses its final `t` seconds of audio, so the joined audio
/// matches the overlapped video length. Produces `[outv]` and `[outa]`.
pub fn crossfade_graph(
    durations: &[f64],
    audio: &[AudioSource],
    transition: &TransitionSpec,
    fps: f64,
) -> String {
    let n = durations.len();
    let t = transition.duration_secs;
    let offsets = crossfade_offsets(durations, t);
    let mut parts = Vec::new();

    for i in 0..n {
        parts.push(format!(
            "[{i}:v]fps={fps:.3},settb=AVTB,setpts=PTS-STARTPTS,format=yuv420p[v{i}]"
        ));
    }

    let mut current = "v0".to_string();
    for (i, offset) in offsets.iter().enumerate() {
        let next = format!("v{}", i + 1);
        let out = if i + 2 == n {
            "outv".to_string()
        } else {
            format!("x{}", i + 1)
        };
        parts.push(format!(
            "[{current}][{next}]xfade=transition={}:duration={t:.3}:offset={offset:.3}[{out}]",
            transition.kind.as_str()
        ));
        current = out;
    }
    if n == 1 {
        parts.push("[v0]null[outv]".to_string());
    }

    let mut pads = String::new();
    for (i, source) in audio.iter().enumerate().take(n) {
        let keep = if i + 1 < n { durations[i] - t } else { durations[i] };
        parts.push(format!(
            "{}atrim=0:{keep:.3},asetpts=PTS-STARTPTS[a{i}]",
            source.head(i)
        ));
        let _ = write!(pads, "[a{i}]");
    }
    parts.push(format!("{pads}concat=n={n}:v=0:a=1[outa]"));

    parts.join(";")
}

/// How many times a background track must play to cover `video_secs`:
/// `ceil(video / track) + 1`, or 1 when the track is already long enough.
pub fn loop_count(video_secs: f64, track_secs: f64) -> u32 {
    if track_secs <= 0.0 || track_secs >= video_secs {
        return 1;
    }
    (video_secs / track_secs).ceil() as u32 + 1
}

/// Mixing graph: original audio plus attenuated background, lasting as long
/// as the original. Produces `[aout]`.
pub fn mix_graph(gain: f64) -> String {
    format!(
        "[1:a]volume={gain:.3}[bg];[0:a][bg]amix=inputs=2:duration=first:dropout_transition=0[aout]"
    )
}

/// Background-only graph for videos without audio. Produces `[aout]`.
pub fn background_only_graph(gain: f64, video_secs: f64) -> String {
    format!("[1:a]volume={gain:.3},atrim=0:{video_secs:.3},asetpts=PTS-STARTPTS[aout]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::TransitionKind;

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list_contents(&["/tmp/a.mp4", "/tmp/it's.mp4"]);
        assert_eq!(list, "file '/tmp/a.mp4'\nfile '/tmp/it'\\''s.mp4'\n");
    }

    #[test]
    fn test_crossfade_offsets_land_on_boundaries() {
        let offsets = crossfade_offsets(&[4.0, 5.0, 6.0], 0.5);
        assert_eq!(offsets.len(), 2);
        assert!((offsets[0] - 3.5).abs() < 1e-9);
        assert!((offsets[1] - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_crossfade_duration() {
        assert!((crossfade_duration(&[4.0, 5.0, 6.0], 0.5) - 14.0).abs() < 1e-9);
        assert!((crossfade_duration(&[3.0], 0.5) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_clamp_transition() {
        assert!((clamp_transition(2.0, &[5.0, 1.2, 3.0], 25.0) - 1.16).abs() < 1e-9);
        assert!((clamp_transition(0.5, &[5.0, 1.2], 25.0) - 0.5).abs() < 1e-9);
        assert_eq!(clamp_transition(-1.0, &[5.0], 25.0), 0.0);
        // Unknown frame rate falls back to 25 fps
        assert!((clamp_transition(2.0, &[1.0, 3.0], 0.0) - 0.96).abs() < 1e-9);
        // A single-frame clip leaves no room for a transition
        assert_eq!(clamp_transition(0.5, &[3.0, 0.04], 25.0), 0.0);
    }

    #[test]
    fn test_transition_as_long_as_a_clip_still_leaves_audio() {
        let durations = [2.0, 2.0, 3.0];
        let t = clamp_transition(2.0, &durations, 25.0);
        assert!(t < 2.0);

        let offsets = crossfade_offsets(&durations, t);
        assert!(offsets[1] > offsets[0]);

        let spec = TransitionSpec::new(TransitionKind::Fade, t);
        let graph = crossfade_graph(&durations, &[AudioSource::Stream; 3], &spec, 25.0);
        assert!(!graph.contains("atrim=0:0.000"));
        assert!(graph.contains("[0:a]atrim=0:0.040"));
    }

    #[test]
    fn test_crossfade_graph_shape() {
        let spec = TransitionSpec::new(TransitionKind::Dissolve, 0.5);
        let graph = crossfade_graph(
            &[4.0, 5.0, 6.0],
            &[AudioSource::Stream, AudioSource::Silence(5.0), AudioSource::Stream],
            &spec,
            24.0,
        );

        assert!(graph.contains("[v0][v1]xfade=transition=dissolve:duration=0.500:offset=3.500[x1]"));
        assert!(graph.contains("[x1][v2]xfade=transition=dissolve:duration=0.500:offset=8.000[outv]"));
        assert!(graph.contains("[0:a]atrim=0:3.500"));
        assert!(graph.contains("anullsrc=r=44100:cl=stereo,atrim=0:5.000,atrim=0:4.500"));
        assert!(graph.contains("[2:a]atrim=0:6.000"));
        assert!(graph.ends_with("[a0][a1][a2]concat=n=3:v=0:a=1[outa]"));
    }

    #[test]
    fn test_frame_trim_graph() {
        let graph = frame_trim_graph(&[AudioSource::Stream, AudioSource::Stream], 1, 25.0);
        assert!(graph.contains("[0:v]setpts=PTS-STARTPTS[v0]"));
        assert!(graph.contains("[1:v]trim=start_frame=1,setpts=PTS-STARTPTS[v1]"));
        assert!(graph.contains("[1:a]atrim=start=0.040000"));
        assert!(graph.ends_with("[v0][a0][v1][a1]concat=n=2:v=1:a=1[outv][outa]"));
    }

    #[test]
    fn test_loop_count() {
        assert_eq!(loop_count(30.0, 60.0), 1);
        assert_eq!(loop_count(30.0, 30.0), 1);
        assert_eq!(loop_count(30.0, 20.0), 3);
        assert_eq!(loop_count(30.0, 10.0), 4);
        assert_eq!(loop_count(30.0, 0.0), 1);
    }

    #[test]
    fn test_mix_graphs() {
        let graph = mix_graph(0.15);
        assert!(graph.contains("volume=0.150"));
        assert!(graph.contains("amix=inputs=2:duration=first:dropout_transition=0[aout]"));

        let solo = background_only_graph(0.15, 42.0);
        assert!(solo.starts_with("[1:a]volume=0.150,atrim=0:42.000"));
    }
}
