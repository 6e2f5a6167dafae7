use std::{path::Path, process::Command};

use anyhow::Context as _;
use image::RgbaImage;

use crate::{
    config::Assets,
    error::{WitsError, WitsResult},
    media::{self, VideoInfo},
};

/// Build the output video: template clip, then the overlaid frame held for
/// the remainder of the audio track, with the audio bound on top.
///
/// The frame is written to a scratch PNG and a single `ffmpeg` invocation
/// scales it to the template's resolution and frame rate, concatenates
/// [template, frame] and encodes H.264/AAC at the fastest preset. Encoding
/// goes to `<out>.tmp` and is renamed into place, so a concurrent reader of
/// `out_path` never sees a truncated file.
pub fn assemble(assets: &Assets, frame: &RgbaImage, out_path: &Path) -> WitsResult<()> {
    let clip = media::probe_video(&assets.template_video)?;
    let audio_sec = media::probe_duration(&assets.audio)?;
    let still_sec = still_duration(audio_sec, clip.duration_sec)?;

    let scratch = out_path.with_extension("frame.png");
    let tmp = out_path.with_extension("mp4.tmp");

    frame
        .save_with_format(&scratch, image::ImageFormat::Png)
        .with_context(|| format!("write scratch frame '{}'", scratch.display()))?;

    let args = build_ffmpeg_args(
        &clip,
        audio_sec,
        still_sec,
        &assets.template_video,
        &scratch,
        &assets.audio,
        &tmp,
    );

    tracing::info!(
        clip_sec = clip.duration_sec,
        audio_sec,
        still_sec,
        out = %out_path.display(),
        "assembling video"
    );

    let result = run_ffmpeg(&args);
    let _ = std::fs::remove_file(&scratch);

    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }

    std::fs::rename(&tmp, out_path)
        .with_context(|| format!("move encoded video into '{}'", out_path.display()))?;
    Ok(())
}

/// How long the overlaid frame is held on screen. The audio track must be
/// strictly longer than the template clip; anything else is rejected rather
/// than silently producing a negative or empty still segment.
fn still_duration(audio_sec: f64, clip_sec: f64) -> WitsResult<f64> {
    let still = audio_sec - clip_sec;
    if still <= 0.0 {
        return Err(WitsError::validation(format!(
            "audio track ({audio_sec:.3}s) must be longer than the template clip ({clip_sec:.3}s)"
        )));
    }
    Ok(still)
}

fn build_ffmpeg_args(
    clip: &VideoInfo,
    audio_sec: f64,
    still_sec: f64,
    template: &Path,
    scratch: &Path,
    audio: &Path,
    tmp_out: &Path,
) -> Vec<String> {
    let fps = format!("{}/{}", clip.fps_num, clip.fps_den);
    let graph = format!(
        "[1:v]scale={w}:{h}:flags=bicubic,setsar=1,fps={fps},format=yuv420p[still];\
         [0:v]setsar=1,format=yuv420p[head];\
         [head][still]concat=n=2:v=1:a=0[v]",
        w = clip.width,
        h = clip.height,
    );

    let mut args: Vec<String> = vec!["-y".into(), "-loglevel".into(), "error".into()];
    args.extend(["-i".into(), template.display().to_string()]);
    args.extend([
        "-loop".into(),
        "1".into(),
        "-framerate".into(),
        fps,
        "-t".into(),
        format!("{still_sec:.3}"),
        "-i".into(),
        scratch.display().to_string(),
    ]);
    args.extend(["-i".into(), audio.display().to_string()]);
    args.extend(["-filter_complex".into(), graph]);
    args.extend(["-map".into(), "[v]".into(), "-map".into(), "2:a".into()]);
    args.extend([
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "ultrafast".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
    ]);
    args.extend(["-c:a".into(), "aac".into()]);
    // Force the final duration to the audio's, truncating any overrun.
    args.extend(["-t".into(), format!("{audio_sec:.3}")]);
    args.extend(["-movflags".into(), "+faststart".into()]);
    args.extend(["-f".into(), "mp4".into(), tmp_out.display().to_string()]);
    args
}

fn run_ffmpeg(args: &[String]) -> WitsResult<()> {
    let out = Command::new("ffmpeg")
        .args(args)
        .output()
        .map_err(|e| WitsError::assembly(format!("failed to spawn ffmpeg: {e}")))?;
    if !out.status.success() {
        return Err(WitsError::assembly(format!(
            "ffmpeg exited with status {}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip() -> VideoInfo {
        VideoInfo {
            width: 640,
            height: 360,
            fps_num: 30,
            fps_den: 1,
            duration_sec: 3.0,
        }
    }

    #[test]
    fn audio_shorter_than_clip_is_rejected() {
        let err = still_duration(2.0, 3.0).unwrap_err();
        assert!(matches!(err, WitsError::Validation(_)));
        assert!(err.to_string().contains("2.000"));
        assert!(err.to_string().contains("3.000"));
    }

    #[test]
    fn audio_equal_to_clip_is_rejected() {
        assert!(still_duration(3.0, 3.0).is_err());
    }

    #[test]
    fn still_duration_is_the_remainder_after_the_clip() {
        assert_eq!(still_duration(10.0, 3.0).unwrap(), 7.0);
    }

    #[test]
    fn command_uses_fixed_codecs_and_fastest_preset() {
        let args = build_ffmpeg_args(
            &clip(),
            10.0,
            7.0,
            Path::new("intro.mp4"),
            Path::new("frame.png"),
            Path::new("audio.mp3"),
            Path::new("out.mp4.tmp"),
        );
        for expected in ["libx264", "aac", "ultrafast", "yuv420p", "+faststart"] {
            assert!(args.iter().any(|a| a == expected), "missing {expected}");
        }
    }

    #[test]
    fn command_concats_template_then_still_and_binds_audio() {
        let args = build_ffmpeg_args(
            &clip(),
            10.0,
            7.0,
            Path::new("intro.mp4"),
            Path::new("frame.png"),
            Path::new("audio.mp3"),
            Path::new("out.mp4.tmp"),
        );
        let graph = args
            .iter()
            .position(|a| a == "-filter_complex")
            .map(|i| args[i + 1].as_str())
            .unwrap();
        assert!(graph.contains("scale=640:360"));
        assert!(graph.contains("fps=30/1"));
        assert!(graph.contains("[head][still]concat=n=2"));

        // Inputs in order: template, still frame, audio.
        let inputs: Vec<_> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| *a == "-i")
            .map(|(i, _)| args[i + 1].as_str())
            .collect();
        assert_eq!(inputs, vec!["intro.mp4", "frame.png", "audio.mp3"]);
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "2:a"));

        // Final duration forced to the audio's.
        assert!(args.windows(2).any(|w| w[0] == "-t" && w[1] == "10.000"));
        // Still frame held for the remainder.
        assert!(args.windows(2).any(|w| w[0] == "-t" && w[1] == "7.000"));
    }
}
