use std::{path::Path, process::Command};

use crate::error::{WitsError, WitsResult};

/// Probed properties of the template clip's first video stream.
#[derive(Clone, Debug)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub duration_sec: f64,
}

impl VideoInfo {
    pub fn fps(&self) -> f64 {
        if self.fps_den == 0 {
            0.0
        } else {
            f64::from(self.fps_num) / f64::from(self.fps_den)
        }
    }
}

pub fn ffmpeg_tools_available() -> bool {
    let check = |bin: &str| {
        Command::new(bin)
            .arg("-version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    };
    check("ffmpeg") && check("ffprobe")
}

pub fn probe_video(source_path: &Path) -> WitsResult<VideoInfo> {
    let parsed = run_ffprobe(source_path)?;
    let video_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| {
            WitsError::assembly(format!("no video stream in '{}'", source_path.display()))
        })?;

    let width = video_stream
        .width
        .ok_or_else(|| WitsError::assembly("missing video width from ffprobe"))?;
    let height = video_stream
        .height
        .ok_or_else(|| WitsError::assembly("missing video height from ffprobe"))?;
    let (fps_num, fps_den) = parse_ff_ratio(video_stream.r_frame_rate.as_deref().unwrap_or("0/1"))
        .ok_or_else(|| WitsError::assembly("invalid video r_frame_rate"))?;

    Ok(VideoInfo {
        width,
        height,
        fps_num,
        fps_den,
        duration_sec: container_duration(&parsed),
    })
}

/// Container duration in seconds, for the audio track.
pub fn probe_duration(source_path: &Path) -> WitsResult<f64> {
    let parsed = run_ffprobe(source_path)?;
    let duration = container_duration(&parsed);
    if duration <= 0.0 {
        return Err(WitsError::assembly(format!(
            "ffprobe reported no duration for '{}'",
            source_path.display()
        )));
    }
    Ok(duration)
}

#[derive(serde::Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

#[derive(serde::Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(serde::Deserialize)]
struct ProbeOut {
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

fn run_ffprobe(source_path: &Path) -> WitsResult<ProbeOut> {
    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(source_path)
        .output()
        .map_err(|e| WitsError::assembly(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(WitsError::assembly(format!(
            "ffprobe failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    serde_json::from_slice(&out.stdout)
        .map_err(|e| WitsError::assembly(format!("ffprobe json parse failed: {e}")))
}

fn container_duration(parsed: &ProbeOut) -> f64 {
    parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let (num, den) = s.split_once('/')?;
    let num = num.trim().parse::<u32>().ok()?;
    let den = den.trim().parse::<u32>().ok()?;
    if den == 0 { None } else { Some((num, den)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rational_frame_rates() {
        assert_eq!(parse_ff_ratio("30/1"), Some((30, 1)));
        assert_eq!(parse_ff_ratio("30000/1001"), Some((30_000, 1001)));
        assert_eq!(parse_ff_ratio("0/0"), None);
        assert_eq!(parse_ff_ratio("thirty"), None);
    }

    #[test]
    fn fps_handles_zero_denominator() {
        let info = VideoInfo {
            width: 64,
            height: 64,
            fps_num: 30,
            fps_den: 0,
            duration_sec: 1.0,
        };
        assert_eq!(info.fps(), 0.0);
    }
}
