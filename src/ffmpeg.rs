use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;

use log::{debug, trace};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::error::{ConvertError, Result};

#[cfg(target_os = "windows")]
pub const FFMPEG_NAME: &str = "ffmpeg.exe";
#[cfg(target_os = "windows")]
pub const FFPROBE_NAME: &str = "ffprobe.exe";

#[cfg(not(target_os = "windows"))]
pub const FFMPEG_NAME: &str = "ffmpeg";
#[cfg(not(target_os = "windows"))]
pub const FFPROBE_NAME: &str = "ffprobe";

const STDERR_TAIL: usize = 2048;

/// Resolution order: explicit override, the `ffmpeg/` directory shipped
/// next to a development build, then whatever is on `PATH`.
pub fn locate_binary(name: &str, override_path: Option<&Path>) -> PathBuf {
    if let Some(path) = override_path {
        return path.to_path_buf();
    }

    if let Ok(exe_path) = std::env::current_exe() {
        // target/debug/<exe> -> <crate>/ffmpeg/<name>
        if let Some(target_dir) = exe_path.parent() {
            let dev_path = target_dir.join("..").join("..").join("ffmpeg").join(name);
            if dev_path.exists() {
                return dev_path.canonicalize().unwrap_or(dev_path);
            }
        }
    }

    PathBuf::from(name)
}

fn command(binary: &Path) -> Command {
    let mut cmd = Command::new(binary);

    #[cfg(target_os = "windows")]
    {
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
    }

    cmd.kill_on_drop(true);
    cmd
}

/// Runs `<binary> -version`; anything but a clean exit is an init failure.
pub async fn verify_binary(binary: &Path) -> Result<String> {
    let output = command(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| ConvertError::EngineInit(format!("failed to run {:?}: {}", binary, e)))?;

    if !output.status.success() {
        return Err(ConvertError::EngineInit(format!(
            "{:?} -version exited with {:?}",
            binary,
            output.status.code()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or_default().to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
}

pub async fn probe_media(ffprobe: &Path, input: &Path) -> Result<MediaInfo> {
    let output = command(ffprobe)
        .args([
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries", "stream=width,height,r_frame_rate,duration",
            "-show_entries", "format=duration",
            "-of", "csv=p=0",
        ])
        .arg(input)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| ConvertError::Probe(format!("failed to run {:?}: {}", ffprobe, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ConvertError::Probe(format!(
            "ffprobe exited with {:?}: {}",
            output.status.code(),
            stderr.trim()
        )));
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parses `csv=p=0` output: a `width,height,fps[,duration]` stream line and
/// a bare format-duration line. The stream duration wins when both exist.
pub fn parse_probe_output(stdout: &str) -> Result<MediaInfo> {
    let mut width = 0u32;
    let mut height = 0u32;
    let mut duration = 0.0f64;

    for line in stdout.trim().lines() {
        let parts: Vec<&str> = line.trim().trim_end_matches(',').split(',').collect();

        if parts.len() >= 3 {
            if let Ok(w) = parts[0].parse::<u32>() {
                width = w;
            }
            if let Ok(h) = parts[1].parse::<u32>() {
                height = h;
            }
            if parts.len() >= 4 {
                if let Ok(d) = parts[3].parse::<f64>() {
                    duration = d;
                }
            }
        }

        if parts.len() == 1 {
            if let Ok(d) = parts[0].parse::<f64>() {
                if duration == 0.0 {
                    duration = d;
                }
            }
        }
    }

    if duration <= 0.0 {
        return Err(ConvertError::Probe(String::from("could not determine media duration")));
    }

    Ok(MediaInfo { duration, width, height })
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressLine {
    OutTime(f64),
    End,
    Other,
}

fn out_time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^out_time_us=(\d+)$").unwrap())
}

pub fn parse_progress_line(line: &str) -> ProgressLine {
    let line = line.trim();
    if line == "progress=end" {
        return ProgressLine::End;
    }
    match out_time_regex().captures(line) {
        Some(caps) => match caps[1].parse::<f64>() {
            Ok(us) => ProgressLine::OutTime(us / 1_000_000.0),
            Err(_) => ProgressLine::Other,
        },
        None => ProgressLine::Other,
    }
}

pub fn fraction(current: f64, total: f64) -> f64 {
    if total <= 0.0 || !current.is_finite() {
        return 0.0;
    }
    (current / total).clamp(0.0, 1.0)
}

/// Runs ffmpeg in `cwd` and reports completion fractions in `[0, 1]`.
/// Without a known `total` only the final `1.0` is reported.
pub async fn run_ffmpeg_with_progress<F: FnMut(f64) + Send>(
    ffmpeg_path: &Path,
    cwd: &Path,
    args: &[String],
    total: Option<f64>,
    mut on_progress: F,
) -> Result<()> {
    let mut full_args: Vec<String> = ["-hide_banner", "-nostats", "-progress", "pipe:1"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    full_args.extend(args.iter().cloned());

    debug!("ffmpeg {}", full_args.join(" "));

    let mut child = command(ffmpeg_path)
        .args(&full_args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ConvertError::Execution {
            code: None,
            stderr: format!("failed to spawn ffmpeg: {}", e),
        })?;

    let stdout = child.stdout.take().ok_or(ConvertError::Execution {
        code: None,
        stderr: String::from("failed to capture stdout"),
    })?;

    // Drain stderr alongside stdout so a chatty encoder can't fill the pipe.
    let stderr_task = child.stderr.take().map(|mut stderr| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).to_string()
        })
    });

    let mut reader = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        match parse_progress_line(&line) {
            ProgressLine::OutTime(seconds) => {
                if let Some(total) = total {
                    let f = fraction(seconds, total);
                    trace!("ffmpeg progress {:.3}", f);
                    on_progress(f);
                }
            }
            ProgressLine::End => on_progress(1.0),
            ProgressLine::Other => (),
        }
    }

    let status = child.wait().await?;
    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    if !status.success() {
        return Err(ConvertError::Execution {
            code: status.code(),
            stderr: tail(&stderr, STDERR_TAIL),
        });
    }

    Ok(())
}

fn tail(s: &str, max: usize) -> String {
    let trimmed = s.trim();
    if trimmed.len() <= max {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - max;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}

/// Grabs the frame at `timestamp` scaled to `width`x`height` as JPEG bytes.
pub async fn extract_frame(
    ffmpeg_path: &Path,
    input: &Path,
    timestamp: f64,
    width: u32,
    height: u32,
) -> Result<Vec<u8>> {
    let dir = tempfile::tempdir()?;
    let frame_path = dir.path().join("frame.jpg");
    let timestamp_str = format!("{:.3}", timestamp);
    let scale = format!("scale={}:{}", width.max(2), height.max(2));

    let output = command(ffmpeg_path)
        .args(["-hide_banner", "-loglevel", "error", "-ss", &timestamp_str, "-i"])
        .arg(input)
        .args(["-vframes", "1", "-vf", &scale, "-q:v", "5", "-y"])
        .arg(&frame_path)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(ConvertError::Execution {
            code: output.status.code(),
            stderr: tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL),
        });
    }

    Ok(tokio::fs::read(&frame_path).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins() {
        let p = locate_binary(FFMPEG_NAME, Some(Path::new("/opt/ff/ffmpeg")));
        assert_eq!(p, PathBuf::from("/opt/ff/ffmpeg"));
    }

    #[test]
    fn parses_stream_and_format_lines() {
        let info = parse_probe_output("1920,1080,30000/1001,12.512000\n12.600000\n").unwrap();
        assert_eq!(info, MediaInfo { duration: 12.512, width: 1920, height: 1080 });

        let info = parse_probe_output("640,480,25/1,N/A\n45.000000\n").unwrap();
        assert_eq!(info.duration, 45.0);
        assert_eq!(info.width, 640);

        assert!(parse_probe_output("").is_err());
    }

    #[test]
    fn progress_lines() {
        assert_eq!(parse_progress_line("out_time_us=2500000"), ProgressLine::OutTime(2.5));
        assert_eq!(parse_progress_line("progress=end"), ProgressLine::End);
        assert_eq!(parse_progress_line("progress=continue"), ProgressLine::Other);
        assert_eq!(parse_progress_line("out_time_us=N/A"), ProgressLine::Other);
    }

    #[test]
    fn fraction_is_clamped() {
        assert_eq!(fraction(5.0, 10.0), 0.5);
        assert_eq!(fraction(15.0, 10.0), 1.0);
        assert_eq!(fraction(1.0, 0.0), 0.0);
    }

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail("  abcdef  ", 3), "def");
        assert_eq!(tail("abc", 10), "abc");
    }
}
