use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Serialize;
use tempfile::TempDir;
use tokio::sync::Mutex;

use crate::error::{ConvertError, Result};
use crate::ffmpeg::{self, FFMPEG_NAME, FFPROBE_NAME};
use crate::progress::ProgressSender;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Uninitialized,
    Ready,
    Failed(String),
}

/// A conversion engine with its own addressable scratch storage.
///
/// `initialize` must succeed before any other call and is a no-op once the
/// engine is ready. Callers run one `execute` at a time.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn initialize(&self) -> Result<()>;

    async fn state(&self) -> EngineState;

    async fn write_input(&self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Runs one command. Fractions in `[0, 1]` go to `progress`, which is
    /// dropped when the call returns.
    async fn execute(&self, args: &[String], progress: ProgressSender) -> Result<()>;

    async fn read_output(&self, name: &str) -> Result<Vec<u8>>;

    async fn remove(&self, name: &str) -> Result<()>;
}

struct Workspace {
    dir: TempDir,
    ffmpeg: PathBuf,
}

enum Engine {
    Uninitialized,
    Ready(Workspace),
    Failed(String),
}

/// Drives a local ffmpeg binary inside a private temporary directory.
pub struct FfmpegTranscoder {
    ffmpeg_override: Option<PathBuf>,
    ffprobe_override: Option<PathBuf>,
    engine: Mutex<Engine>,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_override: Option<PathBuf>, ffprobe_override: Option<PathBuf>) -> Self {
        FfmpegTranscoder {
            ffmpeg_override,
            ffprobe_override,
            engine: Mutex::new(Engine::Uninitialized),
        }
    }

    pub fn ffmpeg_path(&self) -> PathBuf {
        ffmpeg::locate_binary(FFMPEG_NAME, self.ffmpeg_override.as_deref())
    }

    pub fn ffprobe_path(&self) -> PathBuf {
        ffmpeg::locate_binary(FFPROBE_NAME, self.ffprobe_override.as_deref())
    }

    async fn workspace(&self) -> Result<(PathBuf, PathBuf)> {
        match &*self.engine.lock().await {
            Engine::Ready(ws) => Ok((ws.dir.path().to_path_buf(), ws.ffmpeg.clone())),
            Engine::Uninitialized => Err(ConvertError::EngineInit(String::from(
                "engine not initialized",
            ))),
            Engine::Failed(msg) => Err(ConvertError::EngineInit(msg.clone())),
        }
    }

    /// Best-effort duration for progress scaling: `-t` when present,
    /// otherwise a probe of the `-i` input. Stills usually have none.
    async fn expected_duration(&self, dir: &Path, args: &[String]) -> Option<f64> {
        let value_after = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
        };

        if let Some(t) = value_after("-t") {
            if let Ok(secs) = crate::timeline::parse_time(t) {
                if secs > 0.0 {
                    return Some(secs);
                }
            }
            if let Ok(secs) = t.parse::<f64>() {
                return Some(secs);
            }
        }

        let input = value_after("-i")?;
        match ffmpeg::probe_media(&self.ffprobe_path(), &dir.join(input)).await {
            Ok(info) => Some(info.duration),
            Err(e) => {
                debug!("no duration for {}: {}", input, e);
                None
            }
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        FfmpegTranscoder::new(None, None)
    }
}

fn scratch_name(name: &str) -> Result<&str> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ConvertError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid file name {:?}", name),
        )))
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn initialize(&self) -> Result<()> {
        let mut engine = self.engine.lock().await;
        if let Engine::Ready(_) = &*engine {
            return Ok(());
        }

        let ffmpeg_path = self.ffmpeg_path();
        let loaded = async {
            let version = ffmpeg::verify_binary(&ffmpeg_path).await?;
            let dir = tempfile::Builder::new().prefix("media-converter-").tempdir()?;
            Ok::<_, ConvertError>((version, dir))
        }
        .await;

        match loaded {
            Ok((version, dir)) => {
                info!("engine ready: {} (scratch {})", version, dir.path().display());
                *engine = Engine::Ready(Workspace { dir, ffmpeg: ffmpeg_path });
                Ok(())
            }
            Err(e) => {
                warn!("engine initialization failed: {}", e);
                *engine = Engine::Failed(e.to_string());
                Err(match e {
                    ConvertError::EngineInit(msg) => ConvertError::EngineInit(msg),
                    other => ConvertError::EngineInit(other.to_string()),
                })
            }
        }
    }

    async fn state(&self) -> EngineState {
        match &*self.engine.lock().await {
            Engine::Uninitialized => EngineState::Uninitialized,
            Engine::Ready(_) => EngineState::Ready,
            Engine::Failed(msg) => EngineState::Failed(msg.clone()),
        }
    }

    async fn write_input(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let (dir, _) = self.workspace().await?;
        let path = dir.join(scratch_name(name)?);
        tokio::fs::write(&path, bytes).await?;
        debug!("wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    async fn execute(&self, args: &[String], progress: ProgressSender) -> Result<()> {
        let (dir, ffmpeg_path) = self.workspace().await?;
        let total = self.expected_duration(&dir, args).await;
        ffmpeg::run_ffmpeg_with_progress(&ffmpeg_path, &dir, args, total, move |f| {
            let _ = progress.send(f);
        })
        .await
    }

    async fn read_output(&self, name: &str) -> Result<Vec<u8>> {
        let (dir, _) = self.workspace().await?;
        let path = dir.join(scratch_name(name)?);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ConvertError::MissingOutput(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let (dir, _) = self.workspace().await?;
        match tokio::fs::remove_file(dir.join(scratch_name(name)?)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::progress_channel;

    fn missing_binary() -> FfmpegTranscoder {
        FfmpegTranscoder::new(Some(PathBuf::from("/nonexistent/ffmpeg-binary")), None)
    }

    #[tokio::test]
    async fn starts_uninitialized() {
        let t = missing_binary();
        assert_eq!(t.state().await, EngineState::Uninitialized);
        assert!(matches!(t.write_input("a.png", b"x").await, Err(ConvertError::EngineInit(_))));
    }

    #[tokio::test]
    async fn failed_init_is_reported_and_retryable() {
        let t = missing_binary();
        assert!(matches!(t.initialize().await, Err(ConvertError::EngineInit(_))));
        assert!(matches!(t.state().await, EngineState::Failed(_)));
        assert!(t.initialize().await.is_err());
        let (tx, _rx) = progress_channel();
        assert!(t.execute(&[], tx).await.is_err());
    }

    #[test]
    fn scratch_names_are_flattened() {
        assert_eq!(scratch_name("../../x.png").unwrap(), "x.png");
        assert_eq!(scratch_name("clip.mp4").unwrap(), "clip.mp4");
        assert!(scratch_name("..").is_err());
    }
}
