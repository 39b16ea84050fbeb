use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::info;

use crate::error::Result;

/// Hands converted bytes to the user under `filename`.
#[async_trait]
pub trait DownloadSink: Send + Sync {
    async fn save(&self, filename: &str, mime_type: &str, bytes: &[u8]) -> Result<()>;
}

/// Saves into a directory, replacing files of the same name.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirectorySink { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        // never let a name escape the output directory
        let base = Path::new(filename)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "download".into());
        self.dir.join(base)
    }
}

#[async_trait]
impl DownloadSink for DirectorySink {
    async fn save(&self, filename: &str, mime_type: &str, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(filename);
        tokio::fs::write(&path, bytes).await?;
        info!("saved {} ({}, {} bytes)", path.display(), mime_type, bytes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("out"));
        sink.save("converted_a.png", "image/png", b"png").await.unwrap();
        sink.save("converted_a.png", "image/png", b"png2").await.unwrap();
        let saved = tokio::fs::read(dir.path().join("out/converted_a.png")).await.unwrap();
        assert_eq!(saved, b"png2");
    }

    #[test]
    fn strips_directories_from_names() {
        let sink = DirectorySink::new("/tmp/out");
        assert_eq!(sink.path_for("../../etc/passwd"), PathBuf::from("/tmp/out/passwd"));
    }
}
