use std::path::Path;
use std::sync::Arc;

use crate::error::{ConvertError, Result};

/// A user-supplied file. The bytes are shared so snapshots taken for a
/// conversion run don't copy the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    name: String,
    bytes: Arc<[u8]>,
}

impl InputFile {
    /// Only the base name is kept; directories in `name` are dropped.
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        InputFile {
            name: base_name(&name.into()),
            bytes: Arc::from(bytes),
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                ConvertError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{:?} has no file name", path),
                ))
            })?;
        let bytes = tokio::fs::read(path).await?;
        Ok(InputFile::new(name, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Everything before the first dot, so `clip.final.mov` becomes `clip`.
    pub fn stem(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }

    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }

    pub fn download_name(&self, extension: &str) -> String {
        format!("converted_{}.{}", self.stem(), extension)
    }

    /// Download name for the `index`th file of a batch. Unique within the
    /// batch even when two inputs share a stem.
    pub fn batch_download_name(&self, index: usize, extension: &str) -> String {
        format!("converted_{}_{}.{}", self.stem(), index, extension)
    }
}

fn base_name(name: &str) -> String {
    match name.rsplit(|c| c == '/' || c == '\\').next() {
        Some(base) if !base.is_empty() && base != "." && base != ".." => base.to_string(),
        _ => String::from("input"),
    }
}

/// Filters a drop down to the allowed extensions, preserving order.
/// A drop with more than `max` acceptable files is rejected outright.
pub fn accept_files(
    files: Vec<InputFile>,
    allow_list: &[&str],
    max: usize,
) -> Result<Vec<InputFile>> {
    let accepted: Vec<InputFile> = files
        .into_iter()
        .filter(|f| match f.extension() {
            Some(ext) => allow_list.iter().any(|a| a.eq_ignore_ascii_case(&ext)),
            None => false,
        })
        .collect();

    if accepted.is_empty() {
        return Err(ConvertError::NoInput);
    }

    if accepted.len() > max {
        return Err(ConvertError::TooManyFiles {
            max,
            got: accepted.len(),
        });
    }

    Ok(accepted)
}
