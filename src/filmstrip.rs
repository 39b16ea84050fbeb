use std::path::PathBuf;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::Result;
use crate::ffmpeg;
use crate::timeline::{FrameSource, StripSlot, ThumbnailStrip};

/// Frame source over a file on disk; each capture is a single ffmpeg
/// frame grab at the last seek position.
pub struct FfmpegFrameSource {
    ffmpeg: PathBuf,
    input: PathBuf,
    position: f64,
}

impl FfmpegFrameSource {
    pub fn new(ffmpeg: PathBuf, input: PathBuf) -> Self {
        FfmpegFrameSource { ffmpeg, input, position: 0.0 }
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn seek(&mut self, timestamp: f64) -> Result<()> {
        self.position = timestamp.max(0.0);
        Ok(())
    }

    async fn capture(&mut self, slot: &StripSlot) -> Result<Vec<u8>> {
        let width = slot.width.floor() as u32;
        ffmpeg::extract_frame(&self.ffmpeg, &self.input, self.position, width, slot.height).await
    }
}

pub fn jpeg_data_url(bytes: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", BASE64.encode(bytes))
}

/// One data URL per slot; failed slots are empty strings.
pub fn data_urls(strip: &ThumbnailStrip) -> Vec<String> {
    strip
        .thumbnails
        .iter()
        .map(|t| t.image.as_deref().map(jpeg_data_url).unwrap_or_default())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{StripLayout, Thumbnail};

    #[test]
    fn encodes_frames_and_blanks() {
        let layout = StripLayout { width: 20, height: 4, count: 2 };
        let slots = layout.slots(10.0);
        let strip = ThumbnailStrip {
            layout,
            thumbnails: vec![
                Thumbnail { slot: slots[0], image: Some(vec![0xff, 0xd8]) },
                Thumbnail { slot: slots[1], image: None },
            ],
        };
        assert_eq!(
            data_urls(&strip),
            vec!["data:image/jpeg;base64,/9g=".to_string(), String::new()]
        );
    }

    #[tokio::test]
    async fn seek_clamps_negative_positions() {
        let mut source = FfmpegFrameSource::new(PathBuf::from("ffmpeg"), PathBuf::from("in.mp4"));
        source.seek(-4.0).await.unwrap();
        assert_eq!(source.position, 0.0);
    }
}
