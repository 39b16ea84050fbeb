use std::sync::{Arc, Mutex, PoisonError};

use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::watch;

use crate::download::DownloadSink;
use crate::error::{ConvertError, Result};
use crate::formats::VideoFormat;
use crate::input::{accept_files, InputFile};
use crate::job::{execute_with_progress, SingleFlight};
use crate::notify::{Notification, Notifier};
use crate::presets::Preset;
use crate::progress::{percent, SingleProgress};
use crate::timeline::{
    self, FrameSource, StripLayout, ThumbnailStrip, TrimRange, DEFAULT_TRIM_WINDOW,
};
use crate::transcoder::Transcoder;

pub const DEFAULT_QUALITY: u8 = 80;

/// Slider upper bound while the source duration is still unknown.
const UNKNOWN_DURATION_BOUND: f64 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub struct VideoJobParams {
    pub target_format: VideoFormat,
    pub quality: u8,
    pub preset: Option<Preset>,
    pub remove_audio: bool,
    /// Whole seconds; zero until known.
    pub media_duration: f64,
    pub trim: TrimRange,
}

impl Default for VideoJobParams {
    fn default() -> Self {
        VideoJobParams {
            target_format: VideoFormat::default(),
            quality: DEFAULT_QUALITY,
            preset: None,
            remove_audio: false,
            media_duration: 0.0,
            trim: TrimRange::default(),
        }
    }
}

impl VideoJobParams {
    /// `round((100 - q) / 2)`: quality 100 is rate 0, quality 0 is rate 50.
    pub fn compression_rate(&self) -> u8 {
        let q = self.quality.min(100);
        (100 - q + 1) / 2
    }
}

/// What the UI needs after the trim range moves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrimUpdate {
    pub start_time: String,
    pub duration: String,
    /// Where the live preview should seek, when the lower bound moved.
    pub seek_to: Option<f64>,
}

/// Argument list for one video conversion, in this order: input, trim,
/// preset or quality, audio removal, forced overwrite of the output.
pub fn build_video_args(input: &str, output: &str, params: &VideoJobParams) -> Vec<String> {
    let mut args = vec!["-i".to_string(), input.to_string()];

    args.extend(params.trim.args(params.media_duration));

    match params.preset {
        Some(preset) => args.extend(preset.args()),
        None => {
            args.push("-c:v".to_string());
            args.push("libx264".to_string());
            args.push("-crf".to_string());
            args.push(params.compression_rate().to_string());
        }
    }

    if params.remove_audio {
        args.push("-an".to_string());
    }

    args.push("-y".to_string());
    args.push(output.to_string());
    args
}

#[derive(Debug, Default)]
struct Selection {
    file: Option<InputFile>,
    params: VideoJobParams,
}

/// Converts one video at a time with optional trim, preset and audio removal.
pub struct VideoConverter<T: Transcoder + ?Sized> {
    engine: Arc<T>,
    sink: Arc<dyn DownloadSink>,
    notifier: Arc<dyn Notifier>,
    trim_window: f64,
    strip: StripLayout,
    selection: Mutex<Selection>,
    progress: SingleProgress,
    flight: SingleFlight,
}

impl<T: Transcoder + ?Sized> VideoConverter<T> {
    pub fn new(engine: Arc<T>, sink: Arc<dyn DownloadSink>, notifier: Arc<dyn Notifier>) -> Self {
        VideoConverter {
            engine,
            sink,
            notifier,
            trim_window: DEFAULT_TRIM_WINDOW,
            strip: StripLayout::default(),
            selection: Mutex::new(Selection::default()),
            progress: SingleProgress::new(),
            flight: SingleFlight::new(),
        }
    }

    pub fn with_trim_window(mut self, seconds: f64) -> Self {
        self.trim_window = seconds;
        self
    }

    pub fn with_strip_layout(mut self, strip: StripLayout) -> Self {
        self.strip = strip;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Selection> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the single file of a drop. Format goes back to mp4, any preset
    /// is cleared and the trim range waits for the new file's duration.
    pub fn select_files(&self, files: Vec<InputFile>) -> Result<()> {
        let mut accepted = accept_files(files, &VideoFormat::extensions(), 1)?;
        let file = accepted.remove(0);
        info!("selected {} ({} bytes)", file.name(), file.size());

        let mut selection = self.lock();
        selection.file = Some(file);
        selection.params.target_format = VideoFormat::default();
        selection.params.preset = None;
        selection.params.media_duration = 0.0;
        selection.params.trim = TrimRange { start: 0.0, end: self.trim_window };
        Ok(())
    }

    pub fn select_file(&self, file: InputFile) -> Result<()> {
        self.select_files(vec![file])
    }

    /// Called once the source's metadata is known. Resets the trim range to
    /// the head of the new source.
    pub fn set_media_duration(&self, seconds: f64) -> TrimUpdate {
        let duration = if seconds.is_finite() && seconds > 0.0 {
            seconds.floor()
        } else {
            0.0
        };
        let mut selection = self.lock();
        selection.params.media_duration = duration;
        selection.params.trim = timeline::default_trim_range(duration, self.trim_window);
        let trim = selection.params.trim;
        TrimUpdate {
            start_time: trim.start_time(),
            duration: trim.duration_time(),
            seek_to: None,
        }
    }

    /// Moves the trim range. Zero-length ranges are rejected.
    pub fn set_trim_range(&self, start: f64, end: f64) -> Result<TrimUpdate> {
        let mut selection = self.lock();
        let bound = match selection.params.media_duration {
            d if d > 0.0 => d,
            _ => UNKNOWN_DURATION_BOUND,
        };
        let trim = TrimRange::new(start, end, bound)?;
        if trim.length() <= 0.0 {
            return Err(ConvertError::InvalidTrimRange {
                start,
                end,
                duration: bound,
            });
        }
        let moved = trim.start != selection.params.trim.start;
        selection.params.trim = trim;
        Ok(TrimUpdate {
            start_time: trim.start_time(),
            duration: trim.duration_time(),
            seek_to: if moved { Some(trim.start) } else { None },
        })
    }

    /// Forces the preset's format and puts quality back to its default.
    pub fn apply_preset(&self, preset: Preset) {
        let mut selection = self.lock();
        selection.params.preset = Some(preset);
        selection.params.target_format = preset.format();
        selection.params.quality = DEFAULT_QUALITY;
    }

    pub fn clear_preset(&self) {
        self.lock().params.preset = None;
    }

    pub fn set_target_format(&self, format: VideoFormat) {
        self.lock().params.target_format = format;
    }

    pub fn set_quality(&self, quality: u8) -> Result<()> {
        if quality > 100 {
            return Err(ConvertError::InvalidQuality(quality));
        }
        self.lock().params.quality = quality;
        Ok(())
    }

    pub fn set_remove_audio(&self, remove: bool) {
        self.lock().params.remove_audio = remove;
    }

    pub fn params(&self) -> VideoJobParams {
        self.lock().params.clone()
    }

    pub fn file_name(&self) -> Option<String> {
        self.lock().file.as_ref().map(|f| f.name().to_string())
    }

    pub fn is_converting(&self) -> bool {
        self.flight.is_busy()
    }

    pub fn progress(&self) -> u8 {
        self.progress.get()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<u8> {
        self.progress.subscribe()
    }

    pub async fn generate_thumbnails<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
    ) -> Result<ThumbnailStrip> {
        let duration = self.lock().params.media_duration;
        timeline::generate_thumbnails(source, duration, self.strip).await
    }

    /// Converts the selected file and hands the result to the download sink.
    /// Returns the saved file name.
    pub async fn convert(&self) -> Result<String> {
        let (file, params) = {
            let selection = self.lock();
            (selection.file.clone(), selection.params.clone())
        };
        let file = file.ok_or(ConvertError::NoInput)?;

        let _guard = self.flight.acquire()?;

        if let Err(e) = self.engine.initialize().await {
            error!("error loading engine: {}", e);
            self.notifier.notify(Notification::engine_unavailable());
            return Err(e);
        }

        self.progress.reset();
        let result = self.run(&file, &params).await;
        self.progress.reset();

        match result {
            Ok(saved) => {
                self.notifier.notify(Notification::success(
                    "Your video has been converted successfully.",
                ));
                Ok(saved)
            }
            Err(e) => {
                error!("error during video conversion: {}", e);
                self.notifier.notify(Notification::failure(
                    "Failed to convert video. Please try again.",
                ));
                Err(e)
            }
        }
    }

    async fn run(&self, file: &InputFile, params: &VideoJobParams) -> Result<String> {
        let format = params.target_format;
        let output = format!("output.{}", format.extension());
        let args = build_video_args(file.name(), &output, params);
        info!("converting {} -> {}", file.name(), output);

        let result = async {
            self.engine.write_input(file.name(), file.bytes()).await?;
            execute_with_progress(self.engine.as_ref(), &args, |f| {
                self.progress.set(percent(f))
            })
            .await?;
            let bytes = self.engine.read_output(&output).await?;
            let download = file.download_name(format.extension());
            self.sink.save(&download, &format.mime_type(), &bytes).await?;
            Ok::<_, ConvertError>(download)
        }
        .await;

        for name in [file.name(), output.as_str()] {
            if let Err(e) = self.engine.remove(name).await {
                warn!("could not clean up {}: {}", name, e);
            }
        }

        result
    }
}
