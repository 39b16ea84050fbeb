use std::sync::{Arc, Mutex, PoisonError};

use log::{error, info, warn};
use tokio::sync::watch;

use crate::download::DownloadSink;
use crate::error::{ConvertError, Result};
use crate::formats::ImageFormat;
use crate::input::{accept_files, InputFile};
use crate::job::{execute_with_progress, SingleFlight};
use crate::notify::{Notification, Notifier};
use crate::progress::{percent, BatchProgress};
use crate::transcoder::Transcoder;

pub const MAX_IMAGE_FILES: usize = 10;
pub const DEFAULT_QUALITY: u8 = 80;

#[derive(Debug, Clone, PartialEq)]
pub struct ImageJobParams {
    pub target_format: Option<ImageFormat>,
    pub quality: u8,
}

impl Default for ImageJobParams {
    fn default() -> Self {
        ImageJobParams {
            target_format: None,
            quality: DEFAULT_QUALITY,
        }
    }
}

#[derive(Debug, Default)]
struct Selection {
    files: Vec<InputFile>,
    params: ImageJobParams,
}

pub fn image_args(input: &str, output: &str, quality: u8) -> Vec<String> {
    let mut args: Vec<String> = Vec::with_capacity(6);
    args.push("-i".to_string());
    args.push(input.to_string());
    args.push("-quality".to_string());
    args.push(quality.to_string());
    args.push("-y".to_string());
    args.push(output.to_string());
    args
}

/// Converts a batch of still images one after another on a shared engine.
pub struct ImageConverter<T: Transcoder + ?Sized> {
    engine: Arc<T>,
    sink: Arc<dyn DownloadSink>,
    notifier: Arc<dyn Notifier>,
    max_files: usize,
    selection: Mutex<Selection>,
    progress: BatchProgress,
    flight: SingleFlight,
}

impl<T: Transcoder + ?Sized> ImageConverter<T> {
    pub fn new(engine: Arc<T>, sink: Arc<dyn DownloadSink>, notifier: Arc<dyn Notifier>) -> Self {
        ImageConverter {
            engine,
            sink,
            notifier,
            max_files: MAX_IMAGE_FILES,
            selection: Mutex::new(Selection::default()),
            progress: BatchProgress::new(0),
            flight: SingleFlight::new(),
        }
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    pub fn with_default_quality(self, quality: u8) -> Self {
        self.lock().params.quality = quality.min(100);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Selection> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the current selection. The target format goes back to jpg
    /// and every progress slot to zero.
    pub fn select_files(&self, files: Vec<InputFile>) -> Result<usize> {
        let accepted = accept_files(files, &ImageFormat::extensions(), self.max_files)?;
        let count = accepted.len();
        {
            let mut selection = self.lock();
            selection.files = accepted;
            selection.params.target_format = Some(ImageFormat::default());
        }
        self.progress.reset(count);
        info!("selected {} image(s)", count);
        Ok(count)
    }

    pub fn set_target_format(&self, format: ImageFormat) {
        self.lock().params.target_format = Some(format);
    }

    pub fn set_quality(&self, quality: u8) -> Result<()> {
        if quality > 100 {
            return Err(ConvertError::InvalidQuality(quality));
        }
        self.lock().params.quality = quality;
        Ok(())
    }

    pub fn params(&self) -> ImageJobParams {
        self.lock().params.clone()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.lock().files.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn is_converting(&self) -> bool {
        self.flight.is_busy()
    }

    pub fn progress(&self) -> Vec<u8> {
        self.progress.snapshot()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<Vec<u8>> {
        self.progress.subscribe()
    }

    /// Converts every selected file in order and hands each result to the
    /// download sink. Returns the saved file names.
    pub async fn convert(&self) -> Result<Vec<String>> {
        let (files, params) = {
            let selection = self.lock();
            (selection.files.clone(), selection.params.clone())
        };
        if files.is_empty() {
            return Err(ConvertError::NoInput);
        }
        let format = params.target_format.ok_or(ConvertError::NoInput)?;

        let _guard = self.flight.acquire()?;

        if let Err(e) = self.engine.initialize().await {
            error!("error loading engine: {}", e);
            self.notifier.notify(Notification::engine_unavailable());
            return Err(e);
        }

        self.progress.reset(files.len());
        let result = self.run_batch(&files, format, params.quality).await;
        self.progress.reset(files.len());

        match result {
            Ok(saved) => {
                self.notifier.notify(Notification::success(
                    "Your images have been converted successfully.",
                ));
                Ok(saved)
            }
            Err(e) => {
                error!("error during image conversion: {}", e);
                let mut description = String::from("Failed to convert images. Please try again.");
                if let ConvertError::BatchAborted { completed, .. } = &e {
                    if *completed > 0 {
                        description.push_str(&format!(
                            " {} of {} images were saved before the error.",
                            completed,
                            files.len()
                        ));
                    }
                }
                self.notifier.notify(Notification::failure(description));
                Err(e)
            }
        }
    }

    async fn run_batch(
        &self,
        files: &[InputFile],
        format: ImageFormat,
        quality: u8,
    ) -> Result<Vec<String>> {
        let mut saved = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            match self.convert_one(index, file, format, quality).await {
                Ok(name) => saved.push(name),
                Err(e) => {
                    return Err(ConvertError::BatchAborted {
                        index,
                        completed: saved.len(),
                        source: Box::new(e),
                    })
                }
            }
        }
        Ok(saved)
    }

    async fn convert_one(
        &self,
        index: usize,
        file: &InputFile,
        format: ImageFormat,
        quality: u8,
    ) -> Result<String> {
        let output = format!("output_{}.{}", index, format.extension());
        info!("converting {} -> {}", file.name(), output);

        let result = async {
            self.engine.write_input(file.name(), file.bytes()).await?;
            let args = image_args(file.name(), &output, quality);
            execute_with_progress(self.engine.as_ref(), &args, |f| {
                self.progress.set(index, percent(f))
            })
            .await?;
            let bytes = self.engine.read_output(&output).await?;
            let download = file.batch_download_name(index, format.extension());
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
