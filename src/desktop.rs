use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use log::{error, info, warn};
use serde::Serialize;
use tauri::{Emitter, Manager};

use crate::config::AppConfig;
use crate::download::DirectorySink;
use crate::error::{ConvertError, Result};
use crate::ffmpeg;
use crate::filmstrip::{self, FfmpegFrameSource};
use crate::formats::{ImageFormat, VideoFormat};
use crate::image_job::ImageConverter;
use crate::input::InputFile;
use crate::notify::{LogNotifier, Notification, Notifier};
use crate::presets::Preset;
use crate::progress::ProgressPayload;
use crate::transcoder::FfmpegTranscoder;
use crate::video_job::{TrimUpdate, VideoConverter};

struct EventNotifier {
    app: tauri::AppHandle,
}

impl Notifier for EventNotifier {
    fn notify(&self, notification: Notification) {
        LogNotifier.notify(notification.clone());
        let _ = self.app.emit("notification", notification);
    }
}

pub struct DesktopState {
    images: ImageConverter<FfmpegTranscoder>,
    video: VideoConverter<FfmpegTranscoder>,
    video_engine: Arc<FfmpegTranscoder>,
    video_path: Mutex<Option<PathBuf>>,
}

impl DesktopState {
    fn new(app: &tauri::AppHandle, config: &AppConfig) -> Self {
        let sink = Arc::new(DirectorySink::new(config.output_dir.clone()));
        let notifier: Arc<dyn Notifier> = Arc::new(EventNotifier { app: app.clone() });

        // each converter owns its engine
        let engine = || {
            Arc::new(FfmpegTranscoder::new(
                config.ffmpeg_path.clone(),
                config.ffprobe_path.clone(),
            ))
        };
        let image_engine = engine();
        let video_engine = engine();

        let images = ImageConverter::new(image_engine, sink.clone(), notifier.clone())
            .with_max_files(config.max_image_files)
            .with_default_quality(config.default_quality);
        let video = VideoConverter::new(video_engine.clone(), sink, notifier)
            .with_trim_window(config.trim_window)
            .with_strip_layout(config.strip_layout());

        DesktopState {
            images,
            video,
            video_engine,
            video_path: Mutex::new(None),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSelection {
    pub name: String,
    pub size: u64,
    pub duration: f64,
    pub trim: TrimUpdate,
}

#[tauri::command]
async fn get_file_size(path: String) -> Result<u64> {
    Ok(tokio::fs::metadata(&path).await?.len())
}

#[tauri::command]
async fn select_images(state: tauri::State<'_, DesktopState>, paths: Vec<String>) -> Result<usize> {
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        files.push(InputFile::from_path(path).await?);
    }
    state.images.select_files(files)
}

#[tauri::command]
fn set_image_options(
    state: tauri::State<'_, DesktopState>,
    format: String,
    quality: u8,
) -> Result<()> {
    state.images.set_target_format(format.parse::<ImageFormat>()?);
    state.images.set_quality(quality)
}

#[tauri::command]
async fn convert_images(state: tauri::State<'_, DesktopState>) -> Result<Vec<String>> {
    state.images.convert().await
}

#[tauri::command]
async fn select_video(
    state: tauri::State<'_, DesktopState>,
    path: String,
) -> Result<VideoSelection> {
    let file = InputFile::from_path(&path).await?;
    let (name, size) = (file.name().to_string(), file.size());
    state.video.select_file(file)?;
    *state.video_path.lock().unwrap_or_else(PoisonError::into_inner) = Some(PathBuf::from(&path));

    let ffprobe = state.video_engine.ffprobe_path();
    let duration = match ffmpeg::probe_media(&ffprobe, path.as_ref()).await {
        Ok(info) => info.duration,
        Err(e) => {
            warn!("could not read duration of {}: {}", path, e);
            0.0
        }
    };
    let trim = state.video.set_media_duration(duration);

    Ok(VideoSelection {
        name,
        size,
        duration: state.video.params().media_duration,
        trim,
    })
}

#[tauri::command]
fn set_video_options(
    state: tauri::State<'_, DesktopState>,
    format: Option<String>,
    quality: Option<u8>,
    remove_audio: Option<bool>,
) -> Result<()> {
    if let Some(format) = format {
        state.video.set_target_format(format.parse::<VideoFormat>()?);
    }
    if let Some(quality) = quality {
        state.video.set_quality(quality)?;
    }
    if let Some(remove) = remove_audio {
        state.video.set_remove_audio(remove);
    }
    Ok(())
}

#[tauri::command]
fn apply_preset(state: tauri::State<'_, DesktopState>, name: Option<String>) -> Result<()> {
    match name {
        Some(name) => state.video.apply_preset(name.parse::<Preset>()?),
        None => state.video.clear_preset(),
    }
    Ok(())
}

#[tauri::command]
fn set_trim_range(
    state: tauri::State<'_, DesktopState>,
    start: f64,
    end: f64,
) -> Result<TrimUpdate> {
    state.video.set_trim_range(start, end)
}

#[tauri::command]
async fn extract_filmstrip(state: tauri::State<'_, DesktopState>) -> Result<Vec<String>> {
    let path = state
        .video_path
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or(ConvertError::NoInput)?;
    let mut source = FfmpegFrameSource::new(state.video_engine.ffmpeg_path(), path);
    let strip = state.video.generate_thumbnails(&mut source).await?;
    Ok(filmstrip::data_urls(&strip))
}

#[tauri::command]
async fn convert_video(state: tauri::State<'_, DesktopState>) -> Result<String> {
    state.video.convert().await
}

fn forward_progress(app: &tauri::AppHandle, state: &DesktopState) {
    let mut images = state.images.subscribe_progress();
    let handle = app.clone();
    tauri::async_runtime::spawn(async move {
        while images.changed().await.is_ok() {
            let values = images.borrow_and_update().clone();
            for (index, progress) in values.into_iter().enumerate() {
                let _ = handle.emit("conversion-progress", ProgressPayload {
                    id: String::from("image"),
                    index,
                    progress,
                    status: String::from("converting"),
                });
            }
        }
    });

    let mut video = state.video.subscribe_progress();
    let handle = app.clone();
    tauri::async_runtime::spawn(async move {
        while video.changed().await.is_ok() {
            let progress = *video.borrow_and_update();
            let _ = handle.emit("conversion-progress", ProgressPayload {
                id: String::from("video"),
                index: 0,
                progress,
                status: String::from("converting"),
            });
        }
    });
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match AppConfig::load(None) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            AppConfig::default()
        }
    };
    info!("saving conversions to {}", config.output_dir.display());

    tauri::Builder::default()
        .plugin(tauri_plugin_fs::init())
        .plugin(tauri_plugin_store::Builder::new().build())
        .setup(move |app| {
            let state = DesktopState::new(app.handle(), &config);
            forward_progress(app.handle(), &state);
            app.manage(state);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            get_file_size,
            select_images,
            set_image_options,
            convert_images,
            select_video,
            set_video_options,
            apply_preset,
            set_trim_range,
            extract_filmstrip,
            convert_video
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
