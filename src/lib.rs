pub mod config;
pub mod download;
pub mod error;
pub mod ffmpeg;
pub mod filmstrip;
pub mod formats;
pub mod image_job;
pub mod input;
pub mod job;
pub mod notify;
pub mod presets;
pub mod progress;
pub mod timeline;
pub mod transcoder;
pub mod video_job;

#[cfg(feature = "desktop")]
mod desktop;

#[cfg(feature = "desktop")]
pub use desktop::run;

pub use config::AppConfig;
pub use download::{DirectorySink, DownloadSink};
pub use error::{ConvertError, Result};
pub use formats::{ImageFormat, VideoFormat};
pub use image_job::ImageConverter;
pub use input::InputFile;
pub use notify::{LogNotifier, Notification, Notifier, Severity};
pub use presets::Preset;
pub use transcoder::{EngineState, FfmpegTranscoder, Transcoder};
pub use video_job::VideoConverter;
