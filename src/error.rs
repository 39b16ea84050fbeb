use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Failed to load conversion tools: {0}")]
    EngineInit(String),

    #[error("ffmpeg exited with {code:?}: {stderr}")]
    Execution { code: Option<i32>, stderr: String },

    #[error("Engine produced no output named {0}")]
    MissingOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("A conversion is already in progress")]
    Busy,

    #[error("No input selected")]
    NoInput,

    #[error("Too many files: {got} selected, at most {max} allowed")]
    TooManyFiles { max: usize, got: usize },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Quality must be between 0 and 100, got {0}")]
    InvalidQuality(u8),

    #[error("Invalid trim range [{start}, {end}] for a {duration}s source")]
    InvalidTrimRange { start: f64, end: f64, duration: f64 },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Conversion stopped at file {index} after {completed} saved: {source}")]
    BatchAborted {
        index: usize,
        completed: usize,
        #[source]
        source: Box<ConvertError>,
    },

    #[cfg(feature = "desktop")]
    #[error("Tauri error: {0}")]
    Tauri(#[from] tauri::Error),
}

impl ConvertError {
    /// Unwraps a batch abort down to the error that caused it.
    pub fn root(&self) -> &ConvertError {
        match self {
            ConvertError::BatchAborted { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(feature = "desktop")]
impl From<ConvertError> for tauri::ipc::InvokeError {
    fn from(error: ConvertError) -> Self {
        tauri::ipc::InvokeError::from(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_unwraps_nested_batch_errors() {
        let err = ConvertError::BatchAborted {
            index: 2,
            completed: 2,
            source: Box::new(ConvertError::Execution {
                code: Some(1),
                stderr: String::from("bad input"),
            }),
        };
        assert!(matches!(err.root(), ConvertError::Execution { code: Some(1), .. }));
        assert!(err.to_string().contains("after 2 saved"));
    }
}
