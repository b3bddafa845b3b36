use std::fmt;

#[derive(Debug)]
pub enum PracticeError {
    Image(image::ImageError),
    Video(video::VideoError),
    Config(String),
    /// The blocking encode task panicked or was cancelled.
    Worker(String),
}

impl fmt::Display for PracticeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PracticeError::Image(err) => write!(f, "image error: {err}"),
            PracticeError::Video(err) => write!(f, "video error: {err}"),
            PracticeError::Config(msg) => write!(f, "config error: {msg}"),
            PracticeError::Worker(msg) => write!(f, "worker error: {msg}"),
        }
    }
}

impl std::error::Error for PracticeError {}

impl From<image::ImageError> for PracticeError {
    fn from(err: image::ImageError) -> Self {
        PracticeError::Image(err)
    }
}

impl From<video::VideoError> for PracticeError {
    fn from(err: video::VideoError) -> Self {
        PracticeError::Video(err)
    }
}

impl From<tokio::task::JoinError> for PracticeError {
    fn from(err: tokio::task::JoinError) -> Self {
        PracticeError::Worker(err.to_string())
    }
}
