use {
    crate::*,
    image::Image,
    std::{sync::Mutex, time::Instant},
};

/// Read access to the newest frame of a live video source.
pub trait FrameSource: Send + Sync + 'static {
    /// Return a snapshot of the current frame.
    ///
    /// Fails with `VideoError::NotReady` until the source has produced its
    /// first decodable frame. Never blocks and has no side effects.
    fn capture_frame(&self) -> Result<VideoFrame, VideoError>;
}

/// A source that always shows the same image, or nothing at all.
///
/// Useful where no camera is attached, and for driving the pipeline from
/// stored images.
pub struct StillSource {
    state: Mutex<StillState>,
}

struct StillState {
    image: Option<Image>,
    sequence: u64,
}

impl StillSource {
    pub fn new(image: Image) -> Self {
        Self {
            state: Mutex::new(StillState {
                image: Some(image),
                sequence: 0,
            }),
        }
    }

    /// A source that reports `NotReady` until `set` is called.
    pub fn empty() -> Self {
        Self {
            state: Mutex::new(StillState {
                image: None,
                sequence: 0,
            }),
        }
    }

    /// Replace the image; later captures see a new sequence number.
    pub fn set(&self, image: Image) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.image.is_some() {
            state.sequence += 1;
        }
        state.image = Some(image);
    }

    pub fn clear(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).image = None;
    }
}

impl FrameSource for StillSource {
    fn capture_frame(&self) -> Result<VideoFrame, VideoError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let color = state.image.clone().ok_or(VideoError::NotReady)?;
        Ok(VideoFrame {
            color,
            sequence: state.sequence,
            captured_at: Instant::now(),
        })
    }
}
