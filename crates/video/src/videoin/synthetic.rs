use {
    super::{VideoInConfig, VideoInDevice},
    crate::VideoError,
    base::Vec2,
    image::{Image, PixelFormat},
    std::time::Duration,
};

/// A moving test pattern standing in for a camera.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    size: Vec2<usize>,
    frame_rate: f32,
    warmup: Duration,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            size: Vec2::new(640, 480),
            frame_rate: 30.0,
            warmup: Duration::from_millis(200),
        }
    }
}

impl SyntheticConfig {
    pub fn with_size(mut self, size: Vec2<usize>) -> Self {
        self.size = size;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: f32) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Delay before the first frame, like a camera loading its metadata.
    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn size(&self) -> Vec2<usize> {
        self.size
    }

    pub fn frame_rate(&self) -> f32 {
        self.frame_rate
    }

    pub fn warmup(&self) -> Duration {
        self.warmup
    }
}

pub(crate) struct Synthetic {
    config: Option<SyntheticConfig>,
    frame: u64,
}

impl Synthetic {
    pub fn new() -> Self {
        Self {
            config: None,
            frame: 0,
        }
    }

    fn render(size: Vec2<usize>, frame: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(size.area() * 3);
        let bar = (frame as usize * 8) % size.x.max(1);
        for y in 0..size.y {
            for x in 0..size.x {
                if x.abs_diff(bar) < 16 {
                    data.extend_from_slice(&[255, 255, 255]);
                } else {
                    data.extend_from_slice(&[
                        (x * 255 / size.x.max(1)) as u8,
                        (y * 255 / size.y.max(1)) as u8,
                        96,
                    ]);
                }
            }
        }
        data
    }
}

impl VideoInDevice for Synthetic {
    fn open(&mut self, config: &VideoInConfig) -> Result<VideoInConfig, VideoError> {
        #[allow(irrefutable_let_patterns)]
        let VideoInConfig::Synthetic(config) = config else {
            return Err(VideoError::Device(
                "Synthetic::open should be called with VideoInConfig::Synthetic".to_string(),
            ));
        };
        if config.size.x == 0 || config.size.y == 0 {
            return Err(VideoError::Device(format!("invalid size {}", config.size)));
        }
        if config.frame_rate.is_nan() || config.frame_rate <= 0.0 {
            return Err(VideoError::Device(format!(
                "invalid frame rate {}",
                config.frame_rate
            )));
        }
        self.config = Some(config.clone());
        self.frame = 0;
        Ok(VideoInConfig::Synthetic(config.clone()))
    }

    fn close(&mut self) {
        self.config = None;
    }

    fn blocking_capture(&mut self) -> Result<Image, VideoError> {
        let Some(config) = self.config.as_ref() else {
            return Err(VideoError::Stream("No stream".to_string()));
        };
        let delay = if self.frame == 0 {
            config.warmup
        } else {
            Duration::from_secs_f32(1.0 / config.frame_rate)
        };
        std::thread::sleep(delay);
        let data = Self::render(config.size, self.frame);
        self.frame += 1;
        Ok(Image::new(config.size, data, PixelFormat::Rgb8))
    }
}
