use {
    crate::{LetterboxPolicy, PracticeConfig, PracticeError},
    base::Vec2,
    image::{Image, JPEG_MIME, encode_jpeg, letterbox, quality_from_unit, to_base64, to_data_url, to_rgb},
};

/// One frame ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub jpeg: Vec<u8>,
    pub size: Vec2<usize>,
}

impl EncodedFrame {
    pub fn to_base64(&self) -> String {
        to_base64(&self.jpeg)
    }

    pub fn to_data_url(&self) -> String {
        to_data_url(JPEG_MIME, &self.jpeg)
    }
}

/// Fits frames to the target size and compresses them to JPEG.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    target: Vec2<usize>,
    quality: u8,
    policy: LetterboxPolicy,
}

impl FrameEncoder {
    pub fn new(target: Vec2<usize>, quality: f32, policy: LetterboxPolicy) -> Self {
        Self {
            target,
            quality: quality_from_unit(quality),
            policy,
        }
    }

    pub fn from_config(config: &PracticeConfig) -> Self {
        Self::new(config.target_size(), config.quality(), config.letterbox())
    }

    pub fn target(&self) -> Vec2<usize> {
        self.target
    }

    pub fn policy(&self) -> LetterboxPolicy {
        self.policy
    }

    /// With `Letterbox` the result is always exactly the target size.
    pub fn encode(&self, frame: &Image) -> Result<EncodedFrame, PracticeError> {
        let fitted = match self.policy {
            LetterboxPolicy::Letterbox => letterbox(frame, self.target)?,
            LetterboxPolicy::Native => to_rgb(frame)?,
        };
        let jpeg = encode_jpeg(&fitted, self.quality)?;
        Ok(EncodedFrame {
            jpeg,
            size: fitted.size,
        })
    }
}
