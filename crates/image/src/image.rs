use {crate::*, base::Vec2};

/// A single bitmap in one of the supported pixel formats.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub size: Vec2<usize>,
    pub data: Vec<u8>,
    pub format: PixelFormat,
}

impl Image {
    pub fn new(size: Vec2<usize>, data: Vec<u8>, format: PixelFormat) -> Self {
        Self { size, data, format }
    }

    /// An all-black RGB image.
    pub fn black(size: Vec2<usize>) -> Self {
        Self::new(size, vec![0u8; size.area() * 3], PixelFormat::Rgb8)
    }

    pub fn width(&self) -> usize {
        self.size.x
    }

    pub fn height(&self) -> usize {
        self.size.y
    }

    /// Check that the buffer is large enough for the size and format.
    ///
    /// Compressed formats are only checked for being non-empty.
    pub fn validate(&self) -> Result<(), ImageError> {
        if self.size.x == 0 || self.size.y == 0 {
            return Err(ImageError::Size(format!("empty image {}", self.size)));
        }
        match self.format.expected_len(self.size) {
            Some(expected) if self.data.len() < expected => Err(ImageError::Size(format!(
                "{:?} image of {} needs {} bytes, got {}",
                self.format,
                self.size,
                expected,
                self.data.len()
            ))),
            None if self.data.is_empty() => {
                Err(ImageError::Size(format!("empty {:?} payload", self.format)))
            }
            _ => Ok(()),
        }
    }
}
