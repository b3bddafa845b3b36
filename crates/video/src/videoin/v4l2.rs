use {
    super::{VideoInConfig, VideoInDevice},
    crate::VideoError,
    base::Vec2,
    image::{Image, PixelFormat},
    std::path::PathBuf,
    v4l::{
        Device, Format, FourCC, buffer::Type, io::mmap::Stream as MmapStream,
        io::traits::CaptureStream, video::Capture,
    },
};

#[derive(Debug, Clone, Default)]
pub struct V4l2Config {
    pub path: Option<PathBuf>,
    pub size: Option<Vec2<usize>>,
    /// `PixelFormat::Yuyv` or `PixelFormat::Jpeg`
    pub format: Option<PixelFormat>,
    pub frame_rate: Option<f32>,
}

pub(crate) struct V4l2 {
    stream: Option<MmapStream<'static>>,
    size: Vec2<usize>,
    format: PixelFormat,
}

impl V4l2 {
    pub fn new() -> Self {
        Self {
            stream: None,
            size: Vec2::new(0, 0),
            format: PixelFormat::Yuyv,
        }
    }
}

impl VideoInDevice for V4l2 {
    fn open(&mut self, config: &VideoInConfig) -> Result<VideoInConfig, VideoError> {
        self.stream.take();

        let VideoInConfig::V4l2(config) = config else {
            return Err(VideoError::Device(
                "V4l2::open should be called with VideoInConfig::V4l2".to_string(),
            ));
        };

        let device = match &config.path {
            Some(path) => Device::with_path(path)?,
            None => Device::new(0)?,
        };
        let device_format = Capture::format(&device)?;

        let desired_size = config.size.unwrap_or(Vec2::new(
            device_format.width as usize,
            device_format.height as usize,
        ));

        let desired_fourcc = match config.format {
            Some(PixelFormat::Jpeg) => FourCC::new(b"MJPG"),
            Some(PixelFormat::Yuyv) => FourCC::new(b"YUYV"),
            Some(other) => {
                return Err(VideoError::Device(format!(
                    "V4L2 capture supports YUYV and MJPG, not {:?}",
                    other
                )));
            }
            None => device_format.fourcc,
        };

        let actual_format = Capture::set_format(
            &device,
            &Format::new(desired_size.x as u32, desired_size.y as u32, desired_fourcc),
        )?;

        self.size = Vec2::new(actual_format.width as usize, actual_format.height as usize);
        self.format = match &actual_format.fourcc.repr {
            b"YUYV" => PixelFormat::Yuyv,
            b"MJPG" => PixelFormat::Jpeg,
            _ => {
                return Err(VideoError::Device(format!(
                    "Unsupported pixel format: {}",
                    actual_format.fourcc
                )));
            }
        };

        let desired_frame_rate = match config.frame_rate {
            Some(frame_rate) => frame_rate,
            None => {
                let params = Capture::params(&device)?;
                params.interval.denominator as f32 / params.interval.numerator.max(1) as f32
            }
        };

        let actual_params = Capture::set_params(
            &device,
            &v4l::video::capture::Parameters::with_fps(desired_frame_rate as u32),
        )?;
        let frame_rate = actual_params.interval.denominator as f32
            / actual_params.interval.numerator.max(1) as f32;

        self.stream = Some(
            MmapStream::with_buffers(&device, Type::VideoCapture, 4u32)
                .map_err(|error| VideoError::Stream(error.to_string()))?,
        );

        Ok(VideoInConfig::V4l2(V4l2Config {
            path: config.path.clone(),
            size: Some(self.size),
            format: Some(self.format),
            frame_rate: Some(frame_rate),
        }))
    }

    fn close(&mut self) {
        self.stream.take();
    }

    fn blocking_capture(&mut self) -> Result<Image, VideoError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(VideoError::Stream("No stream".to_string()));
        };
        match CaptureStream::next(stream) {
            Ok((frame_data, _metadata)) => {
                Ok(Image::new(self.size, frame_data.to_vec(), self.format))
            }
            Err(error) => Err(VideoError::Stream(error.to_string())),
        }
    }
}
