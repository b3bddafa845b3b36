//! Frame capture for the practice pipeline.
//!
//! A capture device runs on a blocking worker and publishes its newest frame.
//! Consumers read that frame through `FrameSource::capture_frame`, which is a
//! pure read of the current state: it never waits for the device.

pub mod error;
pub mod source;
pub mod videoframe;
pub mod videoin;

pub use error::VideoError;
pub use source::{FrameSource, StillSource};
pub use videoframe::VideoFrame;
pub use videoin::{SyntheticConfig, VideoIn, VideoInConfig};

#[cfg(feature = "v4l2")]
pub use videoin::v4l2::V4l2Config;
