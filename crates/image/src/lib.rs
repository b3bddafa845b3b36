//! Frame images for the practice pipeline.
//!
//! Camera frames arrive in whatever pixel format the device produces. This
//! crate converts them to RGB, letterboxes them onto a fixed-size canvas,
//! compresses them to JPEG and wraps the result for text transports
//! (base64, data URLs).
//!
//! Pixel data is packed row-major; RGB images are `[height, width, 3]`.

pub mod dataurl;
pub mod error;
pub mod image;
pub mod jpeg;
pub mod letterbox;
pub mod pixelformat;
pub mod rgb;

pub use dataurl::*;
pub use error::ImageError;
pub use image::Image;
pub use jpeg::*;
pub use letterbox::*;
pub use pixelformat::*;
pub use rgb::*;
