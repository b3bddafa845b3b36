//! Live practice against a remote classifier.
//!
//! A session captures a frame, encodes it, sends it over the prediction
//! channel and waits for the answer before scheduling the next capture.

pub mod config;
pub mod encoder;
pub mod error;
pub mod pacer;
pub mod practice;
mod session;

pub use config::{ENDPOINT_ENV, LetterboxPolicy, MODE_ENV, PracticeConfig};
pub use encoder::{EncodedFrame, FrameEncoder};
pub use error::PracticeError;
pub use pacer::{Pacer, PacingAction, PacingState};
pub use practice::{Practice, decode_overlay};

pub use com::{ChannelState, Prediction, WireSchema};
