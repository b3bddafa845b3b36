pub mod channel;
pub mod engineio;
pub mod error;
pub mod server;
pub mod wire;

pub use channel::{ChannelConfig, ChannelEvent, ChannelState, PredictionChannel, SendOutcome};
pub use error::ComError;
pub use server::{Classifier, ClassifierServer, ServerConfig};
pub use wire::{Prediction, WireSchema};
