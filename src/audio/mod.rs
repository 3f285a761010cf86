pub mod bridge;
pub mod output;

pub use bridge::AudioBridge;
pub use output::{AudioOutput, AudioOutputHandle};
