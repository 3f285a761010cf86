pub mod async_probe;
pub mod clock;
pub mod decoder;
pub mod frame_reader;
pub mod player;
pub mod probe;
pub mod surface;

#[cfg(test)]
mod player_test;

pub use async_probe::{AsyncProbeLoader, ProbeManager, ProbeResult};
pub use clock::PlaybackClock;
pub use decoder::{AudioDecoder, FrameDecoder};
pub use frame_reader::{DecodedFrame, FrameRead, FrameReader, BYTES_PER_PIXEL};
pub use player::{PlayerController, PlayerEvent, PlayerState, PAUSE_TIMEOUT};
pub use probe::{MediaDescriptor, MediaProbe};
pub use surface::{DisplaySurface, SharedFrameBuffer};
