//! Playback core for a desktop photo/video gallery.
//!
//! Decoding is delegated to external ffmpeg/ffprobe processes: the video
//! decoder streams raw BGRA frames over its stdout pipe, a second process
//! streams PCM audio, and this crate paces the frames to the source frame
//! rate into a caller-provided display surface while bridging the audio
//! bytes into the output device. The GUI layer only subscribes; no UI types
//! appear here.

pub mod audio;
pub mod core;
pub mod video;

pub use crate::core::{PlayerConfig, PlayerError, ProcessLauncher, SystemLauncher};
pub use crate::video::{
    DisplaySurface, MediaDescriptor, MediaProbe, PlayerController, PlayerEvent, PlayerState,
    SharedFrameBuffer,
};
