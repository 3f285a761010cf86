use std::path::PathBuf;
use thiserror::Error;

/// Failures the player surfaces to its caller.
///
/// Probe failures and mid-playback stream errors are intentionally absent:
/// probing falls back to a default descriptor and a broken frame stream is
/// treated as end of media, so neither ever reaches the caller as an error.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("failed to launch {tool} for {path}: {source}")]
    ProcessLaunch {
        tool: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited immediately after launch for {path}")]
    DecoderExited { tool: String, path: PathBuf },

    #[error("player has been disposed")]
    Disposed,

    #[error("no media loaded")]
    NoMedia,
}
