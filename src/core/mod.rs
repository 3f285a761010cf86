pub mod cancel;
pub mod config;
pub mod error;
pub mod process;


pub use cancel::CancelToken;
pub use config::PlayerConfig;
pub use error::PlayerError;
pub use process::{CommandSpec, LaunchedProcess, ProcessHandle, ProcessLauncher, SystemLauncher};
