use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Player-level configuration, persisted by the host application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Explicit path to the ffmpeg binary. Falls back to PATH lookup.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit path to the ffprobe binary. Falls back to PATH lookup.
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,
    /// Preferred audio output device by name; default device when unset.
    #[serde(default)]
    pub output_device_name: Option<String>,
    /// Initial playback volume in [0, 1].
    #[serde(default = "default_volume")]
    pub volume: f64,
}

fn default_volume() -> f64 {
    1.0
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            output_device_name: None,
            volume: 1.0,
        }
    }
}

impl PlayerConfig {
    pub fn ffmpeg(&self) -> String {
        self.ffmpeg_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ffmpeg".to_string())
    }

    pub fn ffprobe(&self) -> String {
        self.ffprobe_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ffprobe".to_string())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
