use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::{CommandSpec, PlayerConfig, ProcessLauncher};
use crate::video::frame_reader::BYTES_PER_PIXEL;

/// Dimensions assumed when a file cannot be probed.
pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 1080;
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Geometry and timing of a loaded media file, derived once per load and
/// immutable for the lifetime of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaDescriptor {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// Best-effort; often unknown for streamed raw decode.
    pub duration: Option<f64>,
}

impl MediaDescriptor {
    pub fn fallback(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            frame_rate: DEFAULT_FRAME_RATE,
            duration: None,
        }
    }

    /// Pacing interval between frames.
    pub fn frame_delay(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate)
    }

    /// Byte length of one raw frame.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

pub struct MediaProbe;

impl MediaProbe {
    /// Probe width, height and frame rate of the first video stream.
    ///
    /// The system tolerates unprobeable media by guessing dimensions: any
    /// failure here falls back to 1920x1080 @ 30 fps rather than failing the
    /// load.
    pub fn probe(
        launcher: &dyn ProcessLauncher,
        config: &PlayerConfig,
        path: &Path,
    ) -> MediaDescriptor {
        let output = match Self::run_to_end(launcher, &Self::geometry_command(config, path)) {
            Ok(output) => output,
            Err(e) => {
                log::warn!("Probe failed for {}: {}, using defaults", path.display(), e);
                return MediaDescriptor::fallback(path);
            }
        };

        match Self::parse_geometry(&output) {
            Some((width, height, frame_rate)) => {
                log::info!(
                    "Video info for {}: {}x{} @ {:.2} fps",
                    path.display(),
                    width,
                    height,
                    frame_rate
                );
                MediaDescriptor {
                    path: path.to_path_buf(),
                    width,
                    height,
                    frame_rate,
                    duration: Self::probe_duration(launcher, config, path),
                }
            }
            None => {
                log::warn!(
                    "Could not parse probe output for {} ({:?}), using defaults",
                    path.display(),
                    output.trim()
                );
                MediaDescriptor::fallback(path)
            }
        }
    }

    /// Best-effort duration probe; None when the container doesn't say.
    pub fn probe_duration(
        launcher: &dyn ProcessLauncher,
        config: &PlayerConfig,
        path: &Path,
    ) -> Option<f64> {
        let output = Self::run_to_end(launcher, &Self::duration_command(config, path)).ok()?;
        let info: serde_json::Value = serde_json::from_str(&output).ok()?;
        let duration = info["format"]["duration"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())?;
        log::debug!("Duration of {}: {:.2}s", path.display(), duration);
        Some(duration)
    }

    fn geometry_command(config: &PlayerConfig, path: &Path) -> CommandSpec {
        CommandSpec::new(
            config.ffprobe(),
            vec![
                "-v".to_string(),
                "error".to_string(),
                "-select_streams".to_string(),
                "v:0".to_string(),
                "-show_entries".to_string(),
                "stream=width,height,r_frame_rate".to_string(),
                "-of".to_string(),
                "csv=s=x:p=0".to_string(),
                path.to_string_lossy().into_owned(),
            ],
        )
    }

    fn duration_command(config: &PlayerConfig, path: &Path) -> CommandSpec {
        CommandSpec::new(
            config.ffprobe(),
            vec![
                "-v".to_string(),
                "error".to_string(),
                "-print_format".to_string(),
                "json".to_string(),
                "-show_format".to_string(),
                path.to_string_lossy().into_owned(),
            ],
        )
    }

    fn run_to_end(launcher: &dyn ProcessLauncher, spec: &CommandSpec) -> anyhow::Result<String> {
        let mut process = launcher.launch(spec)?;
        let mut output = String::new();
        process.stdout.read_to_string(&mut output)?;
        process.handle.kill();
        Ok(output)
    }

    /// Parse `WIDTHxHEIGHTxNUM/DEN` from the probe's stdout.
    fn parse_geometry(output: &str) -> Option<(u32, u32, f64)> {
        let mut fields = output.trim().split('x');
        let width: u32 = fields.next()?.trim().parse().ok()?;
        let height: u32 = fields.next()?.trim().parse().ok()?;
        let frame_rate = Self::parse_frame_rate(fields.next()?)?;
        if width == 0 || height == 0 {
            return None;
        }
        Some((width, height, frame_rate))
    }

    /// Frame rate arrives as a rational, e.g. "30000/1001".
    fn parse_frame_rate(field: &str) -> Option<f64> {
        let mut parts = field.trim().split('/');
        let num: i64 = parts.next()?.trim().parse().ok()?;
        let den: i64 = parts.next()?.trim().parse().ok()?;
        if den == 0 || num <= 0 {
            return None;
        }
        Some(num as f64 / den as f64)
    }
}
