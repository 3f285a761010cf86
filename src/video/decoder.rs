use std::path::Path;

use crate::core::{CommandSpec, LaunchedProcess, PlayerConfig, PlayerError, ProcessLauncher};
use crate::video::frame_reader::{DecodedFrame, FrameRead, FrameReader};
use crate::video::probe::MediaDescriptor;

/// PCM format requested from the audio decoder.
pub const AUDIO_SAMPLE_RATE: u32 = 44_100;
pub const AUDIO_CHANNELS: u16 = 2;

/// Launches the external video decoder that emits raw BGRA frames on stdout.
pub struct FrameDecoder;

impl FrameDecoder {
    /// Start the decoder, optionally from a start offset in seconds.
    ///
    /// Launch failure or an immediate exit is fatal to the load; the caller
    /// tears down and surfaces the error.
    pub fn start(
        launcher: &dyn ProcessLauncher,
        config: &PlayerConfig,
        descriptor: &MediaDescriptor,
        start_offset: f64,
    ) -> anyhow::Result<LaunchedProcess> {
        let spec = Self::command(config, descriptor, start_offset);
        let mut process = launcher.launch(&spec)?;

        if process.handle.has_exited() {
            log::error!(
                "Video decoder exited immediately for {}",
                descriptor.path.display()
            );
            return Err(PlayerError::DecoderExited {
                tool: spec.tool_name(),
                path: descriptor.path.clone(),
            }
            .into());
        }

        Ok(process)
    }

    /// Raw video command: constant frame rate, no timestamp smoothing, bicubic
    /// scale to the probed geometry, BGRA to stdout.
    pub fn command(
        config: &PlayerConfig,
        descriptor: &MediaDescriptor,
        start_offset: f64,
    ) -> CommandSpec {
        let mut args = Vec::new();
        if start_offset > 0.0 {
            args.push("-ss".to_string());
            args.push(format!("{:.3}", start_offset));
        }
        args.extend([
            "-i".to_string(),
            descriptor.path.to_string_lossy().into_owned(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "bgra".to_string(),
            "-s".to_string(),
            format!("{}x{}", descriptor.width, descriptor.height),
            "-vsync".to_string(),
            "0".to_string(),
            "-copyts".to_string(),
            "-vf".to_string(),
            format!(
                "scale={}:{}:flags=bicubic",
                descriptor.width, descriptor.height
            ),
            "-sws_flags".to_string(),
            "bicubic".to_string(),
            "-".to_string(),
        ]);
        CommandSpec::new(config.ffmpeg(), args)
    }

    /// Grab a single frame at `timestamp` for gallery poster use.
    pub fn extract_still(
        launcher: &dyn ProcessLauncher,
        config: &PlayerConfig,
        descriptor: &MediaDescriptor,
        timestamp: f64,
    ) -> anyhow::Result<DecodedFrame> {
        let spec = Self::still_command(config, descriptor, timestamp);
        let mut process = launcher.launch(&spec)?;

        let mut data = vec![0u8; descriptor.frame_len()];
        let mut reader = FrameReader::new();
        let outcome = reader.read_frame(&mut process.stdout, &mut data);
        process.handle.kill();

        match outcome {
            FrameRead::Complete => Ok(DecodedFrame {
                width: descriptor.width,
                height: descriptor.height,
                data,
            }),
            FrameRead::EndOfStream => Err(anyhow::anyhow!(
                "Decoder produced no frame at {:.3}s for {}",
                timestamp,
                descriptor.path.display()
            )),
        }
    }

    fn still_command(
        config: &PlayerConfig,
        descriptor: &MediaDescriptor,
        timestamp: f64,
    ) -> CommandSpec {
        CommandSpec::new(
            config.ffmpeg(),
            vec![
                "-ss".to_string(),
                format!("{:.6}", timestamp),
                "-i".to_string(),
                descriptor.path.to_string_lossy().into_owned(),
                "-vframes".to_string(),
                "1".to_string(),
                "-f".to_string(),
                "rawvideo".to_string(),
                "-pix_fmt".to_string(),
                "bgra".to_string(),
                "-s".to_string(),
                format!("{}x{}", descriptor.width, descriptor.height),
                "-".to_string(),
            ],
        )
    }
}

/// Launches the external audio decoder that emits PCM WAV on stdout,
/// independently of the video process.
pub struct AudioDecoder;

impl AudioDecoder {
    /// Start the audio decoder. Failure degrades playback to silent video;
    /// the caller logs and continues.
    pub fn start(
        launcher: &dyn ProcessLauncher,
        config: &PlayerConfig,
        path: &Path,
        start_offset: f64,
    ) -> anyhow::Result<LaunchedProcess> {
        launcher.launch(&Self::command(config, path, start_offset))
    }

    /// PCM 16-bit stereo at a fixed rate, with the decoder's own resampler
    /// compensating audio/video drift at the source.
    pub fn command(config: &PlayerConfig, path: &Path, start_offset: f64) -> CommandSpec {
        let mut args = Vec::new();
        if start_offset > 0.0 {
            args.push("-ss".to_string());
            args.push(format!("{:.3}", start_offset));
        }
        args.extend([
            "-i".to_string(),
            path.to_string_lossy().into_owned(),
            "-vn".to_string(),
            "-f".to_string(),
            "wav".to_string(),
            "-ar".to_string(),
            AUDIO_SAMPLE_RATE.to_string(),
            "-ac".to_string(),
            AUDIO_CHANNELS.to_string(),
            "-af".to_string(),
            "aresample=async=1:min_hard_comp=0.1:first_pts=0".to_string(),
            "-acodec".to_string(),
            "pcm_s16le".to_string(),
            "-threads".to_string(),
            "0".to_string(),
            "-".to_string(),
        ]);
        CommandSpec::new(config.ffmpeg(), args)
    }
}
