use std::sync::mpsc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait};
use rodio::{OutputStream, Sink};

use crate::audio::bridge::AudioBridge;

/// Commands for the thread that owns the audio device.
enum AudioCommand {
    /// Begin playing a fresh PCM stream, replacing any current one.
    Start(AudioBridge, f32),
    Pause,
    Resume,
    SetVolume(f32),
    /// Drop the current stream and sink.
    Stop,
    Shutdown,
}

/// Handle to the audio sink thread.
///
/// The output stream is created and used on one dedicated thread; everything
/// else talks to it through a command channel. Any device failure degrades to
/// silent playback rather than failing the video pipeline.
pub struct AudioOutput {
    command_tx: mpsc::Sender<AudioCommand>,
    thread: Option<thread::JoinHandle<()>>,
}

/// Cheap clonable sender for workers that need to restart the audio stream,
/// e.g. the pacing loop's end-of-stream relaunch.
#[derive(Clone)]
pub struct AudioOutputHandle {
    command_tx: mpsc::Sender<AudioCommand>,
}

impl AudioOutputHandle {
    pub fn start(&self, bridge: AudioBridge, volume: f32) {
        let _ = self.command_tx.send(AudioCommand::Start(bridge, volume));
    }

    pub fn stop(&self) {
        let _ = self.command_tx.send(AudioCommand::Stop);
    }
}

impl AudioOutput {
    pub fn new(preferred_device: Option<String>) -> Self {
        let (command_tx, command_rx) = mpsc::channel();

        let thread = thread::spawn(move || {
            audio_thread(preferred_device, command_rx);
        });

        Self {
            command_tx,
            thread: Some(thread),
        }
    }

    pub fn handle(&self) -> AudioOutputHandle {
        AudioOutputHandle {
            command_tx: self.command_tx.clone(),
        }
    }

    pub fn start(&self, bridge: AudioBridge, volume: f32) {
        let _ = self.command_tx.send(AudioCommand::Start(bridge, volume));
    }

    pub fn pause(&self) {
        let _ = self.command_tx.send(AudioCommand::Pause);
    }

    pub fn resume(&self) {
        let _ = self.command_tx.send(AudioCommand::Resume);
    }

    pub fn set_volume(&self, volume: f32) {
        let _ = self.command_tx.send(AudioCommand::SetVolume(volume));
    }

    pub fn stop(&self) {
        let _ = self.command_tx.send(AudioCommand::Stop);
    }

    /// Stop the thread and release the device. Idempotent.
    pub fn shutdown(&mut self) {
        let _ = self.command_tx.send(AudioCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn audio_thread(preferred_device: Option<String>, command_rx: mpsc::Receiver<AudioCommand>) {
    // Stream and sink live and die on this thread.
    let mut playback: Option<(OutputStream, Sink)> = None;

    while let Ok(command) = command_rx.recv() {
        match command {
            AudioCommand::Start(bridge, volume) => {
                playback = None;
                match open_sink(preferred_device.as_deref()) {
                    Some((stream, sink)) => {
                        sink.set_volume(volume);
                        sink.append(bridge);
                        sink.play();
                        playback = Some((stream, sink));
                    }
                    None => {
                        log::warn!("No usable audio output, continuing with silent playback");
                    }
                }
            }
            AudioCommand::Pause => {
                if let Some((_, ref sink)) = playback {
                    sink.pause();
                }
            }
            AudioCommand::Resume => {
                if let Some((_, ref sink)) = playback {
                    sink.play();
                }
            }
            AudioCommand::SetVolume(volume) => {
                if let Some((_, ref sink)) = playback {
                    sink.set_volume(volume);
                }
            }
            AudioCommand::Stop => {
                playback = None;
            }
            AudioCommand::Shutdown => {
                break;
            }
        }
    }
}

/// Open the preferred output device, falling back to the default, then to
/// silence.
fn open_sink(preferred_device: Option<&str>) -> Option<(OutputStream, Sink)> {
    let stream = match preferred_device.and_then(find_output_device) {
        Some(device) => match OutputStream::try_from_device(&device) {
            Ok(stream) => Some(stream),
            Err(e) => {
                log::warn!("Failed to open requested audio device: {}", e);
                None
            }
        },
        None => None,
    };

    let (stream, handle) = match stream {
        Some(pair) => pair,
        None => match OutputStream::try_default() {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("Failed to open default audio output: {}", e);
                return None;
            }
        },
    };

    match Sink::try_new(&handle) {
        Ok(sink) => Some((stream, sink)),
        Err(e) => {
            log::warn!("Failed to create audio sink: {}", e);
            None
        }
    }
}

fn find_output_device(name: &str) -> Option<cpal::Device> {
    let host = cpal::default_host();
    let devices = match host.output_devices() {
        Ok(devices) => devices,
        Err(e) => {
            log::warn!("Failed to enumerate audio output devices: {}", e);
            return None;
        }
    };

    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name == name {
                log::debug!("Found requested audio device: {}", name);
                return Some(device);
            }
        }
    }

    log::warn!("Audio device '{}' not found, falling back to default", name);
    None
}
