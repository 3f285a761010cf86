// =============================================================================
// PLAYER CONTROLLER - SINGLE POINT OF CONTROL FOR THE DECODE PIPELINE
// =============================================================================
//
// This module owns the playback state machine and the lifetime of everything
// a playing video needs: the probe result, both decoder subprocesses, the
// pacing loop thread and the audio sink. The UI never touches a process or a
// stream directly; it calls load/play/pause/stop/seek/dispose and polls for
// events and frames.
//
// OWNERSHIP RULES:
// - At most one PlaybackSession is live per controller instance
// - Shared session state lives behind one mutex, never held across a
//   blocking read
// - Seeking never mutates a session; it tears the old one down and builds a
//   new one with a start offset
// - Teardown order is always: cancel, bounded wait, kill
//
// =============================================================================

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::{AudioBridge, AudioOutput, AudioOutputHandle};
use crate::core::{CancelToken, PlayerConfig, PlayerError, ProcessHandle, ProcessLauncher};
use crate::video::clock::PlaybackClock;
use crate::video::decoder::{AudioDecoder, FrameDecoder};
use crate::video::frame_reader::{FrameRead, FrameReader};
use crate::video::probe::{MediaDescriptor, MediaProbe};
use crate::video::surface::DisplaySurface;

/// Longest the UI thread will wait for the pacing loop to observe
/// cancellation. A hung decoder must not hang the caller.
pub const PAUSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Stopped,
}

/// Events the controller publishes for the UI to poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Descriptor resolved and the display surface is sized for it.
    MediaOpened(MediaDescriptor),
    /// End of stream reached; playback loops back to the start.
    MediaEnded,
    /// Playback terminated without a loop restart (stop, dispose, or a
    /// failed relaunch). UIs reset their transport buttons on this one.
    PlaybackEnded,
}

struct PlaybackSession {
    id: u64,
    video: Box<dyn ProcessHandle>,
    audio: Option<Box<dyn ProcessHandle>>,
    /// Parked here whenever no pacing loop owns the stream.
    video_stdout: Option<Box<dyn Read + Send>>,
    /// Parked here until the audio sink takes it.
    audio_stdout: Option<Box<dyn Read + Send>>,
    cancel: CancelToken,
    start_offset: f64,
}

#[derive(Default)]
struct SessionSlot {
    session: Option<PlaybackSession>,
    next_id: u64,
}

fn lock_slot(slot: &Mutex<SessionSlot>) -> MutexGuard<'_, SessionSlot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct PlayerController {
    launcher: Arc<dyn ProcessLauncher>,
    config: PlayerConfig,
    surface: Arc<Mutex<Box<dyn DisplaySurface>>>,
    audio_output: AudioOutput,
    slot: Arc<Mutex<SessionSlot>>,
    state: PlayerState,
    descriptor: Option<MediaDescriptor>,
    frames_rendered: Arc<AtomicU64>,
    playing: Arc<AtomicBool>,
    volume: Arc<Mutex<f64>>,
    events_tx: mpsc::Sender<PlayerEvent>,
    events_rx: Mutex<mpsc::Receiver<PlayerEvent>>,
    loop_done_rx: Option<mpsc::Receiver<()>>,
    disposed: bool,
}

impl PlayerController {
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        config: PlayerConfig,
        surface: Box<dyn DisplaySurface>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        let audio_output = AudioOutput::new(config.output_device_name.clone());
        let volume = config.volume.clamp(0.0, 1.0);

        Self {
            launcher,
            config,
            surface: Arc::new(Mutex::new(surface)),
            audio_output,
            slot: Arc::new(Mutex::new(SessionSlot::default())),
            state: PlayerState::Idle,
            descriptor: None,
            frames_rendered: Arc::new(AtomicU64::new(0)),
            playing: Arc::new(AtomicBool::new(false)),
            volume: Arc::new(Mutex::new(volume)),
            events_tx,
            events_rx: Mutex::new(events_rx),
            loop_done_rx: None,
            disposed: false,
        }
    }

    /// Probe the file, start both decoder subprocesses and size the display
    /// surface. Any prior session is torn down first. Video decoder failure
    /// is fatal to the load; audio decoder failure degrades to silent
    /// playback.
    pub fn load(&mut self, path: &Path) -> anyhow::Result<()> {
        self.load_at(path.to_path_buf(), 0.0)
    }

    fn load_at(&mut self, path: PathBuf, start_offset: f64) -> anyhow::Result<()> {
        if self.disposed {
            return Err(PlayerError::Disposed.into());
        }

        self.teardown_session();
        self.audio_output.stop();
        self.state = PlayerState::Loading;
        log::info!("Loading {} at {:.3}s", path.display(), start_offset);

        let descriptor = MediaProbe::probe(self.launcher.as_ref(), &self.config, &path);

        let video = match FrameDecoder::start(
            self.launcher.as_ref(),
            &self.config,
            &descriptor,
            start_offset,
        ) {
            Ok(video) => video,
            Err(e) => {
                log::error!("Failed to start video decoder for {}: {}", path.display(), e);
                self.descriptor = None;
                self.state = PlayerState::Idle;
                return Err(e);
            }
        };

        let audio = match AudioDecoder::start(
            self.launcher.as_ref(),
            &self.config,
            &path,
            start_offset,
        ) {
            Ok(audio) => Some(audio),
            Err(e) => {
                log::warn!(
                    "Audio decoder unavailable for {}: {}, playing without sound",
                    path.display(),
                    e
                );
                None
            }
        };

        if let Ok(mut surface) = self.surface.lock() {
            surface.configure(descriptor.width, descriptor.height);
        }

        {
            let mut slot = lock_slot(&self.slot);
            slot.next_id += 1;
            let id = slot.next_id;
            let (audio_handle, audio_stdout) = match audio {
                Some(process) => (Some(process.handle), Some(process.stdout)),
                None => (None, None),
            };
            slot.session = Some(PlaybackSession {
                id,
                video: video.handle,
                audio: audio_handle,
                video_stdout: Some(video.stdout),
                audio_stdout,
                cancel: CancelToken::new(),
                start_offset,
            });
        }

        self.frames_rendered.store(0, Ordering::SeqCst);
        self.descriptor = Some(descriptor.clone());
        self.state = PlayerState::Ready;
        let _ = self.events_tx.send(PlayerEvent::MediaOpened(descriptor));
        Ok(())
    }

    /// Start or resume playback. No-op when already playing.
    pub fn play(&mut self) -> anyhow::Result<()> {
        if self.disposed {
            return Err(PlayerError::Disposed.into());
        }
        if self.state == PlayerState::Playing {
            return Ok(());
        }
        let descriptor = self.descriptor.clone().ok_or(PlayerError::NoMedia)?;

        let (session_id, cancel, video_stdout, audio_stdout) = {
            let mut slot = lock_slot(&self.slot);
            let session = slot.session.as_mut().ok_or(PlayerError::NoMedia)?;
            // A token cancelled by a prior pause is spent; sessions get a
            // fresh one on resume.
            if session.cancel.is_cancelled() {
                session.cancel = CancelToken::new();
            }
            let stdout = session.video_stdout.take().ok_or_else(|| {
                anyhow::anyhow!("previous playback loop has not released the decoder stream yet")
            })?;
            (
                session.id,
                session.cancel.clone(),
                stdout,
                session.audio_stdout.take(),
            )
        };

        let volume = self.volume();
        match audio_stdout {
            Some(reader) => self
                .audio_output
                .start(AudioBridge::new(reader), volume as f32),
            None => self.audio_output.resume(),
        }

        let (done_tx, done_rx) = mpsc::channel();
        self.loop_done_rx = Some(done_rx);
        self.playing.store(true, Ordering::SeqCst);

        let ctx = LoopContext {
            slot: Arc::clone(&self.slot),
            session_id,
            descriptor,
            cancel,
            surface: Arc::clone(&self.surface),
            events: self.events_tx.clone(),
            frames_rendered: Arc::clone(&self.frames_rendered),
            playing: Arc::clone(&self.playing),
            launcher: Arc::clone(&self.launcher),
            config: self.config.clone(),
            audio: self.audio_output.handle(),
            volume: Arc::clone(&self.volume),
        };
        thread::spawn(move || {
            playback_loop(ctx, video_stdout);
            let _ = done_tx.send(());
        });

        self.state = PlayerState::Playing;
        log::info!("Playback started");
        Ok(())
    }

    /// Stop issuing frames. Waits up to PAUSE_TIMEOUT for the loop to
    /// observe cancellation, never indefinitely.
    pub fn pause(&mut self) -> anyhow::Result<()> {
        if self.disposed {
            return Err(PlayerError::Disposed.into());
        }
        if self.state != PlayerState::Playing {
            return Ok(());
        }

        log::info!("Pausing playback");
        self.cancel_loop_and_wait();
        self.audio_output.pause();
        self.state = PlayerState::Paused;
        Ok(())
    }

    /// Pause plus seek-to-zero: the session is rebuilt at the start of the
    /// file and left idle.
    pub fn stop(&mut self) -> anyhow::Result<()> {
        if self.disposed {
            return Err(PlayerError::Disposed.into());
        }
        let path = match &self.descriptor {
            Some(descriptor) => descriptor.path.clone(),
            None => {
                self.state = PlayerState::Stopped;
                return Ok(());
            }
        };

        log::info!("Stopping playback");
        self.cancel_loop_and_wait();
        let result = self.load_at(path, 0.0);
        if result.is_ok() {
            self.state = PlayerState::Stopped;
        }
        let _ = self.events_tx.send(PlayerEvent::PlaybackEnded);
        result
    }

    /// Seek by rebuilding the session with a start offset. The raw frame
    /// pipe supports no random access, so both decoders are relaunched with
    /// the offset on their command line. Resumes playing if we were playing.
    pub fn seek(&mut self, position: Duration) -> anyhow::Result<()> {
        if self.disposed {
            return Err(PlayerError::Disposed.into());
        }
        let path = self
            .descriptor
            .as_ref()
            .map(|d| d.path.clone())
            .ok_or(PlayerError::NoMedia)?;

        let was_playing = self.state == PlayerState::Playing;
        log::info!("Seeking to {:.3}s", position.as_secs_f64());
        self.cancel_loop_and_wait();
        self.load_at(path, position.as_secs_f64())?;
        if was_playing {
            self.play()?;
        }
        Ok(())
    }

    /// Terminal teardown: cancel everything, kill both subprocesses, release
    /// the audio device. Idempotent and safe during active playback.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        let was_playing = self.state == PlayerState::Playing;

        log::info!("Disposing player");
        self.teardown_session();
        self.audio_output.shutdown();
        if was_playing {
            let _ = self.events_tx.send(PlayerEvent::PlaybackEnded);
        }
        self.state = PlayerState::Stopped;
    }

    /// Drain any pending events without blocking.
    pub fn poll_events(&self) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        if let Ok(receiver) = self.events_rx.lock() {
            while let Ok(event) = receiver.try_recv() {
                events.push(event);
            }
        }
        events
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn descriptor(&self) -> Option<&MediaDescriptor> {
        self.descriptor.as_ref()
    }

    /// Best-effort position: start offset plus rendered frames times the
    /// frame delay. The raw stream carries no timestamps.
    pub fn position(&self) -> Duration {
        let Some(descriptor) = &self.descriptor else {
            return Duration::ZERO;
        };
        let offset = lock_slot(&self.slot)
            .session
            .as_ref()
            .map(|s| s.start_offset)
            .unwrap_or(0.0);
        let frames = self.frames_rendered.load(Ordering::SeqCst);
        Duration::from_secs_f64(offset + frames as f64 / descriptor.frame_rate)
    }

    /// Often unknown for streamed raw decode.
    pub fn duration(&self) -> Option<Duration> {
        self.descriptor
            .as_ref()?
            .duration
            .map(Duration::from_secs_f64)
    }

    pub fn volume(&self) -> f64 {
        self.volume.lock().map(|v| *v).unwrap_or(1.0)
    }

    /// Clamped to [0, 1] on assignment, applied at the sink layer.
    pub fn set_volume(&mut self, volume: f64) {
        let clamped = volume.clamp(0.0, 1.0);
        if let Ok(mut v) = self.volume.lock() {
            *v = clamped;
        }
        self.audio_output.set_volume(clamped as f32);
    }

    fn cancel_loop_and_wait(&mut self) {
        let cancel = lock_slot(&self.slot)
            .session
            .as_ref()
            .map(|s| s.cancel.clone());
        if let Some(cancel) = cancel {
            cancel.cancel();
        }

        if let Some(done) = self.loop_done_rx.take() {
            match done.recv_timeout(PAUSE_TIMEOUT) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {}
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "Playback loop did not observe cancellation within {:?}",
                        PAUSE_TIMEOUT
                    );
                }
            }
        }
        self.playing.store(false, Ordering::SeqCst);
    }

    /// Cancel, bounded wait, then kill. Every step tolerates a resource that
    /// is already gone.
    fn teardown_session(&mut self) {
        self.cancel_loop_and_wait();

        let mut slot = lock_slot(&self.slot);
        if let Some(mut session) = slot.session.take() {
            session.video.kill();
            if let Some(ref mut audio) = session.audio {
                audio.kill();
            }
        }
    }
}

impl Drop for PlayerController {
    fn drop(&mut self) {
        self.dispose();
    }
}

struct LoopContext {
    slot: Arc<Mutex<SessionSlot>>,
    session_id: u64,
    descriptor: MediaDescriptor,
    cancel: CancelToken,
    surface: Arc<Mutex<Box<dyn DisplaySurface>>>,
    events: mpsc::Sender<PlayerEvent>,
    frames_rendered: Arc<AtomicU64>,
    playing: Arc<AtomicBool>,
    launcher: Arc<dyn ProcessLauncher>,
    config: PlayerConfig,
    audio: AudioOutputHandle,
    volume: Arc<Mutex<f64>>,
}

/// The pacing loop: one frame per iteration, then sleep out the remainder of
/// the frame delay. Runs on its own thread until cancelled or the stream ends
/// with no way to restart. No error escapes it except cancellation.
fn playback_loop(ctx: LoopContext, mut stdout: Box<dyn Read + Send>) {
    let frame_len = ctx.descriptor.frame_len();
    let mut frame = vec![0u8; frame_len];
    let mut reader = FrameReader::new();
    let clock = PlaybackClock::new(ctx.descriptor.frame_delay(), ctx.cancel.clone());

    log::debug!(
        "Pacing loop started for {} ({}x{} @ {:.2} fps, {} byte frames)",
        ctx.descriptor.path.display(),
        ctx.descriptor.width,
        ctx.descriptor.height,
        ctx.descriptor.frame_rate,
        frame_len
    );

    loop {
        if ctx.cancel.is_cancelled() {
            park_stream(&ctx, stdout);
            log::debug!("Pacing loop cancelled");
            return;
        }

        let iteration_started = Instant::now();

        match reader.read_frame(&mut stdout, &mut frame) {
            FrameRead::Complete => {
                match ctx.surface.lock() {
                    Ok(mut surface) => match surface.present(&frame) {
                        Ok(()) => {
                            ctx.frames_rendered.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => {
                            // Hand-off failure drops the frame, never the loop.
                            log::warn!("Dropping frame: {}", e);
                        }
                    },
                    Err(_) => log::warn!("Display surface lock poisoned, dropping frame"),
                }
            }
            FrameRead::EndOfStream => {
                log::info!("End of stream for {}", ctx.descriptor.path.display());
                let _ = ctx.events.send(PlayerEvent::MediaEnded);
                match restart_from_start(&ctx) {
                    Some(new_stdout) => {
                        stdout = new_stdout;
                        ctx.frames_rendered.store(0, Ordering::SeqCst);
                        continue;
                    }
                    None => {
                        ctx.playing.store(false, Ordering::SeqCst);
                        if !ctx.cancel.is_cancelled() {
                            let _ = ctx.events.send(PlayerEvent::PlaybackEnded);
                        }
                        log::debug!("Pacing loop finished");
                        return;
                    }
                }
            }
        }

        if !clock.pace(iteration_started) {
            park_stream(&ctx, stdout);
            log::debug!("Pacing loop cancelled during frame delay");
            return;
        }
    }
}

/// A paused loop parks the decoder stream back in its session so play() can
/// resume from it. A stale loop whose session was replaced just drops it.
fn park_stream(ctx: &LoopContext, stdout: Box<dyn Read + Send>) {
    let mut slot = lock_slot(&ctx.slot);
    if let Some(session) = slot.session.as_mut() {
        if session.id == ctx.session_id {
            session.video_stdout = Some(stdout);
        }
    }
}

/// Loop semantics: tear down both decoders and relaunch them from position
/// zero, swapping the new handles into the same session under the lock.
/// Returns None when the session is gone, replaced or the relaunch failed.
fn restart_from_start(ctx: &LoopContext) -> Option<Box<dyn Read + Send>> {
    let mut slot = lock_slot(&ctx.slot);
    let session = slot.session.as_mut()?;
    if session.id != ctx.session_id || session.cancel.is_cancelled() {
        return None;
    }

    session.video.kill();
    if let Some(ref mut audio) = session.audio {
        audio.kill();
    }
    session.audio = None;
    session.audio_stdout = None;

    let video = match FrameDecoder::start(ctx.launcher.as_ref(), &ctx.config, &ctx.descriptor, 0.0)
    {
        Ok(video) => video,
        Err(e) => {
            log::error!(
                "Failed to relaunch video decoder for {}: {}",
                ctx.descriptor.path.display(),
                e
            );
            return None;
        }
    };
    session.video = video.handle;
    session.start_offset = 0.0;

    let volume = ctx.volume.lock().map(|v| *v).unwrap_or(1.0);
    match AudioDecoder::start(ctx.launcher.as_ref(), &ctx.config, &ctx.descriptor.path, 0.0) {
        Ok(audio) => {
            session.audio = Some(audio.handle);
            ctx.audio.start(AudioBridge::new(audio.stdout), volume as f32);
        }
        Err(e) => {
            log::warn!("Audio decoder unavailable on loop restart: {}", e);
            ctx.audio.stop();
        }
    }

    Some(video.stdout)
}
