#[cfg(test)]
mod tests {

    use std::collections::HashSet;
    use std::io::{Cursor, Read};
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use crate::core::{CommandSpec, LaunchedProcess, PlayerConfig, ProcessHandle, ProcessLauncher};
    use crate::video::player::{PlayerController, PlayerEvent, PlayerState};
    use crate::video::surface::SharedFrameBuffer;

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn wav_bytes(samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    /// Raw frame stream that never ends, standing in for a long video.
    struct EndlessStream;

    impl Read for EndlessStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            buf.fill(0x55);
            Ok(buf.len())
        }
    }

    struct FakeHandle {
        pid: u32,
        live: Arc<Mutex<HashSet<u32>>>,
        killed: Arc<Mutex<Vec<u32>>>,
    }

    impl ProcessHandle for FakeHandle {
        fn kill(&mut self) {
            self.live.lock().unwrap().remove(&self.pid);
            self.killed.lock().unwrap().push(self.pid);
        }

        fn has_exited(&mut self) -> bool {
            !self.live.lock().unwrap().contains(&self.pid)
        }

        fn id(&self) -> u32 {
            self.pid
        }
    }

    /// Scripted stand-in for the external tools: probe invocations get canned
    /// probe output, audio launches get a short WAV, video launches get a raw
    /// frame stream. Tracks every launch and every live/killed fake process.
    struct FakeLauncher {
        probe_output: String,
        frame_len: usize,
        /// None plays an endless stream; Some(n) ends after n frames.
        video_frames: Option<usize>,
        fail_video: bool,
        launches: Mutex<Vec<CommandSpec>>,
        live: Arc<Mutex<HashSet<u32>>>,
        killed: Arc<Mutex<Vec<u32>>>,
        next_pid: AtomicU32,
    }

    impl FakeLauncher {
        fn new(probe_output: &str, width: u32, height: u32, video_frames: Option<usize>) -> Self {
            Self {
                probe_output: probe_output.to_string(),
                frame_len: width as usize * height as usize * 4,
                video_frames,
                fail_video: false,
                launches: Mutex::new(Vec::new()),
                live: Arc::new(Mutex::new(HashSet::new())),
                killed: Arc::new(Mutex::new(Vec::new())),
                next_pid: AtomicU32::new(1),
            }
        }

        fn live_count(&self) -> usize {
            self.live.lock().unwrap().len()
        }

        fn killed_pids(&self) -> Vec<u32> {
            self.killed.lock().unwrap().clone()
        }

        fn recorded_launches(&self) -> Vec<CommandSpec> {
            self.launches.lock().unwrap().clone()
        }

        fn video_launches(&self) -> Vec<CommandSpec> {
            self.recorded_launches()
                .into_iter()
                .filter(|spec| {
                    spec.program == "ffmpeg" && !spec.args.iter().any(|a| a == "-vn")
                })
                .collect()
        }

        fn handle(&self) -> Box<dyn ProcessHandle> {
            let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
            self.live.lock().unwrap().insert(pid);
            Box::new(FakeHandle {
                pid,
                live: Arc::clone(&self.live),
                killed: Arc::clone(&self.killed),
            })
        }
    }

    impl ProcessLauncher for FakeLauncher {
        fn launch(&self, spec: &CommandSpec) -> anyhow::Result<LaunchedProcess> {
            self.launches.lock().unwrap().push(spec.clone());

            let stdout: Box<dyn Read + Send> = if spec.program.contains("ffprobe") {
                if spec.args.iter().any(|a| a == "json") {
                    Box::new(Cursor::new(r#"{"format": {"duration": "1.000"}}"#.to_string()))
                } else {
                    Box::new(Cursor::new(self.probe_output.clone()))
                }
            } else if spec.args.iter().any(|a| a == "-vn") {
                Box::new(Cursor::new(wav_bytes(&[0i16; 64])))
            } else {
                if self.fail_video {
                    return Err(anyhow::anyhow!("video decoder refused to start"));
                }
                match self.video_frames {
                    Some(n) => Box::new(Cursor::new(vec![0xABu8; self.frame_len * n])),
                    None => Box::new(EndlessStream),
                }
            };

            Ok(LaunchedProcess {
                stdout,
                handle: self.handle(),
            })
        }
    }

    fn controller_with(
        launcher: &Arc<FakeLauncher>,
    ) -> (PlayerController, SharedFrameBuffer) {
        let surface = SharedFrameBuffer::new();
        let controller = PlayerController::new(
            Arc::clone(launcher) as Arc<dyn ProcessLauncher>,
            PlayerConfig::default(),
            Box::new(surface.clone()),
        );
        (controller, surface)
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_load_resolves_descriptor_and_emits_media_opened() {
        let launcher = Arc::new(FakeLauncher::new("4x4x50/1", 4, 4, Some(4)));
        let (mut controller, surface) = controller_with(&launcher);

        controller.load(Path::new("/gallery/clip.mp4")).unwrap();

        assert_eq!(controller.state(), PlayerState::Ready);
        assert_eq!(surface.dimensions(), (4, 4));
        assert_eq!(controller.duration(), Some(Duration::from_secs(1)));
        // One video and one audio process waiting on their pipes.
        assert_eq!(launcher.live_count(), 2);

        let events = controller.poll_events();
        match events.as_slice() {
            [PlayerEvent::MediaOpened(descriptor)] => {
                assert_eq!(descriptor.width, 4);
                assert_eq!(descriptor.height, 4);
                assert_eq!(descriptor.frame_rate, 50.0);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_unprobeable_media_falls_back_to_defaults() {
        let launcher = Arc::new(FakeLauncher::new("not-a-video", 1920, 1080, Some(0)));
        let (mut controller, _surface) = controller_with(&launcher);

        controller.load(Path::new("/gallery/mystery.bin")).unwrap();

        let descriptor = controller.descriptor().unwrap();
        assert_eq!(descriptor.width, 1920);
        assert_eq!(descriptor.height, 1080);
        assert_eq!(descriptor.frame_rate, 30.0);
        assert_eq!(descriptor.duration, None);
    }

    #[test]
    fn test_video_launch_failure_returns_to_idle() {
        let mut launcher = FakeLauncher::new("4x4x50/1", 4, 4, Some(4));
        launcher.fail_video = true;
        let launcher = Arc::new(launcher);
        let (mut controller, _surface) = controller_with(&launcher);

        assert!(controller.load(Path::new("/gallery/clip.mp4")).is_err());
        assert_eq!(controller.state(), PlayerState::Idle);
        // Probe processes were reaped; nothing is left running.
        assert_eq!(launcher.live_count(), 0);
        assert!(controller.poll_events().is_empty());
    }

    #[test]
    fn test_play_without_media_fails() {
        let launcher = Arc::new(FakeLauncher::new("4x4x50/1", 4, 4, Some(4)));
        let (mut controller, _surface) = controller_with(&launcher);
        assert!(controller.play().is_err());
    }

    #[test]
    fn test_play_presents_frames_at_source_rate() {
        init_logs();
        // 25 fps: one frame every 40 ms.
        let launcher = Arc::new(FakeLauncher::new("4x4x25/1", 4, 4, None));
        let (mut controller, surface) = controller_with(&launcher);

        controller.load(Path::new("/gallery/clip.mp4")).unwrap();
        controller.play().unwrap();
        assert!(controller.is_playing());
        assert_eq!(controller.state(), PlayerState::Playing);

        thread::sleep(Duration::from_millis(1300));
        let presented = surface.frames_presented();
        controller.dispose();

        // Decode is instant here, so the count converges on wall-clock over
        // frame delay; pacing must keep it from ever running ahead.
        assert!(presented >= 25, "only {} frames in ~1.3s at 25fps", presented);
        assert!(presented <= 35, "{} frames is ahead of schedule", presented);
    }

    #[test]
    fn test_playback_never_finishes_early() {
        // 5 frames at 100 fps cannot end before 50 ms of wall clock.
        let launcher = Arc::new(FakeLauncher::new("4x4x100/1", 4, 4, Some(5)));
        let (mut controller, _surface) = controller_with(&launcher);

        controller.load(Path::new("/gallery/clip.mp4")).unwrap();
        let started = Instant::now();
        controller.play().unwrap();

        let mut events = Vec::new();
        assert!(wait_until(Duration::from_secs(5), || {
            events.extend(controller.poll_events());
            events.iter().any(|e| matches!(e, PlayerEvent::MediaEnded))
        }));
        assert!(started.elapsed() >= Duration::from_millis(45));
        controller.dispose();
    }

    #[test]
    fn test_media_opened_precedes_media_ended() {
        let launcher = Arc::new(FakeLauncher::new("4x4x100/1", 4, 4, Some(2)));
        let (mut controller, _surface) = controller_with(&launcher);

        controller.load(Path::new("/gallery/clip.mp4")).unwrap();
        controller.play().unwrap();

        let mut events = Vec::new();
        assert!(wait_until(Duration::from_secs(5), || {
            events.extend(controller.poll_events());
            events.iter().any(|e| matches!(e, PlayerEvent::MediaEnded))
        }));
        controller.dispose();

        assert!(matches!(events[0], PlayerEvent::MediaOpened(_)));
    }

    #[test]
    fn test_end_of_stream_loops_without_playback_ended() {
        let launcher = Arc::new(FakeLauncher::new("4x4x100/1", 4, 4, Some(3)));
        let (mut controller, _surface) = controller_with(&launcher);

        controller.load(Path::new("/gallery/clip.mp4")).unwrap();
        controller.play().unwrap();

        // Two loop restarts prove the relaunch path works repeatedly.
        let mut events = Vec::new();
        assert!(wait_until(Duration::from_secs(5), || {
            events.extend(controller.poll_events());
            events
                .iter()
                .filter(|e| matches!(e, PlayerEvent::MediaEnded))
                .count()
                >= 2
        }));

        assert!(controller.is_playing());
        assert!(!events.iter().any(|e| matches!(e, PlayerEvent::PlaybackEnded)));
        // Each restart launched a fresh decoder.
        assert!(launcher.video_launches().len() >= 3);
        controller.dispose();
    }

    #[test]
    fn test_pause_stops_hand_offs_within_timeout() {
        let launcher = Arc::new(FakeLauncher::new("4x4x50/1", 4, 4, None));
        let (mut controller, surface) = controller_with(&launcher);

        controller.load(Path::new("/gallery/clip.mp4")).unwrap();
        controller.play().unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            surface.frames_presented() >= 2
        }));

        let paused_at = Instant::now();
        controller.pause().unwrap();
        assert!(paused_at.elapsed() < Duration::from_secs(1) + Duration::from_millis(100));
        assert_eq!(controller.state(), PlayerState::Paused);
        assert!(!controller.is_playing());

        let at_pause = surface.frames_presented();
        thread::sleep(Duration::from_millis(150));
        assert_eq!(surface.frames_presented(), at_pause);
    }

    #[test]
    fn test_play_resumes_after_pause() {
        let launcher = Arc::new(FakeLauncher::new("4x4x50/1", 4, 4, None));
        let (mut controller, surface) = controller_with(&launcher);

        controller.load(Path::new("/gallery/clip.mp4")).unwrap();
        controller.play().unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            surface.frames_presented() >= 2
        }));
        controller.pause().unwrap();

        let at_pause = surface.frames_presented();
        controller.play().unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            surface.frames_presented() > at_pause
        }));
        controller.dispose();
    }

    #[test]
    fn test_play_while_playing_is_a_no_op() {
        let launcher = Arc::new(FakeLauncher::new("4x4x50/1", 4, 4, None));
        let (mut controller, _surface) = controller_with(&launcher);

        controller.load(Path::new("/gallery/clip.mp4")).unwrap();
        controller.play().unwrap();
        controller.play().unwrap();
        assert_eq!(controller.state(), PlayerState::Playing);
        controller.dispose();
    }

    #[test]
    fn test_stop_kills_first_session_and_rebuilds_at_zero() {
        let launcher = Arc::new(FakeLauncher::new("4x4x50/1", 4, 4, None));
        let (mut controller, _surface) = controller_with(&launcher);

        controller.load(Path::new("/gallery/clip.mp4")).unwrap();
        let first_session_video = launcher.video_launches().len();
        assert_eq!(first_session_video, 1);
        controller.play().unwrap();
        controller.stop().unwrap();

        assert_eq!(controller.state(), PlayerState::Stopped);
        // The first session's decoders are gone; the rebuilt session has
        // exactly one video and one audio process waiting.
        assert!(launcher.killed_pids().len() >= 2);
        assert_eq!(launcher.live_count(), 2);
        assert_eq!(controller.position(), Duration::ZERO);

        let events = controller.poll_events();
        assert!(events.iter().any(|e| matches!(e, PlayerEvent::PlaybackEnded)));

        // Stopped players can play again.
        controller.play().unwrap();
        controller.dispose();
    }

    #[test]
    fn test_dispose_is_idempotent_and_leaves_no_processes() {
        let launcher = Arc::new(FakeLauncher::new("4x4x50/1", 4, 4, None));
        let (mut controller, _surface) = controller_with(&launcher);

        controller.load(Path::new("/gallery/clip.mp4")).unwrap();
        controller.play().unwrap();

        controller.dispose();
        controller.dispose();

        assert_eq!(launcher.live_count(), 0);
        assert!(!controller.is_playing());
        assert!(controller.load(Path::new("/gallery/clip.mp4")).is_err());
        assert!(controller.play().is_err());

        let events = controller.poll_events();
        assert!(events.iter().any(|e| matches!(e, PlayerEvent::PlaybackEnded)));
    }

    #[test]
    fn test_load_replaces_prior_session() {
        let launcher = Arc::new(FakeLauncher::new("4x4x50/1", 4, 4, None));
        let (mut controller, _surface) = controller_with(&launcher);

        controller.load(Path::new("/gallery/one.mp4")).unwrap();
        controller.load(Path::new("/gallery/two.mp4")).unwrap();

        // Only the second session's pair is alive.
        assert_eq!(launcher.live_count(), 2);
        assert!(launcher.killed_pids().len() >= 2);
    }

    #[test]
    fn test_seek_passes_offset_to_both_decoders() {
        let launcher = Arc::new(FakeLauncher::new("4x4x50/1", 4, 4, None));
        let (mut controller, _surface) = controller_with(&launcher);

        controller.load(Path::new("/gallery/clip.mp4")).unwrap();
        controller.seek(Duration::from_millis(2500)).unwrap();

        let launches = launcher.recorded_launches();
        let offset_launches: Vec<_> = launches
            .iter()
            .filter(|spec| spec.args.first().map(|a| a == "-ss").unwrap_or(false))
            .collect();
        // Video and audio both relaunched with the offset.
        assert_eq!(offset_launches.len(), 2);
        for spec in offset_launches {
            assert_eq!(spec.args[1], "2.500");
        }

        assert_eq!(controller.state(), PlayerState::Ready);
        assert_eq!(controller.position(), Duration::from_millis(2500));
    }

    #[test]
    fn test_seek_while_playing_resumes_playback() {
        let launcher = Arc::new(FakeLauncher::new("4x4x50/1", 4, 4, None));
        let (mut controller, surface) = controller_with(&launcher);

        controller.load(Path::new("/gallery/clip.mp4")).unwrap();
        controller.play().unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            surface.frames_presented() >= 1
        }));

        controller.seek(Duration::from_secs(1)).unwrap();
        assert_eq!(controller.state(), PlayerState::Playing);
        assert!(wait_until(Duration::from_secs(2), || {
            surface.frames_presented() >= 1
        }));
        controller.dispose();
    }

    #[test]
    fn test_position_advances_during_playback() {
        let launcher = Arc::new(FakeLauncher::new("4x4x50/1", 4, 4, None));
        let (mut controller, _surface) = controller_with(&launcher);

        controller.load(Path::new("/gallery/clip.mp4")).unwrap();
        assert_eq!(controller.position(), Duration::ZERO);
        controller.play().unwrap();

        assert!(wait_until(Duration::from_secs(2), || {
            controller.position() >= Duration::from_millis(100)
        }));
        controller.dispose();
    }

    #[test]
    fn test_volume_is_clamped_on_assignment() {
        let launcher = Arc::new(FakeLauncher::new("4x4x50/1", 4, 4, Some(0)));
        let (mut controller, _surface) = controller_with(&launcher);

        controller.set_volume(1.5);
        assert_eq!(controller.volume(), 1.0);
        controller.set_volume(-0.2);
        assert_eq!(controller.volume(), 0.0);
        controller.set_volume(0.35);
        assert_eq!(controller.volume(), 0.35);
    }

    #[test]
    fn test_stop_without_media_is_harmless() {
        let launcher = Arc::new(FakeLauncher::new("4x4x50/1", 4, 4, Some(0)));
        let (mut controller, _surface) = controller_with(&launcher);
        controller.stop().unwrap();
        assert_eq!(controller.state(), PlayerState::Stopped);
    }
}
