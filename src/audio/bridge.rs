use std::io::Read;
use std::time::Duration;

use rodio::Source;

use crate::video::decoder::{AUDIO_CHANNELS, AUDIO_SAMPLE_RATE};

/// Ring capacity decoupling the decoder's push cadence from the audio
/// device's pull cadence.
pub const RING_CAPACITY: usize = 64 * 1024;

/// Adapts the audio decoder's stdout byte stream into a pull-based sample
/// source for the audio sink.
///
/// The sink's callback thread pulls arbitrary byte counts at device-driven
/// times; the subprocess pushes arbitrary chunk sizes. A fixed ring buffer in
/// between is refilled from the pipe whenever it runs dry. Volume is not
/// applied here; the sink layer owns it.
pub struct AudioBridge {
    reader: Box<dyn Read + Send>,
    ring: Box<[u8]>,
    head: usize,
    len: usize,
    eof: bool,
}

impl AudioBridge {
    /// Wrap the decoder's stdout. The RIFF/WAVE header the decoder writes
    /// ahead of the PCM payload is skipped here; if the stream turns out not
    /// to be a WAV at all, the bytes are replayed as raw PCM instead.
    pub fn new(reader: Box<dyn Read + Send>) -> Self {
        let mut bridge = Self {
            reader,
            ring: vec![0u8; RING_CAPACITY].into_boxed_slice(),
            head: 0,
            len: 0,
            eof: false,
        };
        bridge.skip_wav_header();
        bridge
    }

    /// Pull up to `out.len()` bytes, refilling the ring from the subprocess
    /// stream as needed. Returns the number of bytes written; 0 means the
    /// stream is exhausted.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let mut written = 0;

        while written < out.len() {
            if self.len == 0 {
                self.refill();
                if self.len == 0 {
                    break;
                }
            }

            let take = (out.len() - written).min(self.len);
            for slot in &mut out[written..written + take] {
                *slot = self.ring[self.head];
                self.head = (self.head + 1) % self.ring.len();
                self.len -= 1;
            }
            written += take;
        }

        written
    }

    /// One read from the pipe into the contiguous free span of the ring.
    fn refill(&mut self) {
        if self.eof || self.len == self.ring.len() {
            return;
        }

        let tail = (self.head + self.len) % self.ring.len();
        let span_end = if tail >= self.head || self.len == 0 {
            self.ring.len()
        } else {
            self.head
        };

        match self.reader.read(&mut self.ring[tail..span_end]) {
            Ok(0) => {
                log::debug!("Audio stream ended");
                self.eof = true;
            }
            Ok(n) => self.len += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                log::debug!("Audio stream read failed, treating as end of stream: {}", e);
                self.eof = true;
            }
        }
    }

    fn push_front_bytes(&mut self, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.ring[i] = b;
        }
        self.head = 0;
        self.len = bytes.len();
    }

    /// Consume the RIFF header and position the stream at the PCM payload.
    fn skip_wav_header(&mut self) {
        let mut riff = [0u8; 12];
        if !self.read_exact_from_pipe(&mut riff) {
            return;
        }

        if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
            log::warn!("Audio stream is not a WAV container, playing it as raw PCM");
            self.push_front_bytes(&riff);
            return;
        }

        // Walk chunks until the data chunk; its payload is the PCM stream.
        loop {
            let mut header = [0u8; 8];
            if !self.read_exact_from_pipe(&mut header) {
                return;
            }
            let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            if &header[0..4] == b"data" {
                return;
            }
            // Chunk payloads are word-aligned.
            let skip = size as u64 + (size % 2) as u64;
            if std::io::copy(&mut (&mut self.reader).take(skip), &mut std::io::sink()).is_err() {
                self.eof = true;
                return;
            }
        }
    }

    fn read_exact_from_pipe(&mut self, buf: &mut [u8]) -> bool {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => {
                    self.eof = true;
                    return false;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    log::debug!("Audio header read failed: {}", e);
                    self.eof = true;
                    return false;
                }
            }
        }
        true
    }
}

impl Iterator for AudioBridge {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        let mut sample = [0u8; 2];
        if self.read(&mut sample) < 2 {
            return None;
        }
        Some(i16::from_le_bytes(sample))
    }
}

impl Source for AudioBridge {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        AUDIO_CHANNELS
    }

    fn sample_rate(&self) -> u32 {
        AUDIO_SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
