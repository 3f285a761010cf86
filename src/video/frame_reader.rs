use std::io::Read;

/// Bytes per pixel of the raw decoder output (BGRA).
pub const BYTES_PER_PIXEL: usize = 4;

/// One fully reassembled raw video frame.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl DecodedFrame {
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * BYTES_PER_PIXEL
    }
}

/// Outcome of one read_frame call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRead {
    /// The frame buffer holds one complete frame.
    Complete,
    /// The stream ended. Any partial frame bytes are discarded.
    EndOfStream,
}

/// Reassembles fixed-size frames from the decoder's stdout pipe.
///
/// The pipe delivers data in arbitrary-sized pushes, so each frame is
/// accumulated through a small scratch buffer until the caller's frame buffer
/// is full. The reader holds no per-frame state across calls; only the scratch
/// allocation is reused.
pub struct FrameReader {
    scratch: Vec<u8>,
}

impl FrameReader {
    /// Scratch size well below any realistic frame size.
    pub const CHUNK_LEN: usize = 32 * 1024;

    pub fn new() -> Self {
        Self {
            scratch: vec![0u8; Self::CHUNK_LEN],
        }
    }

    /// Read one full frame into `frame`, or report end of stream.
    ///
    /// A zero-length read mid-frame is end of stream, not corruption; the
    /// partial bytes are discarded. Read errors are likewise treated as end
    /// of stream so a dying decoder terminates playback instead of raising.
    pub fn read_frame<R: Read + ?Sized>(&mut self, reader: &mut R, frame: &mut [u8]) -> FrameRead {
        let mut filled = 0;

        while filled < frame.len() {
            let want = (frame.len() - filled).min(self.scratch.len());
            match reader.read(&mut self.scratch[..want]) {
                Ok(0) => {
                    if filled > 0 {
                        log::debug!(
                            "Stream ended mid-frame ({} of {} bytes), discarding partial frame",
                            filled,
                            frame.len()
                        );
                    }
                    return FrameRead::EndOfStream;
                }
                Ok(n) => {
                    frame[filled..filled + n].copy_from_slice(&self.scratch[..n]);
                    filled += n;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::debug!("Frame stream read failed, treating as end of stream: {}", e);
                    return FrameRead::EndOfStream;
                }
            }
        }

        FrameRead::Complete
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}
