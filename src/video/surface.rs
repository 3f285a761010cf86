use std::sync::{Arc, Mutex};

use crate::video::frame_reader::{DecodedFrame, BYTES_PER_PIXEL};

/// Where decoded frames land. The surface copies each frame into its own
/// buffer; no shared mutable ownership crosses this boundary, and the hand-off
/// is never assumed synchronous with rendering.
pub trait DisplaySurface: Send {
    /// Size (or re-size) the surface for a new session's geometry.
    fn configure(&mut self, width: u32, height: u32);

    /// Copy one raw frame. Must reject a slice whose length is not
    /// width * height * 4 for the configured geometry.
    fn present(&mut self, pixels: &[u8]) -> anyhow::Result<()>;
}

struct SurfaceState {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    frames_presented: u64,
}

/// Clonable frame buffer for UIs that poll for the latest frame: the pacing
/// loop presents into it, the render side reads it under the same lock.
#[derive(Clone)]
pub struct SharedFrameBuffer {
    state: Arc<Mutex<SurfaceState>>,
}

impl SharedFrameBuffer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SurfaceState {
                width: 0,
                height: 0,
                pixels: Vec::new(),
                frames_presented: 0,
            })),
        }
    }

    /// Monotonic count of frames presented, for change detection.
    pub fn frames_presented(&self) -> u64 {
        self.state.lock().map(|s| s.frames_presented).unwrap_or(0)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.state.lock().map(|s| (s.width, s.height)).unwrap_or((0, 0))
    }

    /// Run `f` over the current frame pixels without copying them out.
    pub fn with_frame<T>(&self, f: impl FnOnce(u32, u32, &[u8]) -> T) -> Option<T> {
        let state = self.state.lock().ok()?;
        if state.pixels.is_empty() {
            return None;
        }
        Some(f(state.width, state.height, &state.pixels))
    }

    /// Copy the current frame out, if any.
    pub fn snapshot(&self) -> Option<DecodedFrame> {
        self.with_frame(|width, height, pixels| DecodedFrame {
            width,
            height,
            data: pixels.to_vec(),
        })
    }
}

impl Default for SharedFrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySurface for SharedFrameBuffer {
    fn configure(&mut self, width: u32, height: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.width = width;
            state.height = height;
            state.pixels.clear();
            state
                .pixels
                .resize(width as usize * height as usize * BYTES_PER_PIXEL, 0);
            state.frames_presented = 0;
        }
    }

    fn present(&mut self, pixels: &[u8]) -> anyhow::Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("display surface lock poisoned"))?;

        let expected = state.width as usize * state.height as usize * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(anyhow::anyhow!(
                "rejecting frame of {} bytes, surface is {}x{} ({} bytes)",
                pixels.len(),
                state.width,
                state.height,
                expected
            ));
        }

        state.pixels.copy_from_slice(pixels);
        state.frames_presented += 1;
        Ok(())
    }
}
