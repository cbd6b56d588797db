//! Synthetic frame sources.

use image::{Rgb, RgbImage};
use rand::Rng;
use std::time::{Duration, Instant};

use super::CaptureDevice;
use crate::error::CaptureError;
use crate::frame::Frame;

pub const NOISE_WIDTH: u32 = 640;
pub const NOISE_HEIGHT: u32 = 640;
pub const NOISE_FPS: u32 = 15;

pub const PATTERN_WIDTH: u32 = 640;
pub const PATTERN_HEIGHT: u32 = 480;
pub const PATTERN_FPS: u32 = 10;
/// Frames between synthetic scene changes.
const SCENE_PERIOD: u64 = 50;

/// Sleeps just long enough to hold `fps`.
struct Pacer {
    period: Duration,
    next_at: Option<Instant>,
}

impl Pacer {
    fn new(fps: u32) -> Self {
        Self {
            period: Duration::from_secs(1) / fps.max(1),
            next_at: None,
        }
    }

    fn wait(&mut self) {
        let now = Instant::now();
        if let Some(next_at) = self.next_at {
            if next_at > now {
                std::thread::sleep(next_at - now);
            }
        }
        self.next_at = Some(Instant::now() + self.period);
    }
}

// ----------------------------------------------------------------------------
// `test`: uniform noise
// ----------------------------------------------------------------------------

/// 640x640 uniformly random RGB frames at 15 Hz. Never fails.
pub struct NoiseSource {
    pacer: Pacer,
}

impl NoiseSource {
    pub fn new() -> Self {
        Self {
            pacer: Pacer::new(NOISE_FPS),
        }
    }

    pub fn frame_period() -> Duration {
        Duration::from_secs(1) / NOISE_FPS
    }
}

impl Default for NoiseSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDevice for NoiseSource {
    fn connect(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        self.pacer.wait();
        let mut pixels = vec![0u8; (NOISE_WIDTH * NOISE_HEIGHT * 3) as usize];
        rand::thread_rng().fill(&mut pixels[..]);
        Ok(Frame::from_rgb(NOISE_WIDTH, NOISE_HEIGHT, pixels)?)
    }
}

// ----------------------------------------------------------------------------
// `stub://`: deterministic scene
// ----------------------------------------------------------------------------

/// Static gradient background with a bright block that jumps to a new
/// position every `SCENE_PERIOD` frames.
pub struct PatternSource {
    name: String,
    width: u32,
    height: u32,
    frame_count: u64,
    scene_state: u64,
    pacer: Pacer,
}

impl PatternSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_geometry(name, PATTERN_WIDTH, PATTERN_HEIGHT, PATTERN_FPS)
    }

    pub fn with_geometry(name: impl Into<String>, width: u32, height: u32, fps: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            frame_count: 0,
            scene_state: 0,
            pacer: Pacer::new(fps),
        }
    }

    fn render(&self) -> RgbImage {
        let block = (self.width.min(self.height) / 6).max(1);
        let slots_x = (self.width / block).max(1) as u64;
        let slots_y = (self.height / block).max(1) as u64;
        let slot = self.scene_state.wrapping_mul(7);
        let bx = ((slot % slots_x) as u32) * block;
        let by = (((slot / slots_x) % slots_y) as u32) * block;

        RgbImage::from_fn(self.width, self.height, |x, y| {
            if x >= bx && x < bx + block && y >= by && y < by + block {
                Rgb([240, 240, 240])
            } else {
                let shade = ((x + y) % 64) as u8 + 32;
                Rgb([shade, shade / 2, 64])
            }
        })
    }
}

impl CaptureDevice for PatternSource {
    fn connect(&mut self) -> Result<(), CaptureError> {
        log::info!("PatternSource: connected to stub://{} (synthetic)", self.name);
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        self.pacer.wait();
        self.frame_count += 1;
        if self.frame_count % SCENE_PERIOD == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        Ok(Frame::new(self.render()))
    }
}
