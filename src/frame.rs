//! Frame snapshots and the single-slot mailbox.
//!
//! - `Frame`: immutable RGB snapshot. Cloning shares the pixel buffer, which
//!   is never mutated after construction, so every holder sees the same bytes.
//! - `Mailbox<T>`: holds at most one value. Each `post` overwrites the
//!   previous value (drop-if-newer-arrives); `peek` copies the handle out
//!   without blocking the writer beyond the swap.

use anyhow::{anyhow, Result};
use image::{GrayImage, RgbImage};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One decoded image snapshot from a camera.
#[derive(Clone, Debug)]
pub struct Frame {
    image: Arc<RgbImage>,
    captured_at: SystemTime,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image: Arc::new(image),
            captured_at: SystemTime::now(),
        }
    }

    /// Build a frame from packed RGB24 bytes.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("failed to wrap {}x{} RGB buffer", width, height))?;
        Ok(Self::new(image))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    /// Capture time as fractional seconds since the Unix epoch.
    pub fn captured_at_secs(&self) -> f64 {
        self.captured_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn to_luma(&self) -> GrayImage {
        image::imageops::grayscale(&*self.image)
    }
}

// ----------------------------------------------------------------------------
// Mailbox
// ----------------------------------------------------------------------------

/// Single-slot, overwrite-on-post cell shared between one writer and readers.
///
/// The critical section is a handle clone or swap; neither side waits on the
/// other's progress.
#[derive(Debug)]
pub struct Mailbox<T: Clone> {
    slot: Mutex<Option<T>>,
}

impl<T: Clone> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Replace the held value. Returns true if an unread value was dropped.
    pub fn post(&self, value: T) -> bool {
        let mut slot = match self.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.replace(value).is_some()
    }

    /// Copy out the most recent value, leaving it in place.
    pub fn peek(&self) -> Option<T> {
        match self.slot.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Remove and return the held value.
    pub fn take(&self) -> Option<T> {
        match self.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    pub fn clear(&self) {
        let _ = self.take();
    }
}

impl<T: Clone> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
