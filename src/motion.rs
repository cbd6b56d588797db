//! Motion gating.
//!
//! A `MotionGate` decides whether a frame is worth sending to the detector.
//! The strategy is chosen once from configuration. Every call updates the
//! gate's internal model, whether or not the frame is allowed through.

use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{dilate, open};

use crate::config::{MotionSettings, MotionStrategy};
use crate::frame::Frame;
use crate::geometry::{contour_area, external_contours};

pub const DEFAULT_MIN_AREA: f64 = 500.0;
pub const DEFAULT_DIFF_THRESHOLD: u8 = 25;
pub const DEFAULT_HISTORY: u32 = 500;
pub const DEFAULT_VAR_THRESHOLD: f32 = 16.0;

const VAR_INIT: f32 = 15.0 * 15.0;
const VAR_MIN: f32 = 4.0;
const VAR_MAX: f32 = 5.0 * VAR_INIT;
const BLUR_SIGMA: f32 = 3.5;

pub enum MotionGate {
    Disabled,
    BackgroundSubtraction(BackgroundModel),
    FrameDifferencing(FrameDifferencer),
}

impl MotionGate {
    pub fn from_settings(settings: &MotionSettings) -> Self {
        if !settings.enabled {
            return MotionGate::Disabled;
        }
        match settings.strategy {
            MotionStrategy::BackgroundSubtraction => {
                MotionGate::BackgroundSubtraction(BackgroundModel::new(
                    settings.history,
                    settings.var_threshold,
                    settings.min_area,
                ))
            }
            MotionStrategy::FrameDifferencing => MotionGate::FrameDifferencing(
                FrameDifferencer::new(settings.threshold, settings.min_area),
            ),
        }
    }

    pub fn allow(&mut self, frame: &Frame) -> bool {
        match self {
            MotionGate::Disabled => true,
            MotionGate::BackgroundSubtraction(model) => model.allow(&frame.to_luma()),
            MotionGate::FrameDifferencing(diff) => diff.allow(&frame.to_luma()),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        match self {
            MotionGate::Disabled => "disabled",
            MotionGate::BackgroundSubtraction(_) => "background_subtraction",
            MotionGate::FrameDifferencing(_) => "frame_differencing",
        }
    }
}

fn any_region_larger_than(mask: &GrayImage, min_area: f64) -> bool {
    external_contours(mask)
        .iter()
        .any(|c| contour_area(&c.points) > min_area)
}

// ----------------------------------------------------------------------------
// Background subtraction
// ----------------------------------------------------------------------------

/// Per-pixel running Gaussian background model over grayscale intensity.
pub struct BackgroundModel {
    history: u32,
    var_threshold: f32,
    min_area: f64,
    width: u32,
    height: u32,
    mean: Vec<f32>,
    variance: Vec<f32>,
    frames_seen: u32,
}

impl BackgroundModel {
    pub fn new(history: u32, var_threshold: f32, min_area: f64) -> Self {
        Self {
            history: history.max(1),
            var_threshold,
            min_area,
            width: 0,
            height: 0,
            mean: Vec::new(),
            variance: Vec::new(),
            frames_seen: 0,
        }
    }

    fn reset(&mut self, gray: &GrayImage) {
        self.width = gray.width();
        self.height = gray.height();
        self.mean = gray.as_raw().iter().map(|&p| p as f32).collect();
        self.variance = vec![VAR_INIT; self.mean.len()];
        self.frames_seen = 1;
    }

    /// Update the model with `gray` and return the foreground mask.
    pub fn apply(&mut self, gray: &GrayImage) -> Option<GrayImage> {
        if self.frames_seen == 0 || gray.dimensions() != (self.width, self.height) {
            self.reset(gray);
            return None;
        }
        self.frames_seen = self.frames_seen.saturating_add(1);
        let alpha = 1.0 / self.frames_seen.min(self.history) as f32;

        let mut foreground = GrayImage::new(self.width, self.height);
        for (i, (&pixel, fg)) in gray.as_raw().iter().zip(foreground.iter_mut()).enumerate() {
            let value = pixel as f32;
            let delta = value - self.mean[i];
            let dist2 = delta * delta;
            if dist2 > self.var_threshold * self.variance[i] {
                *fg = 255;
            }
            self.mean[i] += alpha * delta;
            self.variance[i] =
                (self.variance[i] + alpha * (dist2 - self.variance[i])).clamp(VAR_MIN, VAR_MAX);
        }
        Some(foreground)
    }

    pub fn allow(&mut self, gray: &GrayImage) -> bool {
        let Some(foreground) = self.apply(gray) else {
            // model not warmed yet
            return true;
        };
        let cleaned = open(&foreground, Norm::LInf, 1);
        any_region_larger_than(&cleaned, self.min_area)
    }
}

// ----------------------------------------------------------------------------
// Frame differencing
// ----------------------------------------------------------------------------

/// Compares each frame against the previous blurred grayscale frame.
pub struct FrameDifferencer {
    threshold: u8,
    min_area: f64,
    previous: Option<GrayImage>,
}

impl FrameDifferencer {
    pub fn new(threshold: u8, min_area: f64) -> Self {
        Self {
            threshold,
            min_area,
            previous: None,
        }
    }

    pub fn allow(&mut self, gray: &GrayImage) -> bool {
        let current = gaussian_blur_f32(gray, BLUR_SIGMA);
        let moved = match &self.previous {
            Some(previous) if previous.dimensions() == current.dimensions() => {
                self.changed(previous, &current)
            }
            // first frame, or the stream changed resolution
            _ => true,
        };
        self.previous = Some(current);
        moved
    }

    fn changed(&self, previous: &GrayImage, current: &GrayImage) -> bool {
        let mut delta = GrayImage::new(current.width(), current.height());
        for ((out, a), b) in delta
            .iter_mut()
            .zip(previous.as_raw())
            .zip(current.as_raw())
        {
            if a.abs_diff(*b) > self.threshold {
                *out = 255;
            }
        }
        let closed = dilate(&delta, Norm::LInf, 2);
        any_region_larger_than(&closed, self.min_area)
    }
}
