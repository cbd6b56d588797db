use anyhow::Result;
use image::{GrayImage, Luma};

use crate::detect::backend::{Detector, ExecutionProvider};
use crate::detect::result::Inference;
use crate::frame::Frame;

pub const MOCK_CLASS_ID: u32 = 0;
pub const MOCK_SCORE: f32 = 0.95;

/// Engine used when no model can run. Reports one filled circle centred in
/// the frame with radius `height / 4`.
#[derive(Default)]
pub struct MockDetector {
    started: bool,
}

impl MockDetector {
    pub fn new() -> Self {
        Self::default()
    }
}

fn centered_disc(width: u32, height: u32) -> GrayImage {
    let (cx, cy) = (width as i64 / 2, height as i64 / 2);
    let r = height as i64 / 4;
    GrayImage::from_fn(width, height, |x, y| {
        let dx = x as i64 - cx;
        let dy = y as i64 - cy;
        if dx * dx + dy * dy <= r * r {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

impl Detector for MockDetector {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn provider(&self) -> ExecutionProvider {
        ExecutionProvider::Mock
    }

    fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.started = false;
    }

    fn infer(&mut self, frame: &Frame) -> Result<Option<Inference>> {
        if !self.started {
            return Ok(None);
        }
        let mask = centered_disc(frame.width(), frame.height());
        Inference::new(vec![mask], vec![MOCK_CLASS_ID], vec![MOCK_SCORE]).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn unready_until_started() {
        let mut detector = MockDetector::new();
        let frame = Frame::new(RgbImage::new(64, 48));
        assert!(detector.infer(&frame).unwrap().is_none());

        detector.start().unwrap();
        let inference = detector.infer(&frame).unwrap().unwrap();
        assert_eq!(inference.len(), 1);
        let detection = inference.detections().next().unwrap();
        assert_eq!(detection.class_id, 0);
        assert_eq!(detection.score, 0.95);
        assert_eq!(detection.mask.dimensions(), (64, 48));
        assert_eq!(detection.mask.get_pixel(32, 24).0, [255]);
        assert_eq!(detection.mask.get_pixel(0, 0).0, [0]);

        detector.stop();
        assert!(detector.infer(&frame).unwrap().is_none());
    }
}
