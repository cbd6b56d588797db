#![cfg(feature = "backend-tract")]

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::{GrayImage, Luma};
use tract_onnx::prelude::*;

use crate::config::InferenceSettings;
use crate::detect::backend::{Detector, ExecutionProvider};
use crate::detect::result::Inference;
use crate::frame::Frame;

const BOX_FIELDS: usize = 4;
const IOU_THRESHOLD: f32 = 0.45;
const PAD_VALUE: f32 = 144.0 / 255.0;
const MASK_THRESHOLD: f32 = 0.5;

type Plan = RunnableModel<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// YOLOv8 instance segmentation on the CPU via tract.
///
/// Expects the usual two outputs: predictions `[1, 4 + classes + coefs, anchors]`
/// and prototypes `[1, coefs, mh, mw]`.
pub struct TractSegDetector {
    model: Option<Plan>,
    settings: InferenceSettings,
}

#[derive(Clone, Debug)]
struct Candidate {
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    class_id: u32,
    score: f32,
    coefs: Vec<f32>,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x1 - self.x0).max(0.0) * (self.y1 - self.y0).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let w = (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0);
        let h = (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0);
        let inter = w * h;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

impl TractSegDetector {
    /// Validate the model path; the graph itself is loaded by `start`.
    pub fn load(settings: &InferenceSettings) -> Result<Self> {
        if !settings.model_path.exists() {
            return Err(anyhow!(
                "model file {} does not exist",
                settings.model_path.display()
            ));
        }
        Ok(Self {
            model: None,
            settings: settings.clone(),
        })
    }

    fn input_size(&self) -> (u32, u32) {
        (self.settings.input_width, self.settings.input_height)
    }

    fn build_plan(&self) -> Result<Plan> {
        let (width, height) = self.input_size();
        let path = &self.settings.model_path;
        tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("failed to load ONNX model from {}", path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")
    }

    /// Letterbox into the top-left corner of the model input.
    fn build_input(&self, frame: &Frame) -> (Tensor, f32) {
        let (in_w, in_h) = self.input_size();
        let ratio = (in_w as f32 / frame.width() as f32).min(in_h as f32 / frame.height() as f32);
        let new_w = ((frame.width() as f32 * ratio).round() as u32).clamp(1, in_w);
        let new_h = ((frame.height() as f32 * ratio).round() as u32).clamp(1, in_h);
        let resized = image::imageops::resize(frame.image(), new_w, new_h, FilterType::Triangle);

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, in_h as usize, in_w as usize),
            |(_, channel, y, x)| {
                if (x as u32) < new_w && (y as u32) < new_h {
                    resized.get_pixel(x as u32, y as u32).0[channel] as f32 / 255.0
                } else {
                    PAD_VALUE
                }
            },
        );
        (input.into_tensor(), ratio)
    }

    fn candidates(
        &self,
        preds: &tract_ndarray::ArrayViewD<'_, f32>,
        num_coefs: usize,
        ratio: f32,
        frame: &Frame,
    ) -> Result<Vec<Candidate>> {
        let shape = preds.shape();
        if shape.len() != 3 || shape[1] <= BOX_FIELDS + num_coefs {
            return Err(anyhow!("unexpected prediction shape {:?}", shape));
        }
        let num_classes = shape[1] - BOX_FIELDS - num_coefs;
        let (fw, fh) = (frame.width() as f32, frame.height() as f32);

        let mut out = Vec::new();
        for anchor in 0..shape[2] {
            let mut best = (0usize, f32::NEG_INFINITY);
            for class in 0..num_classes {
                let score = preds[[0, BOX_FIELDS + class, anchor]];
                if score > best.1 {
                    best = (class, score);
                }
            }
            if best.1 < self.settings.score_threshold {
                continue;
            }
            let cx = preds[[0, 0, anchor]] / ratio;
            let cy = preds[[0, 1, anchor]] / ratio;
            let w = preds[[0, 2, anchor]] / ratio;
            let h = preds[[0, 3, anchor]] / ratio;
            let coefs = (0..num_coefs)
                .map(|k| preds[[0, BOX_FIELDS + num_classes + k, anchor]])
                .collect();
            out.push(Candidate {
                x0: (cx - w / 2.0).clamp(0.0, fw),
                y0: (cy - h / 2.0).clamp(0.0, fh),
                x1: (cx + w / 2.0).clamp(0.0, fw),
                y1: (cy + h / 2.0).clamp(0.0, fh),
                class_id: best.0 as u32,
                score: best.1,
                coefs,
            });
        }
        Ok(out)
    }

    /// Project prototype coefficients into a frame-sized binary mask,
    /// limited to the candidate's box.
    fn render_mask(
        &self,
        candidate: &Candidate,
        protos: &tract_ndarray::ArrayViewD<'_, f32>,
        ratio: f32,
        frame: &Frame,
    ) -> GrayImage {
        let (in_w, in_h) = self.input_size();
        let (mh, mw) = (protos.shape()[2], protos.shape()[3]);
        let sx = ratio * mw as f32 / in_w as f32;
        let sy = ratio * mh as f32 / in_h as f32;

        let mut mask = GrayImage::new(frame.width(), frame.height());
        let x_end = (candidate.x1.ceil() as u32).min(frame.width());
        let y_end = (candidate.y1.ceil() as u32).min(frame.height());
        for y in candidate.y0.floor() as u32..y_end {
            let py = ((y as f32 * sy) as usize).min(mh - 1);
            for x in candidate.x0.floor() as u32..x_end {
                let px = ((x as f32 * sx) as usize).min(mw - 1);
                let logit: f32 = candidate
                    .coefs
                    .iter()
                    .enumerate()
                    .map(|(k, c)| c * protos[[0, k, py, px]])
                    .sum();
                if sigmoid(logit) > MASK_THRESHOLD {
                    mask.put_pixel(x, y, Luma([255]));
                }
            }
        }
        mask
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Greedy suppression, highest score first.
fn non_max_suppression(candidates: &mut Vec<Candidate>, iou_threshold: f32) {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates.drain(..) {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    *candidates = kept;
}

impl Detector for TractSegDetector {
    fn name(&self) -> &'static str {
        "tract-yolov8-seg"
    }

    fn provider(&self) -> ExecutionProvider {
        ExecutionProvider::SoftwareFallback
    }

    fn start(&mut self) -> Result<()> {
        if self.model.is_none() {
            self.model = Some(self.build_plan()?);
            log::info!(
                "loaded segmentation model {}",
                self.settings.model_path.display()
            );
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.model = None;
    }

    fn infer(&mut self, frame: &Frame) -> Result<Option<Inference>> {
        let Some(model) = self.model.as_ref() else {
            return Ok(None);
        };
        let (input, ratio) = self.build_input(frame);
        let outputs = model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        if outputs.len() < 2 {
            return Err(anyhow!(
                "segmentation model produced {} outputs, expected 2",
                outputs.len()
            ));
        }
        let preds = outputs[0]
            .to_array_view::<f32>()
            .context("prediction tensor was not f32")?;
        let protos = outputs[1]
            .to_array_view::<f32>()
            .context("prototype tensor was not f32")?;
        if protos.ndim() != 4 {
            return Err(anyhow!("unexpected prototype shape {:?}", protos.shape()));
        }
        let num_coefs = protos.shape()[1];

        let mut candidates = self.candidates(&preds, num_coefs, ratio, frame)?;
        non_max_suppression(&mut candidates, IOU_THRESHOLD);

        let mut masks = Vec::with_capacity(candidates.len());
        let mut class_ids = Vec::with_capacity(candidates.len());
        let mut scores = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            masks.push(self.render_mask(candidate, &protos, ratio, frame));
            class_ids.push(candidate.class_id);
            scores.push(candidate.score);
        }
        Inference::new(masks, class_ids, scores).map(Some)
    }
}
