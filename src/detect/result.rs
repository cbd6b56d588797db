use anyhow::{anyhow, Result};
use image::GrayImage;

/// Co-indexed segmentation output for one frame.
///
/// `masks[i]`, `class_ids[i]` and `scores[i]` describe the same object.
#[derive(Clone, Debug, Default)]
pub struct Inference {
    masks: Vec<GrayImage>,
    class_ids: Vec<u32>,
    scores: Vec<f32>,
}

/// Borrowed view of one detected object.
#[derive(Clone, Copy, Debug)]
pub struct Detection<'a> {
    /// Non-zero pixels belong to the object.
    pub mask: &'a GrayImage,
    pub class_id: u32,
    pub score: f32,
}

impl Inference {
    pub fn new(masks: Vec<GrayImage>, class_ids: Vec<u32>, scores: Vec<f32>) -> Result<Self> {
        if masks.len() != class_ids.len() || masks.len() != scores.len() {
            return Err(anyhow!(
                "inference arrays are not co-indexed: {} masks, {} class ids, {} scores",
                masks.len(),
                class_ids.len(),
                scores.len()
            ));
        }
        Ok(Self {
            masks,
            class_ids,
            scores,
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    pub fn detections(&self) -> impl Iterator<Item = Detection<'_>> {
        self.masks
            .iter()
            .zip(&self.class_ids)
            .zip(&self.scores)
            .map(|((mask, &class_id), &score)| Detection {
                mask,
                class_id,
                score,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_lengths() {
        let mask = GrayImage::new(4, 4);
        assert!(Inference::new(vec![mask.clone()], vec![1, 2], vec![0.5]).is_err());
        assert!(Inference::new(vec![mask], vec![1], vec![]).is_err());
    }

    #[test]
    fn detections_pair_up_by_index() {
        let inference = Inference::new(
            vec![GrayImage::new(2, 2), GrayImage::new(2, 2)],
            vec![3, 7],
            vec![0.9, 0.4],
        )
        .unwrap();
        let pairs: Vec<_> = inference
            .detections()
            .map(|d| (d.class_id, d.score))
            .collect();
        assert_eq!(pairs, vec![(3, 0.9), (7, 0.4)]);
        assert!(Inference::empty().is_empty());
    }
}
