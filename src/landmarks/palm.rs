use std::{cmp::Ordering, f32::consts::PI, path::Path};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::preprocess::{HandCrop, Letterbox, letterbox};
use crate::types::{Frame, PalmRegion};

pub const PALM_INPUT_SIZE: u32 = 192;
const PALM_KEYPOINTS: usize = 7;
const BOX_FEATURES: usize = 4 + PALM_KEYPOINTS * 2;

// SSD layout of the palm model: one feature map per stride, two anchors per
// cell per layer, layers with the same stride share a grid.
const ANCHOR_STRIDES: [u32; 4] = [8, 16, 16, 16];
const ANCHORS_PER_LAYER: usize = 2;

// Palm keypoints used to orient the hand crop.
const KEYPOINT_WRIST: usize = 0;
const KEYPOINT_MIDDLE_MCP: usize = 2;

// Palm box to hand crop.
const CROP_SCALE: f32 = 2.6;
const CROP_SHIFT: f32 = 0.5;

#[derive(Clone, Debug)]
pub struct PalmDetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
}

impl Default for PalmDetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.3,
            top_k: 1,
        }
    }
}

pub struct PalmDetector {
    session: Session,
    anchors: Vec<[f32; 2]>,
    cfg: PalmDetectorConfig,
}

impl PalmDetector {
    pub fn new(model_path: &Path, cfg: PalmDetectorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load palm detector from {}", model_path.display())
            })?;

        Ok(Self {
            session,
            anchors: generate_anchors(PALM_INPUT_SIZE),
            cfg,
        })
    }

    /// Palm regions in frame pixels, best score first.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<PalmRegion>> {
        let (input, letterbox) = letterbox(frame, PALM_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run palm detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;

        let features = boxes.shape().last().copied().unwrap_or(0);
        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();

        decode_palms(&boxes, features, &scores, &self.anchors, &letterbox, &self.cfg)
    }
}

/// Anchor centers (relative to the model input) in model output order.
pub fn generate_anchors(input_size: u32) -> Vec<[f32; 2]> {
    let mut anchors = Vec::new();
    let mut layer = 0;

    while layer < ANCHOR_STRIDES.len() {
        let stride = ANCHOR_STRIDES[layer];
        let mut per_cell = 0;
        while layer < ANCHOR_STRIDES.len() && ANCHOR_STRIDES[layer] == stride {
            per_cell += ANCHORS_PER_LAYER;
            layer += 1;
        }

        let cells = input_size.div_ceil(stride);
        for y in 0..cells {
            for x in 0..cells {
                let center = [
                    (x as f32 + 0.5) / cells as f32,
                    (y as f32 + 0.5) / cells as f32,
                ];
                anchors.extend(std::iter::repeat_n(center, per_cell));
            }
        }
    }

    anchors
}

/// Decodes raw palm model outputs into frame-space regions.
///
/// `boxes` holds `features` values per anchor (cx, cy, w, h, then seven
/// keypoints), offsets in model input pixels; `scores` one logit per anchor.
pub fn decode_palms(
    boxes: &[f32],
    features: usize,
    scores: &[f32],
    anchors: &[[f32; 2]],
    letterbox: &Letterbox,
    cfg: &PalmDetectorConfig,
) -> Result<Vec<PalmRegion>> {
    if features < BOX_FEATURES {
        return Err(anyhow!("palm box feature dimension too small: {features}"));
    }
    let count = anchors.len().min(scores.len()).min(boxes.len() / features);
    let input = letterbox.input_size as f32;

    let mut candidates = Vec::new();
    for (idx, anchor) in anchors.iter().take(count).enumerate() {
        let score = sigmoid(scores[idx]);
        if score < cfg.score_threshold {
            continue;
        }

        let raw = &boxes[idx * features..idx * features + BOX_FEATURES];
        let cx = raw[0] / input + anchor[0];
        let cy = raw[1] / input + anchor[1];
        let (hw, hh) = (raw[2] / input / 2.0, raw[3] / input / 2.0);
        if hw <= 0.0 || hh <= 0.0 {
            continue;
        }

        let (x1, y1) = letterbox.to_frame(cx - hw, cy - hh);
        let (x2, y2) = letterbox.to_frame(cx + hw, cy + hh);
        let landmarks = raw[4..]
            .chunks_exact(2)
            .map(|kp| letterbox.to_frame(kp[0] / input + anchor[0], kp[1] / input + anchor[1]))
            .collect();

        candidates.push(PalmRegion {
            bbox: [x1, y1, x2, y2],
            landmarks,
            score,
        });
    }

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut kept: Vec<PalmRegion> = Vec::new();
    for candidate in candidates {
        if kept.len() >= cfg.top_k {
            break;
        }
        if kept
            .iter()
            .all(|k| iou(&k.bbox, &candidate.bbox) < cfg.nms_threshold)
        {
            kept.push(candidate);
        }
    }

    Ok(kept)
}

/// Square crop around the whole hand, rotated so the fingers point up.
pub fn crop_from_palm(region: &PalmRegion) -> HandCrop {
    let [x1, y1, x2, y2] = region.bbox;
    let size = (x2 - x1).max(y2 - y1);

    let angle = match (
        region.landmarks.get(KEYPOINT_WRIST),
        region.landmarks.get(KEYPOINT_MIDDLE_MCP),
    ) {
        (Some(wrist), Some(middle)) => {
            normalize_angle((middle.0 - wrist.0).atan2(wrist.1 - middle.1))
        }
        _ => 0.0,
    };

    // Shift toward the fingers, which stick out of the palm box.
    let (sin, cos) = angle.sin_cos();
    let shift = CROP_SHIFT * size;
    let center = ((x1 + x2) / 2.0 + sin * shift, (y1 + y2) / 2.0 - cos * shift);

    HandCrop {
        center,
        side: size * CROP_SCALE,
        angle,
    }
}

fn normalize_angle(angle: f32) -> f32 {
    angle - 2.0 * PI * ((angle + PI) / (2.0 * PI)).floor()
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }

    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
