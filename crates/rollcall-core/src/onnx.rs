//! ONNX-backed face analyzer.
//!
//! Wraps the pretrained model bundle behind [`FaceAnalyzer`]: a detection
//! model with a decoded output head (one row per candidate face), an
//! embedding model producing 512-dimensional descriptors, and optional
//! gender/age and expression models.

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::types::{
    BoundingBox, Descriptor, ExpressionScore, FaceAttributes, FaceObservation, Gender,
};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const DETECT_INPUT_SIZE: usize = 640;
const DETECT_MEAN: f32 = 127.5;
const DETECT_STD: f32 = 128.0;
const DETECT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DETECT_NMS_THRESHOLD: f32 = 0.4;
/// Detection head row: [score, x1, y1, x2, y2, 5 × (lx, ly)].
const DETECT_ROW_LEN: usize = 15;

const EMBED_INPUT_SIZE: usize = 112;
const EMBED_MEAN: f32 = 127.5;
const EMBED_STD: f32 = 127.5;
const EMBED_DIM: usize = 512;

const ATTR_INPUT_SIZE: usize = 96;
const EXPR_INPUT_SIZE: usize = 64;
const EXPRESSION_LABELS: [&str; 8] = [
    "neutral", "happy", "surprised", "sad", "angry", "disgusted", "fearful", "contempt",
];

/// Margin factor applied around a detected box before the embedding crop.
const CROP_MARGIN: f32 = 1.2;

const DETECTOR_MODEL_FILE: &str = "det_500m.onnx";
const EMBEDDER_MODEL_FILE: &str = "w600k_mbf.onnx";
const GENDERAGE_MODEL_FILE: &str = "genderage.onnx";
const EXPRESSION_MODEL_FILE: &str = "expression.onnx";

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

pub struct OnnxFaceAnalyzer {
    detector: Session,
    embedder: Session,
    genderage: Option<Session>,
    expression: Option<Session>,
}

impl OnnxFaceAnalyzer {
    /// Load the model bundle from a directory.
    ///
    /// The detection and embedding models are required; gender/age and
    /// expression models are optional and their absence only disables
    /// the corresponding attributes.
    pub fn load(model_dir: &Path) -> Result<Self, AnalyzerError> {
        let detector = load_session(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let embedder = load_session(&model_dir.join(EMBEDDER_MODEL_FILE))?;

        let genderage = load_optional_session(&model_dir.join(GENDERAGE_MODEL_FILE));
        let expression = load_optional_session(&model_dir.join(EXPRESSION_MODEL_FILE));

        Ok(Self {
            detector,
            embedder,
            genderage,
            expression,
        })
    }

    fn detect_boxes(&mut self, image: &DynamicImage) -> Result<Vec<BoundingBox>, AnalyzerError> {
        let (input, letterbox) = letterbox_preprocess(image);

        let outputs = self
            .detector
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AnalyzerError::InferenceFailed(format!("detection head: {e}")))?;

        let candidates = decode_detections(data, &letterbox, DETECT_CONFIDENCE_THRESHOLD);
        let mut boxes = nms(candidates, DETECT_NMS_THRESHOLD);
        boxes.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(boxes)
    }

    fn extract_descriptor(
        &mut self,
        image: &DynamicImage,
        bbox: &BoundingBox,
    ) -> Result<Descriptor, AnalyzerError> {
        let crop = crop_face(image, bbox, EMBED_INPUT_SIZE as u32);
        let input = to_nchw(&crop, EMBED_INPUT_SIZE, EMBED_MEAN, EMBED_STD);

        let outputs = self
            .embedder
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AnalyzerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != EMBED_DIM {
            return Err(AnalyzerError::InferenceFailed(format!(
                "expected {EMBED_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        // L2-normalize so Euclidean distances are comparable across probes.
        let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            raw.iter().map(|x| x / norm).collect()
        } else {
            raw.to_vec()
        };

        Ok(Descriptor::new(values))
    }

    fn estimate_attributes(
        &mut self,
        image: &DynamicImage,
        bbox: &BoundingBox,
    ) -> Result<Option<FaceAttributes>, AnalyzerError> {
        let Some(session) = self.genderage.as_mut() else {
            return Ok(None);
        };

        let crop = crop_face(image, bbox, ATTR_INPUT_SIZE as u32);
        let input = to_nchw(&crop, ATTR_INPUT_SIZE, DETECT_MEAN, DETECT_STD);

        // Scoped so the session outputs are dropped before the expression pass.
        let (age, gender) = {
            let outputs =
                session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
            let (_, raw) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| AnalyzerError::InferenceFailed(format!("gender/age head: {e}")))?;

            // Output layout: [female_score, male_score, age / 100].
            if raw.len() < 3 {
                return Err(AnalyzerError::InferenceFailed(format!(
                    "gender/age head returned {} values, need 3",
                    raw.len()
                )));
            }
            let gender = if raw[1] > raw[0] { Gender::Male } else { Gender::Female };
            ((raw[2] * 100.0).clamp(0.0, 120.0), gender)
        };

        let expressions = self.estimate_expressions(image, bbox)?;

        Ok(Some(FaceAttributes { age, gender, expressions }))
    }

    fn estimate_expressions(
        &mut self,
        image: &DynamicImage,
        bbox: &BoundingBox,
    ) -> Result<Vec<ExpressionScore>, AnalyzerError> {
        let Some(session) = self.expression.as_mut() else {
            return Ok(Vec::new());
        };

        let crop = crop_face(image, bbox, EXPR_INPUT_SIZE as u32);
        let input = to_nchw(&crop, EXPR_INPUT_SIZE, DETECT_MEAN, DETECT_STD);

        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AnalyzerError::InferenceFailed(format!("expression head: {e}")))?;

        if raw.len() < EXPRESSION_LABELS.len() {
            return Err(AnalyzerError::InferenceFailed(format!(
                "expression head returned {} values, need {}",
                raw.len(),
                EXPRESSION_LABELS.len()
            )));
        }

        Ok(softmax(&raw[..EXPRESSION_LABELS.len()])
            .into_iter()
            .zip(EXPRESSION_LABELS)
            .map(|(score, label)| ExpressionScore { label: label.to_string(), score })
            .collect())
    }
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn detect_all_faces(
        &mut self,
        image: &DynamicImage,
    ) -> Result<Vec<FaceObservation>, AnalyzerError> {
        let boxes = self.detect_boxes(image)?;
        let mut observations = Vec::with_capacity(boxes.len());

        for bbox in boxes {
            let descriptor = self.extract_descriptor(image, &bbox)?;
            let attributes = self.estimate_attributes(image, &bbox)?;
            observations.push(FaceObservation { bbox, descriptor, attributes });
        }

        Ok(observations)
    }
}

fn load_session(path: &Path) -> Result<Session, AnalyzerError> {
    if !path.exists() {
        return Err(AnalyzerError::ModelNotFound(path.display().to_string()));
    }

    let session = Session::builder()?
        .with_intra_threads(2)?
        .commit_from_file(path)?;

    tracing::info!(
        path = %path.display(),
        inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
        outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
        "loaded model"
    );

    Ok(session)
}

fn load_optional_session(path: &Path) -> Option<Session> {
    match load_session(path) {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "optional model unavailable");
            None
        }
    }
}

/// Resize with letterbox padding into a normalized NCHW tensor.
fn letterbox_preprocess(image: &DynamicImage) -> (Array4<f32>, LetterboxInfo) {
    let (width, height) = image.dimensions();
    let input = DETECT_INPUT_SIZE as f32;
    let scale = (input / width as f32).min(input / height as f32);

    let new_w = ((width as f32 * scale).round() as u32).max(1);
    let new_h = ((height as f32 * scale).round() as u32).max(1);
    let pad_x = (DETECT_INPUT_SIZE as f32 - new_w as f32) / 2.0;
    let pad_y = (DETECT_INPUT_SIZE as f32 - new_h as f32) / 2.0;

    let resized = image.resize_exact(new_w, new_h, FilterType::Triangle).to_rgb8();

    let pad_x_start = pad_x.floor() as u32;
    let pad_y_start = pad_y.floor() as u32;

    let mut tensor = Array4::<f32>::zeros((1, 3, DETECT_INPUT_SIZE, DETECT_INPUT_SIZE));
    for y in 0..DETECT_INPUT_SIZE as u32 {
        for x in 0..DETECT_INPUT_SIZE as u32 {
            let inside = y >= pad_y_start
                && y < pad_y_start + new_h
                && x >= pad_x_start
                && x < pad_x_start + new_w;
            for c in 0..3 {
                // Pad with the mean value so padding normalizes to 0.0.
                let pixel = if inside {
                    resized.get_pixel(x - pad_x_start, y - pad_y_start)[c] as f32
                } else {
                    DETECT_MEAN
                };
                tensor[[0, c, y as usize, x as usize]] = (pixel - DETECT_MEAN) / DETECT_STD;
            }
        }
    }

    (tensor, LetterboxInfo { scale, pad_x, pad_y })
}

/// Decode detection head rows into frame-space bounding boxes.
fn decode_detections(data: &[f32], letterbox: &LetterboxInfo, threshold: f32) -> Vec<BoundingBox> {
    let mut detections = Vec::new();

    for row in data.chunks_exact(DETECT_ROW_LEN) {
        let score = row[0];
        if score <= threshold {
            continue;
        }

        let x1 = (row[1] - letterbox.pad_x) / letterbox.scale;
        let y1 = (row[2] - letterbox.pad_y) / letterbox.scale;
        let x2 = (row[3] - letterbox.pad_x) / letterbox.scale;
        let y2 = (row[4] - letterbox.pad_y) / letterbox.scale;

        let mut landmarks = [(0.0f32, 0.0f32); 5];
        for (i, lm) in landmarks.iter_mut().enumerate() {
            *lm = (
                (row[5 + i * 2] - letterbox.pad_x) / letterbox.scale,
                (row[5 + i * 2 + 1] - letterbox.pad_y) / letterbox.scale,
            );
        }

        detections.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks: Some(landmarks),
        });
    }

    detections
}

/// Non-Maximum Suppression: remove overlapping detections.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<BoundingBox> = Vec::new();
    for det in detections {
        if kept.iter().all(|k| iou(k, &det) <= iou_threshold) {
            kept.push(det);
        }
    }
    kept
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Crop a square region around the box (with margin) and resize it.
fn crop_face(image: &DynamicImage, bbox: &BoundingBox, size: u32) -> image::RgbImage {
    let (width, height) = image.dimensions();

    let cx = bbox.x + bbox.width / 2.0;
    let cy = bbox.y + bbox.height / 2.0;
    let side = (bbox.width.max(bbox.height) * CROP_MARGIN).max(1.0);

    let x = (cx - side / 2.0).clamp(0.0, (width.saturating_sub(1)) as f32) as u32;
    let y = (cy - side / 2.0).clamp(0.0, (height.saturating_sub(1)) as f32) as u32;
    let w = (side as u32).min(width - x).max(1);
    let h = (side as u32).min(height - y).max(1);

    image
        .crop_imm(x, y, w, h)
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb8()
}

fn to_nchw(crop: &image::RgbImage, size: usize, mean: f32, std: f32) -> Array4<f32> {
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in crop.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - mean) / std;
        }
    }
    tensor
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|x| x / sum).collect()
}
