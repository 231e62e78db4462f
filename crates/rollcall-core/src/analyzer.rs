//! Descriptor source seam: the face-analysis capability behind a trait.

use crate::types::FaceObservation;
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("model file not found: {0} — place the ONNX model bundle in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Source of face observations for still images and video frames.
///
/// A clear image that simply contains no confident face is `Ok(None)`
/// (or an empty vec), never an error — errors are reserved for the
/// capability itself breaking.
pub trait FaceAnalyzer: Send {
    /// Detect at most one face: the highest-confidence detection, if any.
    fn detect_face(&mut self, image: &DynamicImage) -> Result<Option<FaceObservation>, AnalyzerError> {
        Ok(self.detect_all_faces(image)?.into_iter().next())
    }

    /// Detect all faces, sorted by descending confidence.
    fn detect_all_faces(&mut self, image: &DynamicImage) -> Result<Vec<FaceObservation>, AnalyzerError>;
}
