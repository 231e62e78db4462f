//! rollcall-core — face descriptors, gallery types, and identity matching.
//!
//! The pretrained model bundle sits behind the [`FaceAnalyzer`] trait;
//! [`OnnxFaceAnalyzer`] runs it via ONNX Runtime for CPU inference.

pub mod analyzer;
pub mod matcher;
pub mod onnx;
pub mod types;

pub use analyzer::{AnalyzerError, FaceAnalyzer};
pub use matcher::{FaceMatcher, MatchResult, DEFAULT_MATCH_THRESHOLD};
pub use onnx::OnnxFaceAnalyzer;
pub use types::{
    BoundingBox, Descriptor, ExpressionScore, FaceAttributes, FaceObservation, Gallery, Gender,
    IdentityRecord, RecordSource,
};
