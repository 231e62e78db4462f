use serde::{Deserialize, Serialize};

/// Face descriptor: a fixed-length embedding vector produced by the
/// face-analysis model. Immutable once produced.
///
/// Every descriptor in a running system has the same length (set by the
/// model); distances are only meaningful between equal-length vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Compute Euclidean distance to another descriptor. Smaller = more similar.
    pub fn euclidean_distance(&self, other: &Descriptor) -> f32 {
        debug_assert_eq!(self.values.len(), other.values.len());
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

/// Score for one facial expression class, in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpressionScore {
    pub label: String,
    pub score: f32,
}

/// Soft attributes estimated for a detected face.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceAttributes {
    pub age: f32,
    pub gender: Gender,
    /// Per-class expression scores; empty when no expression model is loaded.
    pub expressions: Vec<ExpressionScore>,
}

impl FaceAttributes {
    /// The highest-scoring expression, if any were estimated.
    pub fn top_expression(&self) -> Option<&ExpressionScore> {
        self.expressions.iter().max_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}

/// One detected face: where it is, its descriptor, and optional attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceObservation {
    pub bbox: BoundingBox,
    pub descriptor: Descriptor,
    pub attributes: Option<FaceAttributes>,
}

/// Where an identity record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    /// Shipped with the application as reference photos.
    Bundled,
    /// Enrolled at runtime.
    Enrolled,
}

/// An enrolled identity: a label plus one or more reference descriptors.
///
/// Multiple descriptors represent multiple enrolled samples (different
/// photos or angles); all of them are match candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub label: String,
    pub descriptors: Vec<Descriptor>,
    pub source: RecordSource,
    /// RFC 3339 timestamp of first enrollment, when known.
    pub created_at: Option<String>,
}

impl IdentityRecord {
    pub fn new(label: impl Into<String>, descriptors: Vec<Descriptor>, source: RecordSource) -> Self {
        Self {
            label: label.into(),
            descriptors,
            source,
            created_at: None,
        }
    }
}

/// The full set of enrolled identities, keyed by unique label.
///
/// Records keep their insertion order; the matcher relies on that order
/// as its deterministic tie-break.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gallery {
    records: Vec<IdentityRecord>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.records.iter().any(|r| r.label == label)
    }

    pub fn get(&self, label: &str) -> Option<&IdentityRecord> {
        self.records.iter().find(|r| r.label == label)
    }

    pub fn get_mut(&mut self, label: &str) -> Option<&mut IdentityRecord> {
        self.records.iter_mut().find(|r| r.label == label)
    }

    /// Append a record. Returns false (and leaves the gallery unchanged)
    /// if a record with the same label already exists.
    pub fn insert(&mut self, record: IdentityRecord) -> bool {
        if self.contains(&record.label) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &IdentityRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[IdentityRecord] {
        &self.records
    }
}

impl FromIterator<IdentityRecord> for Gallery {
    /// Collect records, keeping the first record for each label.
    fn from_iter<T: IntoIterator<Item = IdentityRecord>>(iter: T) -> Self {
        let mut gallery = Gallery::new();
        for record in iter {
            gallery.insert(record);
        }
        gallery
    }
}
