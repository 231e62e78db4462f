//! Bundled reference identities: a folder of photos per configured label.
//!
//! Loading is best-effort by policy: unreadable images and images with no
//! detectable face are skipped with a structured warning, and a label
//! that yields zero descriptors is omitted from the result entirely.

use rollcall_core::{FaceAnalyzer, Gallery, IdentityRecord, RecordSource};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("reference config parse: {0}")]
    Parse(#[from] toml::de::Error),
}

fn default_image_count() -> u32 {
    2
}

/// One bundled identity: a label and how many numbered photos it ships.
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceIdentity {
    pub label: String,
    /// Photos are expected at `{root}/{label}/{1..=images}.jpg`.
    #[serde(default = "default_image_count")]
    pub images: u32,
}

/// Reference gallery configuration, supplied as a TOML file:
///
/// ```toml
/// root = "labeled_images"
///
/// [[identity]]
/// label = "Budi"
/// images = 2
///
/// [[identity]]
/// label = "Siti"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceConfig {
    pub root: PathBuf,
    #[serde(rename = "identity", default)]
    pub identities: Vec<ReferenceIdentity>,
}

impl ReferenceConfig {
    /// A config with no identities; bundled loading becomes a no-op.
    pub fn empty() -> Self {
        Self {
            root: PathBuf::from("labeled_images"),
            identities: Vec::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, LoaderError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    fn image_path(&self, label: &str, index: u32) -> PathBuf {
        self.root.join(label).join(format!("{index}.jpg"))
    }
}

/// Summary of one bundled-load pass, for logs and status reporting.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Labels that produced at least one descriptor.
    pub loaded: usize,
    /// Labels omitted because no image yielded a descriptor.
    pub skipped_labels: Vec<String>,
    /// Images that failed to read or contained no detectable face.
    pub failed_images: usize,
}

/// Run every configured reference image through the analyzer and build
/// the bundled gallery. Images are processed sequentially, in config
/// order, so record and descriptor order is deterministic.
pub fn load_references(
    config: &ReferenceConfig,
    analyzer: &mut dyn FaceAnalyzer,
) -> (Gallery, LoadReport) {
    let mut gallery = Gallery::new();
    let mut report = LoadReport::default();

    for identity in &config.identities {
        let mut descriptors = Vec::new();

        for index in 1..=identity.images {
            let path = config.image_path(&identity.label, index);
            let image = match image::open(&path) {
                Ok(image) => image,
                Err(e) => {
                    tracing::warn!(
                        label = %identity.label,
                        path = %path.display(),
                        error = %e,
                        "reference image unreadable; skipping"
                    );
                    report.failed_images += 1;
                    continue;
                }
            };

            match analyzer.detect_face(&image) {
                Ok(Some(observation)) => descriptors.push(observation.descriptor),
                Ok(None) => {
                    tracing::warn!(
                        label = %identity.label,
                        path = %path.display(),
                        "no face in reference image; skipping"
                    );
                    report.failed_images += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        label = %identity.label,
                        path = %path.display(),
                        error = %e,
                        "analysis failed for reference image; skipping"
                    );
                    report.failed_images += 1;
                }
            }
        }

        if descriptors.is_empty() {
            tracing::warn!(label = %identity.label, "no usable reference images; label omitted");
            report.skipped_labels.push(identity.label.clone());
            continue;
        }

        tracing::info!(
            label = %identity.label,
            descriptors = descriptors.len(),
            "bundled identity loaded"
        );
        gallery.insert(IdentityRecord::new(
            identity.label.clone(),
            descriptors,
            RecordSource::Bundled,
        ));
        report.loaded += 1;
    }

    (gallery, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{face_image, no_face_image, StubAnalyzer};

    fn write_jpg(path: &Path, image: &image::DynamicImage) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        image.save(path).unwrap();
    }

    fn config(root: &Path, identities: &[(&str, u32)]) -> ReferenceConfig {
        ReferenceConfig {
            root: root.to_path_buf(),
            identities: identities
                .iter()
                .map(|(label, images)| ReferenceIdentity {
                    label: label.to_string(),
                    images: *images,
                })
                .collect(),
        }
    }

    #[test]
    fn parses_toml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("references.toml");
        std::fs::write(
            &path,
            "root = \"labeled_images\"\n\n[[identity]]\nlabel = \"Budi\"\nimages = 3\n\n[[identity]]\nlabel = \"Siti\"\n",
        )
        .unwrap();

        let config = ReferenceConfig::from_file(&path).unwrap();
        assert_eq!(config.root, PathBuf::from("labeled_images"));
        assert_eq!(config.identities.len(), 2);
        assert_eq!(config.identities[0].images, 3);
        // Omitted image count falls back to the default of 2.
        assert_eq!(config.identities[1].images, 2);
    }

    #[test]
    fn loads_labels_with_usable_images() {
        let dir = tempfile::tempdir().unwrap();
        write_jpg(&dir.path().join("Budi/1.jpg"), &face_image(200, 10, 10));
        write_jpg(&dir.path().join("Budi/2.jpg"), &face_image(210, 20, 20));

        let mut analyzer = StubAnalyzer;
        let (gallery, report) =
            load_references(&config(dir.path(), &[("Budi", 2)]), &mut analyzer);

        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.get("Budi").unwrap().descriptors.len(), 2);
        assert_eq!(gallery.get("Budi").unwrap().source, RecordSource::Bundled);
        assert_eq!(report.loaded, 1);
        assert_eq!(report.failed_images, 0);
    }

    #[test]
    fn missing_folder_omits_label() {
        let dir = tempfile::tempdir().unwrap();
        write_jpg(&dir.path().join("Budi/1.jpg"), &face_image(200, 10, 10));

        let mut analyzer = StubAnalyzer;
        let (gallery, report) = load_references(
            &config(dir.path(), &[("Budi", 2), ("Ghost", 2)]),
            &mut analyzer,
        );

        assert!(gallery.contains("Budi"));
        assert!(!gallery.contains("Ghost"));
        assert_eq!(report.skipped_labels, vec!["Ghost".to_string()]);
        // Budi/2.jpg and both Ghost images are missing.
        assert_eq!(report.failed_images, 3);
    }

    #[test]
    fn faceless_images_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_jpg(&dir.path().join("Siti/1.jpg"), &no_face_image());
        write_jpg(&dir.path().join("Siti/2.jpg"), &face_image(220, 30, 30));

        let mut analyzer = StubAnalyzer;
        let (gallery, report) =
            load_references(&config(dir.path(), &[("Siti", 2)]), &mut analyzer);

        assert_eq!(gallery.get("Siti").unwrap().descriptors.len(), 1);
        assert_eq!(report.failed_images, 1);
    }

    #[test]
    fn label_with_only_faceless_images_is_omitted() {
        let dir = tempfile::tempdir().unwrap();
        write_jpg(&dir.path().join("Siti/1.jpg"), &no_face_image());
        write_jpg(&dir.path().join("Siti/2.jpg"), &no_face_image());

        let mut analyzer = StubAnalyzer;
        let (gallery, report) =
            load_references(&config(dir.path(), &[("Siti", 2)]), &mut analyzer);

        assert!(gallery.is_empty());
        assert_eq!(report.skipped_labels, vec!["Siti".to_string()]);
    }
}
