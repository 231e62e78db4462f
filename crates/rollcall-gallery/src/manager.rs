//! The hybrid gallery manager: one owned instance holding the merged
//! gallery, its persistence handle, and an always-current matcher.

use crate::loader::{load_references, LoadReport, ReferenceConfig};
use crate::store::{GalleryStore, StoreError};
use chrono::Utc;
use image::DynamicImage;
use rollcall_core::{
    Descriptor, FaceAnalyzer, FaceMatcher, Gallery, IdentityRecord, MatchResult, RecordSource,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("no face detected in any of the {0} supplied image(s)")]
    AllImagesFailed(usize),
    #[error("label must not be empty")]
    EmptyLabel,
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Merge bundled and stored galleries.
///
/// Bundled records win on label collision; a stored record is included
/// only when no bundled record carries its label. This is record-level
/// precedence, not a merge of descriptor lists.
pub fn merge_galleries(bundled: Gallery, stored: Gallery) -> Gallery {
    let mut merged = bundled;
    for record in stored.records() {
        if merged.contains(&record.label) {
            tracing::debug!(label = %record.label, "stored record shadowed by bundled record");
        } else {
            merged.insert(record.clone());
        }
    }
    merged
}

/// Owns the in-memory gallery and keeps three things consistent: the
/// gallery, the persisted store, and the matcher built from the gallery.
///
/// Every mutation rebuilds the matcher from a fresh snapshot; there is
/// deliberately no incremental matcher update to go stale.
pub struct GalleryManager {
    gallery: Gallery,
    matcher: FaceMatcher,
    store: GalleryStore,
    threshold: f32,
}

impl GalleryManager {
    /// Build the initial gallery: load bundled references through the
    /// analyzer, load the stored gallery, and merge with bundled
    /// precedence.
    pub fn bootstrap(
        store: GalleryStore,
        config: &ReferenceConfig,
        analyzer: &mut dyn FaceAnalyzer,
        threshold: f32,
    ) -> (Self, LoadReport) {
        let (bundled, report) = load_references(config, analyzer);
        let stored = store.load();

        tracing::info!(
            bundled = bundled.len(),
            stored = stored.len(),
            "building hybrid gallery"
        );
        let gallery = merge_galleries(bundled, stored);
        tracing::info!(identities = gallery.len(), "hybrid gallery ready");

        (Self::from_gallery(gallery, store, threshold), report)
    }

    /// Wrap an already-built gallery. Used by [`bootstrap`](Self::bootstrap)
    /// and by callers that assemble galleries directly.
    pub fn from_gallery(gallery: Gallery, store: GalleryStore, threshold: f32) -> Self {
        let matcher = FaceMatcher::new(gallery.clone(), threshold);
        Self {
            gallery,
            matcher,
            store,
            threshold,
        }
    }

    /// Enroll descriptors for `label` from the given images.
    ///
    /// Each image is analyzed independently; failures are skipped. With
    /// zero successes the call fails and neither the gallery nor the
    /// store changes. Otherwise descriptors are appended to an existing
    /// record (never replacing prior samples) or a new record is
    /// inserted, the full gallery is persisted, and the matcher rebuilt.
    ///
    /// The updated gallery is persisted before it replaces the in-memory
    /// one, so a failed save leaves no partial state behind.
    ///
    /// Labels match by exact string equality; callers trim whitespace
    /// before this boundary.
    pub fn enroll(
        &mut self,
        analyzer: &mut dyn FaceAnalyzer,
        label: &str,
        images: &[DynamicImage],
    ) -> Result<usize, EnrollError> {
        if label.is_empty() {
            return Err(EnrollError::EmptyLabel);
        }

        let mut descriptors = Vec::new();
        for (index, image) in images.iter().enumerate() {
            match analyzer.detect_face(image) {
                Ok(Some(observation)) => descriptors.push(observation.descriptor),
                Ok(None) => {
                    tracing::warn!(label, index, "no face in enrollment image; skipping");
                }
                Err(e) => {
                    tracing::warn!(label, index, error = %e, "enrollment image analysis failed; skipping");
                }
            }
        }

        if descriptors.is_empty() {
            return Err(EnrollError::AllImagesFailed(images.len()));
        }
        let added = descriptors.len();

        let mut candidate = self.gallery.clone();
        match candidate.get_mut(label) {
            Some(record) => record.descriptors.extend(descriptors),
            None => {
                let mut record =
                    IdentityRecord::new(label, descriptors, RecordSource::Enrolled);
                record.created_at = Some(Utc::now().to_rfc3339());
                candidate.insert(record);
            }
        }

        self.store.save(&candidate)?;
        self.gallery = candidate;
        self.rebuild_matcher();

        tracing::info!(label, added, identities = self.gallery.len(), "enrollment complete");
        Ok(added)
    }

    /// Match a probe descriptor against the current gallery.
    pub fn find_best_match(&self, probe: &Descriptor) -> MatchResult {
        self.matcher.find_best_match(probe)
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn rebuild_matcher(&mut self) {
        self.matcher = FaceMatcher::new(self.gallery.clone(), self.threshold);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{face_image, no_face_image, StubAnalyzer};
    use rollcall_core::DEFAULT_MATCH_THRESHOLD;

    fn record(label: &str, values: &[f32], source: RecordSource) -> IdentityRecord {
        IdentityRecord::new(label, vec![Descriptor::new(values.to_vec())], source)
    }

    fn temp_store(dir: &tempfile::TempDir) -> GalleryStore {
        GalleryStore::new(dir.path().join("gallery.json"))
    }

    #[test]
    fn merge_bundled_wins_on_collision() {
        let bundled: Gallery = [record("X", &[1.0], RecordSource::Bundled)].into_iter().collect();
        let stored: Gallery = [record("X", &[9.0], RecordSource::Enrolled)].into_iter().collect();

        let merged = merge_galleries(bundled, stored);
        assert_eq!(merged.len(), 1);
        let x = merged.get("X").unwrap();
        assert_eq!(x.source, RecordSource::Bundled);
        assert_eq!(x.descriptors[0].values, vec![1.0]);
    }

    #[test]
    fn merge_is_additive_across_labels() {
        let bundled: Gallery = [record("X", &[1.0], RecordSource::Bundled)].into_iter().collect();
        let stored: Gallery = [record("Y", &[2.0], RecordSource::Enrolled)].into_iter().collect();

        let merged = merge_galleries(bundled, stored);
        assert_eq!(merged.len(), 2);
        assert!(merged.contains("X"));
        assert!(merged.contains("Y"));
    }

    #[test]
    fn bootstrap_merges_stored_into_empty_bundled() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        let stored: Gallery = [record("Y", &[0.5, 0.5, 0.5], RecordSource::Enrolled)]
            .into_iter()
            .collect();
        store.save(&stored).unwrap();

        let mut analyzer = StubAnalyzer;
        let (manager, report) = GalleryManager::bootstrap(
            temp_store(&dir),
            &ReferenceConfig::empty(),
            &mut analyzer,
            DEFAULT_MATCH_THRESHOLD,
        );

        assert_eq!(report.loaded, 0);
        assert_eq!(manager.gallery().len(), 1);
        assert!(manager.gallery().contains("Y"));
    }

    #[test]
    fn enroll_appends_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = GalleryManager::from_gallery(
            Gallery::new(),
            temp_store(&dir),
            DEFAULT_MATCH_THRESHOLD,
        );
        let mut analyzer = StubAnalyzer;

        let added = manager
            .enroll(&mut analyzer, "Budi", &[face_image(200, 0, 0)])
            .unwrap();
        assert_eq!(added, 1);

        let added = manager
            .enroll(&mut analyzer, "Budi", &[face_image(220, 0, 0)])
            .unwrap();
        assert_eq!(added, 1);

        // Two samples, in call order.
        let record = manager.gallery().get("Budi").unwrap();
        assert_eq!(record.descriptors.len(), 2);
        assert!(record.descriptors[0].values[0] < record.descriptors[1].values[0]);
        assert_eq!(record.source, RecordSource::Enrolled);
        assert!(record.created_at.is_some());

        // The persisted store sees the same content.
        let reloaded = temp_store(&dir).load();
        assert_eq!(reloaded.get("Budi").unwrap().descriptors.len(), 2);
    }

    #[test]
    fn enroll_with_no_faces_fails_and_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        let gallery: Gallery = [record("X", &[1.0, 0.0, 0.0], RecordSource::Enrolled)]
            .into_iter()
            .collect();
        store.save(&gallery).unwrap();
        let before = std::fs::read(store.path()).unwrap();

        let mut manager =
            GalleryManager::from_gallery(gallery.clone(), store, DEFAULT_MATCH_THRESHOLD);
        let mut analyzer = StubAnalyzer;

        let err = manager
            .enroll(&mut analyzer, "X", &[no_face_image(), no_face_image()])
            .unwrap_err();
        assert!(matches!(err, EnrollError::AllImagesFailed(2)));

        // In-memory and persisted state byte-identical to before.
        assert_eq!(manager.gallery(), &gallery);
        let after = std::fs::read(manager_store_path(&dir)).unwrap();
        assert_eq!(before, after);
    }

    fn manager_store_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
        dir.path().join("gallery.json")
    }

    #[test]
    fn enroll_rejects_empty_label() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = GalleryManager::from_gallery(
            Gallery::new(),
            temp_store(&dir),
            DEFAULT_MATCH_THRESHOLD,
        );
        let mut analyzer = StubAnalyzer;

        let err = manager
            .enroll(&mut analyzer, "", &[face_image(200, 0, 0)])
            .unwrap_err();
        assert!(matches!(err, EnrollError::EmptyLabel));
    }

    #[test]
    fn matcher_sees_enrollment_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = GalleryManager::from_gallery(
            Gallery::new(),
            temp_store(&dir),
            DEFAULT_MATCH_THRESHOLD,
        );
        let mut analyzer = StubAnalyzer;

        let probe = Descriptor::new(vec![200.0 / 255.0, 0.0, 0.0]);
        assert!(!manager.find_best_match(&probe).matched);

        manager
            .enroll(&mut analyzer, "Budi", &[face_image(200, 0, 0)])
            .unwrap();

        let result = manager.find_best_match(&probe);
        assert!(result.matched);
        assert_eq!(result.label.as_deref(), Some("Budi"));
        assert!(result.distance < 1e-6);
    }

    #[test]
    fn budi_siti_exact_query_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let d1 = Descriptor::new(vec![0.9, 0.1, 0.0]);
        let d2 = Descriptor::new(vec![0.1, 0.9, 0.0]);
        let d3 = Descriptor::new(vec![0.0, 0.0, 1.0]);

        let mut gallery = Gallery::new();
        gallery.insert(IdentityRecord::new(
            "Budi",
            vec![d1, d2.clone()],
            RecordSource::Bundled,
        ));
        gallery.insert(IdentityRecord::new("Siti", vec![d3], RecordSource::Bundled));

        let manager =
            GalleryManager::from_gallery(gallery, temp_store(&dir), DEFAULT_MATCH_THRESHOLD);

        let result = manager.find_best_match(&d2);
        assert!(result.matched);
        assert_eq!(result.label.as_deref(), Some("Budi"));
        assert_eq!(result.distance, 0.0);
    }
}
