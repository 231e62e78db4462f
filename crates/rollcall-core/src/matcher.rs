//! Nearest-neighbor identity matching over a gallery snapshot.

use crate::types::{Descriptor, Gallery};

/// Default maximum Euclidean distance for a positive match. Lower = stricter.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Result of matching a probe descriptor against the gallery.
///
/// Recomputed per query, never persisted. On an empty gallery the
/// distance is `f32::INFINITY`.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Best Euclidean distance found across the whole gallery.
    pub distance: f32,
    /// Label of the best match when within threshold.
    pub label: Option<String>,
}

impl MatchResult {
    /// Label for display purposes; unmatched probes render as "unknown".
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or("unknown")
    }
}

/// Matcher over an immutable gallery snapshot.
///
/// Construction is cheap by design: callers rebuild the matcher after
/// every gallery mutation instead of patching it incrementally, so a
/// matcher can never reference stale gallery state.
#[derive(Debug, Clone)]
pub struct FaceMatcher {
    gallery: Gallery,
    threshold: f32,
}

impl FaceMatcher {
    pub fn new(gallery: Gallery, threshold: f32) -> Self {
        Self { gallery, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Find the enrolled identity closest to the probe.
    ///
    /// Each identity is represented by the minimum distance among its own
    /// samples; the winner is the identity with the smallest such minimum.
    /// The threshold is inclusive: `distance <= threshold` is a match.
    ///
    /// Ties on exact equal distance resolve to the first-inserted identity
    /// (the scan uses strict `<`), which is stable for identical input.
    pub fn find_best_match(&self, probe: &Descriptor) -> MatchResult {
        let mut best_distance = f32::INFINITY;
        let mut best_label: Option<&str> = None;

        for record in self.gallery.iter() {
            let identity_distance = record
                .descriptors
                .iter()
                .map(|d| probe.euclidean_distance(d))
                .fold(f32::INFINITY, f32::min);

            if identity_distance < best_distance {
                best_distance = identity_distance;
                best_label = Some(&record.label);
            }
        }

        match best_label {
            Some(label) if best_distance <= self.threshold => MatchResult {
                matched: true,
                distance: best_distance,
                label: Some(label.to_string()),
            },
            _ => MatchResult {
                matched: false,
                distance: best_distance,
                label: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IdentityRecord, RecordSource};

    fn desc(values: &[f32]) -> Descriptor {
        Descriptor::new(values.to_vec())
    }

    fn record(label: &str, descriptors: &[&[f32]]) -> IdentityRecord {
        IdentityRecord::new(
            label,
            descriptors.iter().map(|v| desc(v)).collect(),
            RecordSource::Bundled,
        )
    }

    #[test]
    fn empty_gallery_is_unknown() {
        let matcher = FaceMatcher::new(Gallery::new(), DEFAULT_MATCH_THRESHOLD);
        let result = matcher.find_best_match(&desc(&[1.0, 0.0]));
        assert!(!result.matched);
        assert_eq!(result.display_label(), "unknown");
        assert_eq!(result.distance, f32::INFINITY);
    }

    #[test]
    fn exact_sample_matches_at_distance_zero() {
        let gallery: Gallery = [record("Budi", &[&[0.1, 0.2], &[0.5, 0.5]])]
            .into_iter()
            .collect();
        let matcher = FaceMatcher::new(gallery, DEFAULT_MATCH_THRESHOLD);

        let result = matcher.find_best_match(&desc(&[0.5, 0.5]));
        assert!(result.matched);
        assert_eq!(result.label.as_deref(), Some("Budi"));
        assert_eq!(result.distance, 0.0);
    }

    #[test]
    fn identity_represented_by_closest_sample() {
        // Budi's second sample is the exact probe; Siti's only sample is closer
        // than Budi's first. Budi must still win via his minimum.
        let gallery: Gallery = [
            record("Budi", &[&[10.0, 10.0], &[0.3, 0.4]]),
            record("Siti", &[&[1.0, 1.0]]),
        ]
        .into_iter()
        .collect();
        let matcher = FaceMatcher::new(gallery, DEFAULT_MATCH_THRESHOLD);

        let result = matcher.find_best_match(&desc(&[0.3, 0.4]));
        assert!(result.matched);
        assert_eq!(result.label.as_deref(), Some("Budi"));
        assert_eq!(result.distance, 0.0);
    }

    #[test]
    fn threshold_is_inclusive() {
        // Probe at exactly threshold distance from the only sample.
        let gallery: Gallery = [record("Budi", &[&[0.0, 0.0]])].into_iter().collect();
        let matcher = FaceMatcher::new(gallery, 0.5);

        let result = matcher.find_best_match(&desc(&[0.3, 0.4]));
        assert!((result.distance - 0.5).abs() < 1e-6);
        assert!(result.matched);
        assert_eq!(result.label.as_deref(), Some("Budi"));
    }

    #[test]
    fn beyond_threshold_is_unknown_with_distance() {
        let gallery: Gallery = [record("Budi", &[&[0.0, 0.0]])].into_iter().collect();
        let matcher = FaceMatcher::new(gallery, 0.4);

        let result = matcher.find_best_match(&desc(&[0.3, 0.4]));
        assert!(!result.matched);
        assert!(result.label.is_none());
        assert!((result.distance - 0.5).abs() < 1e-6);
    }

    #[test]
    fn exact_tie_goes_to_first_inserted() {
        // Both identities sit at the same distance from the probe.
        let gallery: Gallery = [
            record("Budi", &[&[1.0, 0.0]]),
            record("Siti", &[&[-1.0, 0.0]]),
        ]
        .into_iter()
        .collect();
        let matcher = FaceMatcher::new(gallery.clone(), 2.0);

        for _ in 0..3 {
            let result = matcher.find_best_match(&desc(&[0.0, 0.0]));
            assert_eq!(result.label.as_deref(), Some("Budi"));
        }
    }

    #[test]
    fn scan_covers_whole_gallery() {
        // Best match is the last record; every entry must be visited.
        let gallery: Gallery = [
            record("decoy1", &[&[5.0, 5.0]]),
            record("decoy2", &[&[7.0, 7.0]]),
            record("target", &[&[0.0, 0.1]]),
        ]
        .into_iter()
        .collect();
        let matcher = FaceMatcher::new(gallery, DEFAULT_MATCH_THRESHOLD);

        let result = matcher.find_best_match(&desc(&[0.0, 0.0]));
        assert!(result.matched);
        assert_eq!(result.label.as_deref(), Some("target"));
    }
}
