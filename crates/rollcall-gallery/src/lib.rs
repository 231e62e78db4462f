//! rollcall-gallery — the hybrid identity gallery.
//!
//! Two sources feed one in-memory gallery: bundled reference photos
//! (folder-per-label, configured via TOML) and the durable JSON store
//! written by enrollment. [`GalleryManager`] owns the merged result and
//! keeps gallery, store, and matcher consistent across mutations.

pub mod loader;
pub mod manager;
pub mod store;

pub use loader::{load_references, LoadReport, LoaderError, ReferenceConfig, ReferenceIdentity};
pub use manager::{merge_galleries, EnrollError, GalleryManager};
pub use store::{GalleryStore, StoreError, STORE_SCHEMA_VERSION};

#[cfg(test)]
pub(crate) mod testutil {
    use image::{DynamicImage, Rgb, RgbImage};
    use rollcall_core::{
        AnalyzerError, BoundingBox, Descriptor, FaceAnalyzer, FaceObservation,
    };

    /// Analyzer stub keyed on the top-left pixel: a bright red channel
    /// (>= 128) is "one face" whose descriptor encodes the pixel color;
    /// anything darker is "no face". Robust to JPEG round-trips.
    pub struct StubAnalyzer;

    impl FaceAnalyzer for StubAnalyzer {
        fn detect_all_faces(
            &mut self,
            image: &DynamicImage,
        ) -> Result<Vec<FaceObservation>, AnalyzerError> {
            let pixel = image.to_rgb8().get_pixel(0, 0).0;
            if pixel[0] < 128 {
                return Ok(Vec::new());
            }
            Ok(vec![FaceObservation {
                bbox: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: 8.0,
                    height: 8.0,
                    confidence: 0.99,
                    landmarks: None,
                },
                descriptor: Descriptor::new(
                    pixel.iter().map(|&c| c as f32 / 255.0).collect(),
                ),
                attributes: None,
            }])
        }
    }

    /// Solid-color image the stub treats as containing a face.
    pub fn face_image(r: u8, g: u8, b: u8) -> DynamicImage {
        debug_assert!(r >= 128);
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([r, g, b])))
    }

    /// Black image the stub treats as containing no face.
    pub fn no_face_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])))
    }
}
