//! Analysis engine: a dedicated OS thread owning the ONNX analyzer and
//! the gallery manager, serving requests over a channel.
//!
//! Putting every gallery mutation behind one channel serializes
//! enrollments by construction: one completes, persistence included,
//! before the next is picked up.

use crate::config::Config;
use rollcall_core::{AnalyzerError, FaceAnalyzer, OnnxFaceAnalyzer, RecordSource};
use rollcall_gallery::{
    EnrollError, GalleryManager, GalleryStore, LoadReport, ReferenceConfig,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("enrollment failed: {0}")]
    Enroll(#[from] EnrollError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// One annotated face from a detection cycle, as handed to the
/// rendering layer.
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub bbox: rollcall_core::BoundingBox,
    /// Best-match label, or "unknown".
    pub label: String,
    /// Best distance found; absent when the gallery is empty.
    pub distance: Option<f32>,
    pub age: Option<f32>,
    pub gender: Option<rollcall_core::Gender>,
    pub top_expression: Option<String>,
}

/// One gallery entry, as reported to UI clients.
#[derive(Debug, Clone, Serialize)]
pub struct IdentitySummary {
    pub label: String,
    pub samples: usize,
    pub source: RecordSource,
    pub created_at: Option<String>,
}

/// Messages sent from the D-Bus handlers and the detection loop to the
/// engine thread.
enum EngineRequest {
    Enroll {
        label: String,
        image_paths: Vec<PathBuf>,
        reply: oneshot::Sender<Result<usize, EngineError>>,
    },
    Observe {
        frame: image::DynamicImage,
        reply: oneshot::Sender<Result<Vec<Observation>, EngineError>>,
    },
    List {
        reply: oneshot::Sender<Vec<IdentitySummary>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Request enrollment: decode the given image files, extract
    /// descriptors, update and persist the gallery.
    pub async fn enroll(
        &self,
        label: String,
        image_paths: Vec<PathBuf>,
    ) -> Result<usize, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll {
                label,
                image_paths,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Run one detection-and-match cycle over a frame.
    pub async fn observe(
        &self,
        frame: image::DynamicImage,
    ) -> Result<Vec<Observation>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Observe {
                frame,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// List the current gallery contents.
    pub async fn list(&self) -> Result<Vec<IdentitySummary>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::List { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads the model bundle and builds the hybrid gallery synchronously
/// before spawning, so an unavailable model fails startup immediately
/// rather than surfacing on the first request.
pub fn spawn_engine(config: &Config) -> Result<(EngineHandle, LoadReport), EngineError> {
    let mut analyzer = OnnxFaceAnalyzer::load(&config.model_dir)?;
    tracing::info!(model_dir = %config.model_dir.display(), "face analyzer loaded");

    let references = match ReferenceConfig::from_file(&config.references_path) {
        Ok(references) => references,
        Err(e) => {
            tracing::warn!(
                path = %config.references_path.display(),
                error = %e,
                "reference config unavailable; no bundled identities"
            );
            ReferenceConfig::empty()
        }
    };

    let store = GalleryStore::new(&config.gallery_path);
    let (mut manager, report) = GalleryManager::bootstrap(
        store,
        &references,
        &mut analyzer,
        config.match_threshold,
    );

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll {
                        label,
                        image_paths,
                        reply,
                    } => {
                        let result = run_enroll(&mut analyzer, &mut manager, &label, &image_paths);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Observe { frame, reply } => {
                        let result = run_observe(&mut analyzer, &manager, &frame);
                        let _ = reply.send(result);
                    }
                    EngineRequest::List { reply } => {
                        let _ = reply.send(summarize(&manager));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Ok((EngineHandle { tx }, report))
}

/// Decode the uploaded files (unreadable ones are skipped, non-fatal)
/// and hand the survivors to the gallery manager.
fn run_enroll(
    analyzer: &mut OnnxFaceAnalyzer,
    manager: &mut GalleryManager,
    label: &str,
    image_paths: &[PathBuf],
) -> Result<usize, EngineError> {
    let mut images = Vec::with_capacity(image_paths.len());
    for path in image_paths {
        match image::open(path) {
            Ok(image) => images.push(image),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "enrollment image unreadable; skipping");
            }
        }
    }

    if images.is_empty() {
        return Err(EnrollError::AllImagesFailed(image_paths.len()).into());
    }

    Ok(manager.enroll(analyzer, label, &images)?)
}

/// Detect all faces in the frame and match each against the gallery.
fn run_observe(
    analyzer: &mut OnnxFaceAnalyzer,
    manager: &GalleryManager,
    frame: &image::DynamicImage,
) -> Result<Vec<Observation>, EngineError> {
    let faces = analyzer.detect_all_faces(frame)?;
    tracing::debug!(faces = faces.len(), "detection cycle");

    Ok(faces
        .into_iter()
        .map(|face| {
            let result = manager.find_best_match(&face.descriptor);
            let distance = result.distance.is_finite().then_some(result.distance);
            let (age, gender, top_expression) = match &face.attributes {
                Some(attrs) => (
                    Some(attrs.age),
                    Some(attrs.gender),
                    attrs.top_expression().map(|e| e.label.clone()),
                ),
                None => (None, None, None),
            };

            Observation {
                bbox: face.bbox,
                label: result.display_label().to_string(),
                distance,
                age,
                gender,
                top_expression,
            }
        })
        .collect())
}

fn summarize(manager: &GalleryManager) -> Vec<IdentitySummary> {
    manager
        .gallery()
        .iter()
        .map(|record| IdentitySummary {
            label: record.label.clone(),
            samples: record.descriptors.len(),
            source: record.source,
            created_at: record.created_at.clone(),
        })
        .collect()
}
