use crate::engine::{EngineHandle, Observation};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use zbus::interface;

/// D-Bus interface for the rollcall daemon.
///
/// Bus name: org.rollcall.Rollcall1
/// Object path: /org/rollcall/Rollcall1
pub struct RollcallService {
    engine: EngineHandle,
    latest: Arc<Mutex<Vec<Observation>>>,
    overlay: Arc<AtomicBool>,
}

impl RollcallService {
    pub fn new(
        engine: EngineHandle,
        latest: Arc<Mutex<Vec<Observation>>>,
        overlay: Arc<AtomicBool>,
    ) -> Self {
        Self {
            engine,
            latest,
            overlay,
        }
    }
}

#[interface(name = "org.rollcall.Rollcall1")]
impl RollcallService {
    /// Enroll a person from photo files. Returns a human-readable
    /// success message; failures surface as D-Bus errors.
    async fn enroll_person(
        &self,
        name: &str,
        image_paths: Vec<String>,
    ) -> zbus::fdo::Result<String> {
        // Whitespace is trimmed here, at the UI boundary; the gallery
        // manager matches labels exactly as given.
        let name = name.trim();
        tracing::info!(name, images = image_paths.len(), "enroll requested");

        if name.is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs("name must not be empty".into()));
        }
        if image_paths.is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs(
                "at least one image is required".into(),
            ));
        }

        let paths: Vec<PathBuf> = image_paths.into_iter().map(PathBuf::from).collect();
        match self.engine.enroll(name.to_string(), paths).await {
            Ok(added) => Ok(format!("enrolled {added} descriptor(s) for '{name}'")),
            Err(e) => Err(zbus::fdo::Error::Failed(e.to_string())),
        }
    }

    /// Toggle landmark overlays in observation output. Rendering-only:
    /// detection and matching are unaffected.
    async fn set_overlay(&self, enabled: bool) -> zbus::fdo::Result<()> {
        self.overlay.store(enabled, Ordering::Relaxed);
        tracing::info!(enabled, "overlay toggled");
        Ok(())
    }

    /// Latest detection-cycle results as a JSON array of
    /// `{bbox, label, distance, age, gender, top_expression}`.
    async fn observations(&self) -> zbus::fdo::Result<String> {
        let mut observations = self
            .latest
            .lock()
            .map(|latest| latest.clone())
            .unwrap_or_default();

        if !self.overlay.load(Ordering::Relaxed) {
            for observation in &mut observations {
                observation.bbox.landmarks = None;
            }
        }

        serde_json::to_string(&observations).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Enrolled identities as a JSON array of
    /// `{label, samples, source, created_at}`.
    async fn list_identities(&self) -> zbus::fdo::Result<String> {
        let identities = self
            .engine
            .list()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        serde_json::to_string(&identities).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let identities = self
            .engine
            .list()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;

        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "identities": identities.len(),
            "overlay": self.overlay.load(Ordering::Relaxed),
        })
        .to_string())
    }
}
