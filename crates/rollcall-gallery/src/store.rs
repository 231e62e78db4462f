//! Durable gallery persistence: one versioned JSON document on disk.
//!
//! Saves are total-replace (last write wins) and atomic via a temp-file
//! rename. Loads never fail the caller: a missing file is an empty
//! gallery, and a corrupt file is logged and treated the same way.

use rollcall_core::{Descriptor, Gallery, IdentityRecord, RecordSource};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current on-disk schema version. Bump when the layout changes so old
/// data can be migrated instead of silently misread.
pub const STORE_SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
struct StoredGallery {
    version: u32,
    identities: Vec<StoredIdentity>,
}

#[derive(Serialize, Deserialize)]
struct StoredIdentity {
    label: String,
    descriptors: Vec<Vec<f32>>,
    #[serde(default)]
    source: Option<RecordSource>,
    #[serde(default)]
    created_at: Option<String>,
}

impl From<&IdentityRecord> for StoredIdentity {
    fn from(record: &IdentityRecord) -> Self {
        Self {
            label: record.label.clone(),
            descriptors: record
                .descriptors
                .iter()
                .map(|d| d.values.clone())
                .collect(),
            source: Some(record.source),
            created_at: record.created_at.clone(),
        }
    }
}

/// File-backed gallery store at a fixed path.
pub struct GalleryStore {
    path: PathBuf,
}

impl GalleryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the full gallery, replacing whatever was stored before.
    pub fn save(&self, gallery: &Gallery) -> Result<(), StoreError> {
        let doc = StoredGallery {
            version: STORE_SCHEMA_VERSION,
            identities: gallery.iter().map(StoredIdentity::from).collect(),
        };
        let json = serde_json::to_vec_pretty(&doc)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write-then-rename so readers never observe a partial document.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            identities = gallery.len(),
            "gallery saved"
        );
        Ok(())
    }

    /// Read the stored gallery.
    ///
    /// Missing file → empty gallery. Corrupt or unrecognized contents →
    /// logged at warn, empty gallery; the caller keeps running either way.
    pub fn load(&self) -> Gallery {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no stored gallery");
                return Gallery::new();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read stored gallery; starting empty");
                return Gallery::new();
            }
        };

        let identities = match serde_json::from_slice::<StoredGallery>(&data) {
            Ok(doc) if doc.version == STORE_SCHEMA_VERSION => doc.identities,
            Ok(doc) => {
                tracing::warn!(
                    path = %self.path.display(),
                    version = doc.version,
                    supported = STORE_SCHEMA_VERSION,
                    "stored gallery has unsupported schema version; starting empty"
                );
                return Gallery::new();
            }
            // Pre-versioning layout: a bare array of identities.
            Err(_) => match serde_json::from_slice::<Vec<StoredIdentity>>(&data) {
                Ok(identities) => {
                    tracing::info!(
                        path = %self.path.display(),
                        "migrated legacy gallery layout; will be rewritten versioned on next save"
                    );
                    identities
                }
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "stored gallery is corrupt; starting empty"
                    );
                    return Gallery::new();
                }
            },
        };

        let mut gallery = Gallery::new();
        for stored in identities {
            if stored.label.is_empty() || stored.descriptors.is_empty() {
                tracing::warn!(label = %stored.label, "dropping invalid stored identity");
                continue;
            }
            let mut record = IdentityRecord::new(
                stored.label,
                stored.descriptors.into_iter().map(Descriptor::new).collect(),
                stored.source.unwrap_or(RecordSource::Enrolled),
            );
            record.created_at = stored.created_at;
            if !gallery.insert(record) {
                tracing::warn!("dropping duplicate stored label");
            }
        }

        tracing::debug!(path = %self.path.display(), identities = gallery.len(), "gallery loaded");
        gallery
    }
}
