//! Frame intake for the detection loop.
//!
//! Camera mechanics stay outside the daemon: whatever captures video
//! (a webcam feeder, a test harness) drops still frames into a spool
//! directory, and [`SpoolDirSource`] hands the newest unseen one to the
//! loop. No new frame means the loop idles.

use image::DynamicImage;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Supplies at most one frame per poll.
pub trait FrameSource: Send {
    /// The next unseen frame, or `None` when nothing new has arrived.
    fn next_frame(&mut self) -> Result<Option<DynamicImage>, FrameError>;
}

const FRAME_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Reads the newest image file from a spool directory, deduplicated by
/// path and modification time.
pub struct SpoolDirSource {
    dir: PathBuf,
    last_seen: Option<(PathBuf, SystemTime)>,
}

impl SpoolDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_seen: None,
        }
    }

    /// Newest candidate frame by (mtime, path); path breaks mtime ties
    /// so the choice is deterministic.
    fn newest_entry(&self) -> Result<Option<(PathBuf, SystemTime)>, FrameError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            // The feeder may not have created the spool yet.
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut newest: Option<(PathBuf, SystemTime)> = None;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let is_frame = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if !is_frame || !entry.file_type()?.is_file() {
                continue;
            }

            let mtime = entry.metadata()?.modified()?;
            let newer = match &newest {
                None => true,
                Some((best_path, best_mtime)) => {
                    (mtime, &path) > (*best_mtime, best_path)
                }
            };
            if newer {
                newest = Some((path, mtime));
            }
        }
        Ok(newest)
    }
}

impl FrameSource for SpoolDirSource {
    fn next_frame(&mut self) -> Result<Option<DynamicImage>, FrameError> {
        let Some((path, mtime)) = self.newest_entry()? else {
            return Ok(None);
        };

        if self.last_seen.as_ref() == Some(&(path.clone(), mtime)) {
            return Ok(None);
        }

        let frame = match image::open(&path) {
            Ok(frame) => Some(frame),
            Err(e) => {
                // A feeder may still be mid-write; skip this one.
                tracing::warn!(path = %path.display(), error = %e, "frame unreadable; skipping");
                None
            }
        };
        self.last_seen = Some((path, mtime));
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::time::Duration;

    fn write_frame(dir: &std::path::Path, name: &str, shade: u8) {
        let image = RgbImage::from_pixel(4, 4, Rgb([shade, shade, shade]));
        image.save(dir.join(name)).unwrap();
    }

    #[test]
    fn missing_dir_yields_no_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = SpoolDirSource::new(dir.path().join("not-yet"));
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn empty_dir_yields_no_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = SpoolDirSource::new(dir.path());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn picks_newest_frame() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "a.jpg", 10);
        std::thread::sleep(Duration::from_millis(20));
        write_frame(dir.path(), "b.jpg", 250);

        let mut source = SpoolDirSource::new(dir.path());
        let frame = source.next_frame().unwrap().unwrap();
        assert!(frame.to_rgb8().get_pixel(0, 0)[0] > 128);
    }

    #[test]
    fn same_frame_is_not_returned_twice() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "a.jpg", 10);

        let mut source = SpoolDirSource::new(dir.path());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());

        std::thread::sleep(Duration::from_millis(20));
        write_frame(dir.path(), "b.jpg", 20);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn non_image_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frame.txt"), b"not a frame").unwrap();

        let mut source = SpoolDirSource::new(dir.path());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn unreadable_frame_is_skipped_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.jpg"), b"truncated junk").unwrap();

        let mut source = SpoolDirSource::new(dir.path());
        // Unreadable frame consumed without error, then nothing new.
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().unwrap().is_none());
    }
}
