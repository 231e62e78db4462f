use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing the ONNX model bundle.
    pub model_dir: PathBuf,
    /// Path to the persisted gallery JSON document.
    pub gallery_path: PathBuf,
    /// Path to the bundled-reference TOML config.
    pub references_path: PathBuf,
    /// Directory the detection loop polls for incoming frames.
    pub frame_dir: PathBuf,
    /// Maximum Euclidean distance for a positive identity match.
    pub match_threshold: f32,
    /// Detection loop tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Whether observations include landmark overlays at startup.
    pub overlay_default: bool,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        Self {
            model_dir: std::env::var("ROLLCALL_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("models")),
            gallery_path: std::env::var("ROLLCALL_GALLERY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("gallery.json")),
            references_path: std::env::var("ROLLCALL_REFERENCES")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("references.toml")),
            frame_dir: std::env::var("ROLLCALL_FRAME_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/rollcall/frames")),
            match_threshold: env_f32(
                "ROLLCALL_MATCH_THRESHOLD",
                rollcall_core::DEFAULT_MATCH_THRESHOLD,
            ),
            tick_interval_ms: env_u64("ROLLCALL_TICK_INTERVAL_MS", 150),
            overlay_default: std::env::var("ROLLCALL_OVERLAY")
                .map(|v| v != "0")
                .unwrap_or(false),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
