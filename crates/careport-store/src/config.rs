use std::path::{Path, PathBuf};

/// Local storage configuration.
///
/// Callers resolve the directory (CLI flag, `CAREPORT_STATE_DIR`, config
/// file) and fall back to [`Self::default_state_dir`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding one JSON file per persisted key.
    pub state_dir: PathBuf,
}

impl StoreConfig {
    /// Environment variable that overrides the state directory.
    pub const ENV_VAR: &str = "CAREPORT_STATE_DIR";

    /// Build a config from an explicit directory (useful for tests and CLI flags).
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// The platform data directory joined with `careport`.
    pub fn default_state_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("careport")
    }

    /// Path of the file backing `key`.
    ///
    /// Keys are flattened to a single path component so a key can never
    /// escape the state directory.
    pub fn path_for_key(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.state_dir.join(format!("{file_name}.json"))
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }
}
