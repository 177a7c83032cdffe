//! Standard configuration locations

use std::path::PathBuf;

/// Engine config file name
pub const CONFIG_FILE_NAME: &str = "engine.yaml";

/// `<config dir>/timbre`, falling back to `./timbre` when the platform has
/// no config directory
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("timbre")
}

/// `<config dir>/timbre/engine.yaml`
pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_path_layout() {
        let path = default_config_path();
        assert!(path.ends_with("timbre/engine.yaml"));
    }
}
