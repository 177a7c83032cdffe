//! Reading and writing `engine.yaml`

use std::path::Path;

use anyhow::{bail, Context, Result};

use super::engine::EngineConfig;

/// Load the engine configuration from `path`.
///
/// A missing file yields the defaults. An unreadable or unparsable file is
/// logged and also yields the defaults, so a broken config never keeps the
/// engine from starting. Whatever is loaded is passed through
/// [`EngineConfig::sanitize`].
pub fn load_config(path: &Path) -> EngineConfig {
    let mut config = match read_config(path) {
        Ok(Some(config)) => {
            log::info!("[CONFIG] Loaded {:?}", path);
            config
        }
        Ok(None) => {
            log::info!("[CONFIG] No config at {:?}, using defaults", path);
            EngineConfig::default()
        }
        Err(e) => {
            log::warn!("[CONFIG] {:#}, using defaults", e);
            EngineConfig::default()
        }
    };

    let fixed = config.sanitize();
    if fixed > 0 {
        log::warn!("[CONFIG] Repaired {} value(s) from {:?}", fixed, path);
    }
    config
}

fn read_config(path: &Path) -> Result<Option<EngineConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let config = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {:?}", path))?;
    Ok(Some(config))
}

/// Save the engine configuration, creating parent directories.
///
/// Refuses to write a config the engine would have to repair on load.
pub fn save_config(config: &EngineConfig, path: &Path) -> Result<()> {
    if config.clone().sanitize() > 0 {
        bail!("Refusing to save an invalid engine config to {:?}", path);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize engine config")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write {:?}", path))?;

    log::info!("[CONFIG] Saved {:?}", path);
    Ok(())
}
