//! Engine configuration
//!
//! [`EngineConfig`] is read from YAML with every field defaulted, so a
//! config file only needs the values it changes:
//!
//! ```ignore
//! use timbre_core::config::{load_config, default_config_path};
//!
//! let config = load_config(&default_config_path());
//! ```

mod engine;
mod fx;
mod io;
mod paths;

pub use engine::{EngineConfig, LatencyConfig, RealtimeConfig};
pub use fx::FxConfig;
pub use io::{load_config, save_config};
pub use paths::{config_dir, default_config_path, CONFIG_FILE_NAME};
