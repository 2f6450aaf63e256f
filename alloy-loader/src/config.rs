//! Loader configuration: layered as defaults, then an optional file source,
//! then environment overrides.

use custom_error::custom_error;
use serde::Deserialize;

custom_error! {pub ConfigError
    Load { source: config::ConfigError } = "error while reading loader config: {source}",
}

/// The reserved dependency ids expressing compatibility with the host
/// application and the loader itself. Kept as config fields, centralized
/// here, rather than scattered literals, so that making them genuinely
/// configurable later is a one-line change rather than a search-and-replace;
/// see `DESIGN.md`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReservedIds {
    pub host: String,
    pub loader: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoaderConfig {
    pub mods_directory: String,
    pub reserved_ids: ReservedIds,
    pub archive_extensions: Vec<String>,
    pub game_thread_name: String,
}

impl LoaderConfig {
    pub fn from_config(path: &str) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .set_default("mods_directory", "mods")?
            .set_default("reserved_ids.host", alloy_resolver::HOST_ID)?
            .set_default("reserved_ids.loader", alloy_resolver::LOADER_ID)?
            .set_default("archive_extensions", vec!["jar", "zip"])?
            .set_default("game_thread_name", "server-main")?
            .add_source(config::File::from(std::path::Path::new(path)).required(false))
            .add_source(config::Environment::with_prefix("ALLOY").separator("__"))
            .build()
            .map_err(|source| ConfigError::Load { source })?;

        config
            .try_deserialize()
            .map_err(|source| ConfigError::Load { source })
    }
}
