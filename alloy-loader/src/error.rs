//! Aggregated startup error surface. Mirrors how `mcmeta::MetaMCError`
//! folds `download::mojang::MojangMetadataError` and friends into one enum
//! at the crate that wires everything together.

use custom_error::custom_error;

custom_error! {pub LoaderError
    Config { source: crate::config::ConfigError } = "{source}",
    Discovery { source: alloy_metadata::DiscoveryError } = "{source}",
    Resolution { source: alloy_resolver::ResolutionError } = "{source}",
    Entrypoint { mod_id: String, entrypoint: String, reason: String } =
        "entrypoint '{entrypoint}' for mod '{mod_id}' failed: {reason}",
}
