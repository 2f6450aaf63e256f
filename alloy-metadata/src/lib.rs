//! Mod discovery and manifest parsing (component C2).
//!
//! Walks a mods directory, opens each archive, and validates the
//! `alloy.mod.json` entry at its root into a [`ModMetadata`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use alloy_version::{SemanticVersion, VersionConstraint};
use serde::{Deserialize, Serialize};

mod discovery;
mod manifest;

pub use discovery::{discover, discover_with_extensions, DiscoveryError};
pub use manifest::ManifestError;

/// Which side of the host application a mod is meant to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Client,
    Server,
    Both,
}

/// An immutable record parsed from a validated `alloy.mod.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModMetadata {
    pub id: String,
    pub name: String,
    pub version: SemanticVersion,
    pub description: String,
    pub license: String,
    pub entrypoint: String,
    pub authors: Vec<String>,
    pub dependencies: BTreeMap<String, VersionConstraint>,
    pub environment: Environment,
}

impl ModMetadata {
    /// The declared constraint on the given dependency id, if any.
    pub fn dependency_constraint(&self, id: &str) -> Option<&VersionConstraint> {
        self.dependencies.get(id)
    }
}

/// A discovered, not-yet-resolved mod: its metadata plus the archive it came
/// from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModCandidate {
    pub metadata: ModMetadata,
    pub archive_path: PathBuf,
}
