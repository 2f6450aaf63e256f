use std::collections::BTreeMap;

use alloy_version::{SemanticVersion, VersionConstraint};
use custom_error::custom_error;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use serde_with::skip_serializing_none;

use crate::{Environment, ModMetadata};

custom_error! {
    pub ManifestError
    Json { source: serde_json::Error } = "manifest is not valid JSON: {source}",
    Validation { reason: String } = "{reason}",
    Version { source: alloy_version::VersionError } = "{source}",
    DependencyConstraint { dependency: String, source: alloy_version::VersionError } =
        "dependency '{dependency}' has an invalid version constraint: {source}",
}

/// Wire format of `alloy.mod.json`. Unknown top-level fields
/// are tolerated and ignored — no `deny_unknown_fields` here, unlike the
/// stricter metadata models this crate's style is otherwise drawn from.
#[skip_serializing_none]
#[derive(Deserialize, Serialize, Debug, Clone, Validate)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    #[validate(min_length = 2)]
    #[validate(max_length = 64)]
    #[validate(custom(validate_id_charset))]
    id: String,
    name: String,
    version: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    license: String,
    entrypoint: String,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    environment: Environment,
}

fn validate_id_charset(id: String) -> Result<(), serde_valid::validation::Error> {
    let re = regex::Regex::new("^[a-z][a-z0-9_-]*$").expect("mod id pattern is a valid regex");
    if re.is_match(&id) {
        Ok(())
    } else {
        Err(format!(
            "'{id}' does not match the required pattern `[a-z][a-z0-9_-]*`"
        ))
    }
}

/// Parse and validate an `alloy.mod.json` document's bytes into a
/// [`ModMetadata`].
pub fn parse(bytes: &str) -> Result<ModMetadata, ManifestError> {
    let raw: RawManifest = serde_json::from_str(bytes)?;

    raw.validate().map_err(|errors| ManifestError::Validation {
        reason: errors.to_string(),
    })?;

    let version = SemanticVersion::parse(&raw.version)?;

    let mut dependencies = BTreeMap::new();
    for (dep_id, constraint) in raw.dependencies {
        let parsed = VersionConstraint::parse(&constraint).map_err(|source| {
            ManifestError::DependencyConstraint {
                dependency: dep_id.clone(),
                source,
            }
        })?;
        dependencies.insert(dep_id, parsed);
    }

    Ok(ModMetadata {
        id: raw.id,
        name: raw.name,
        version,
        description: raw.description,
        license: raw.license,
        entrypoint: raw.entrypoint,
        authors: raw.authors,
        dependencies,
        environment: raw.environment,
    })
}
