use std::io::Read;
use std::path::{Path, PathBuf};

use custom_error::custom_error;
use lazy_static::lazy_static;
use tracing::{debug, warn};

use crate::{manifest, ModCandidate};

const MANIFEST_ENTRY_NAME: &str = "alloy.mod.json";

lazy_static! {
    /// Archive extensions discovery treats as candidate mod archives.
    /// Case-insensitive, matched against the file name's extension only.
    static ref ARCHIVE_EXTENSIONS: Vec<&'static str> = vec!["jar", "zip"];
}

custom_error! {
    pub DiscoveryError
    Io { source: std::io::Error } = "failed to scan mods directory: {source}",
    UnreadableArchive { archive: String, cause: std::io::Error } = "failed to read mod archive '{archive}': {cause}",
    ArchiveFormat { archive: String, cause: zip::result::ZipError } = "failed to open mod archive '{archive}' as an archive: {cause}",
    InvalidManifest { archive: String, reason: String } = "mod archive '{archive}' contains an invalid manifest: {reason}",
}

fn has_archive_extension(path: &Path, extensions: &[impl AsRef<str>]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            extensions
                .iter()
                .any(|candidate| candidate.as_ref().eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Locate the `alloy.mod.json` entry at the archive root by exact byte-string
/// path equality — no normalization.
fn find_manifest_entry(
    jar: &mut zip::ZipArchive<std::fs::File>,
) -> Result<Option<usize>, zip::result::ZipError> {
    for index in 0..jar.len() {
        let entry = jar.by_index(index)?;
        if entry.name() == MANIFEST_ENTRY_NAME {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

/// Scan `mods_dir` for Alloy mod archives.
///
/// A missing directory yields an empty list, not an error. Subdirectories
/// are not recursed. Archives without a root-level `alloy.mod.json` are
/// silently skipped — they simply are not Alloy mods. An archive that *has*
/// the manifest entry but fails to parse or validate is a fatal
/// [`DiscoveryError::InvalidManifest`], and an archive that cannot be read
/// at all is a fatal [`DiscoveryError`] rather than a silent skip.
pub fn discover(mods_dir: &Path) -> Result<Vec<ModCandidate>, DiscoveryError> {
    discover_with_extensions(mods_dir, ARCHIVE_EXTENSIONS.as_slice())
}

/// As [`discover`], but recognizing `extensions` instead of the default
/// `jar`/`zip` set. Lets an embedder make the recognized archive
/// extensions configurable (see `DESIGN.md`).
pub fn discover_with_extensions(
    mods_dir: &Path,
    extensions: &[impl AsRef<str>],
) -> Result<Vec<ModCandidate>, DiscoveryError> {
    if !mods_dir.exists() {
        debug!("mods directory {} does not exist, no mods to load", mods_dir.display());
        return Ok(Vec::new());
    }

    let mut candidates = Vec::new();
    let mut skipped = 0u32;

    for entry in std::fs::read_dir(mods_dir)? {
        let entry = entry?;
        let path = entry.path();

        let file_type = entry.file_type()?;
        if !file_type.is_file() || !has_archive_extension(&path, extensions) {
            continue;
        }

        let archive_name = path.display().to_string();

        let file = std::fs::File::open(&path).map_err(|cause| DiscoveryError::UnreadableArchive {
            archive: archive_name.clone(),
            cause,
        })?;
        let mut jar = zip::ZipArchive::new(file).map_err(|cause| DiscoveryError::ArchiveFormat {
            archive: archive_name.clone(),
            cause,
        })?;

        let manifest_index = find_manifest_entry(&mut jar).map_err(|cause| DiscoveryError::ArchiveFormat {
            archive: archive_name.clone(),
            cause,
        })?;

        let Some(manifest_index) = manifest_index else {
            skipped += 1;
            continue;
        };

        let mut manifest_text = String::new();
        {
            let mut manifest_entry = jar
                .by_index(manifest_index)
                .map_err(|cause| DiscoveryError::ArchiveFormat {
                    archive: archive_name.clone(),
                    cause,
                })?;
            manifest_entry
                .read_to_string(&mut manifest_text)
                .map_err(|cause| DiscoveryError::UnreadableArchive {
                    archive: archive_name.clone(),
                    cause,
                })?;
        }

        let metadata = manifest::parse(&manifest_text).map_err(|source| DiscoveryError::InvalidManifest {
            archive: archive_name.clone(),
            reason: source.to_string(),
        })?;

        debug!("discovered mod '{}' in {}", metadata.id, archive_name);
        candidates.push(ModCandidate {
            metadata,
            archive_path: PathBuf::from(&path),
        });
    }

    if skipped > 0 {
        debug!(
            "skipped {} archive(s) in {} with no {} entry",
            skipped,
            mods_dir.display(),
            MANIFEST_ENTRY_NAME
        );
    }
    if candidates.is_empty() {
        warn!("no Alloy mods discovered in {}", mods_dir.display());
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_jar(path: &Path, manifest_json: Option<&str>) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        if let Some(json) = manifest_json {
            zip.start_file(MANIFEST_ENTRY_NAME, options).unwrap();
            zip.write_all(json.as_bytes()).unwrap();
        } else {
            zip.start_file("README.txt", options).unwrap();
            zip.write_all(b"not a mod").unwrap();
        }
        zip.finish().unwrap();
    }

    fn sample_manifest(id: &str) -> String {
        format!(
            r#"{{"id":"{id}","name":"n","version":"1.0.0","entrypoint":"e","environment":"both"}}"#
        )
    }

    #[test]
    fn missing_directory_yields_empty_list() {
        let dir = tempdir::TempDir::new("alloy-discovery").unwrap();
        let missing = dir.path().join("does-not-exist");
        assert_eq!(discover(&missing).unwrap(), Vec::new());
    }

    #[test]
    fn skips_archives_without_manifest_and_non_archives() {
        let dir = tempdir::TempDir::new("alloy-discovery").unwrap();
        write_jar(&dir.path().join("a.jar"), Some(&sample_manifest("a")));
        write_jar(&dir.path().join("b.jar"), None);
        std::fs::write(dir.path().join("c.txt"), b"hello").unwrap();

        let candidates = discover(dir.path()).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].metadata.id, "a");
    }

    #[test]
    fn malformed_manifest_is_fatal() {
        let dir = tempdir::TempDir::new("alloy-discovery").unwrap();
        write_jar(&dir.path().join("broken.jar"), Some("{ not json"));
        assert!(discover(dir.path()).is_err());
    }

    #[test]
    fn custom_extensions_are_respected() {
        let dir = tempdir::TempDir::new("alloy-discovery").unwrap();
        write_jar(&dir.path().join("a.mod"), Some(&sample_manifest("a")));
        write_jar(&dir.path().join("b.jar"), Some(&sample_manifest("b")));

        let candidates = discover_with_extensions(dir.path(), &["mod".to_string()]).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].metadata.id, "a");
    }

    #[test]
    fn does_not_recurse_into_subdirectories() {
        let dir = tempdir::TempDir::new("alloy-discovery").unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        write_jar(&nested.join("a.jar"), Some(&sample_manifest("a")));

        assert_eq!(discover(dir.path()).unwrap(), Vec::new());
    }
}
