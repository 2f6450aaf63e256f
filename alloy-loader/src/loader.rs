//! Wires components C1-C5 into the startup sequence: discover mod
//! candidates, resolve a load order, then invoke each mod's entrypoint in
//! that order.

use std::path::Path;
use std::sync::Arc;

use alloy_bridge::{Bridge, BridgeContext, ClassTransformer};
use alloy_events::EventBus;
use alloy_metadata::ModCandidate;
use alloy_version::SemanticVersion;
use tracing::info;

use crate::config::LoaderConfig;
use crate::error::LoaderError;
use crate::initializer::{CommandRegistry, Initializer, ServerApi};
use crate::scheduler::Scheduler;

/// Resolves and invokes a mod's entrypoint. Mod code itself is compiled and
/// linked by the host embedding, not by this workspace; this trait is the
/// seam between the two.
pub trait EntrypointRegistry: Send + Sync {
    fn invoke(&self, entrypoint: &str, initializer: &Initializer) -> Result<(), String>;
}

/// Owns the process-lifetime state shared across C1-C5: the event bus, the
/// command registry, the scheduler, and the bridge's transformer/context.
pub struct Loader {
    config: LoaderConfig,
    event_bus: Arc<EventBus>,
    command_registry: Arc<CommandRegistry>,
    scheduler: Arc<Scheduler>,
    bridge_context: Arc<BridgeContext>,
    transformer: Arc<ClassTransformer>,
}

impl Loader {
    /// Reads a [`LoaderConfig`] from `path` (layered with defaults and
    /// `ALLOY__`-prefixed environment overrides) and builds a [`Loader`]
    /// from it.
    pub fn from_config(path: &str) -> Result<Self, LoaderError> {
        let config = LoaderConfig::from_config(path).map_err(|source| LoaderError::Config { source })?;
        Ok(Self::new(config))
    }

    pub fn new(config: LoaderConfig) -> Self {
        let event_bus = Arc::new(EventBus::new());
        let bridge_context = Arc::new(BridgeContext::new(
            config.game_thread_name.clone(),
            event_bus.clone(),
        ));
        Loader {
            config,
            event_bus,
            command_registry: Arc::new(CommandRegistry::new()),
            scheduler: Arc::new(Scheduler::new()),
            bridge_context,
            transformer: Arc::new(ClassTransformer::new()),
        }
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn command_registry(&self) -> &Arc<CommandRegistry> {
        &self.command_registry
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn transformer(&self) -> &Arc<ClassTransformer> {
        &self.transformer
    }

    /// A fresh handle onto the bridge methods; cheap, shares the one
    /// [`BridgeContext`] this loader owns.
    pub fn bridge(&self) -> Bridge {
        Bridge::new(self.bridge_context.clone())
    }

    /// Discovers mod candidates, resolves a load order, then invokes each
    /// mod's entrypoint in that order. If discovery or resolution fails,
    /// returns before any entrypoint has been invoked.
    pub fn load(
        &self,
        host_version: SemanticVersion,
        loader_version: SemanticVersion,
        entrypoints: &dyn EntrypointRegistry,
        server: Arc<dyn ServerApi>,
    ) -> Result<Vec<ModCandidate>, LoaderError> {
        let candidates = alloy_metadata::discover_with_extensions(
            Path::new(&self.config.mods_directory),
            &self.config.archive_extensions,
        )
        .map_err(|source| LoaderError::Discovery { source })?;
        info!(count = candidates.len(), "discovered mod candidates");

        let ordered = alloy_resolver::resolve(candidates, host_version, loader_version)
            .map_err(|source| LoaderError::Resolution { source })?;

        for candidate in &ordered {
            let initializer = Initializer::new(
                candidate.metadata.id.clone(),
                self.event_bus.clone(),
                self.command_registry.clone(),
                self.scheduler.clone(),
                server.clone(),
            );
            entrypoints
                .invoke(&candidate.metadata.entrypoint, &initializer)
                .map_err(|reason| LoaderError::Entrypoint {
                    mod_id: candidate.metadata.id.clone(),
                    entrypoint: candidate.metadata.entrypoint.clone(),
                    reason,
                })?;
            info!(mod_id = %candidate.metadata.id, "invoked entrypoint");
        }

        Ok(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_metadata::discover;
    use parking_lot::Mutex;
    use std::io::Write;
    use std::path::PathBuf;

    struct StubServer;
    impl ServerApi for StubServer {
        fn players(&self) -> Vec<String> {
            vec![]
        }
        fn worlds(&self) -> Vec<String> {
            vec![]
        }
        fn data_directory(&self) -> PathBuf {
            PathBuf::from(".")
        }
        fn broadcast(&self, _message: &str) {}
    }

    #[derive(Default)]
    struct RecordingEntrypoints {
        invoked: Mutex<Vec<String>>,
        fail: Option<&'static str>,
    }
    impl EntrypointRegistry for RecordingEntrypoints {
        fn invoke(&self, entrypoint: &str, _initializer: &Initializer) -> Result<(), String> {
            if self.fail == Some(entrypoint) {
                return Err("boom".to_string());
            }
            self.invoked.lock().push(entrypoint.to_string());
            Ok(())
        }
    }

    fn write_jar(path: &Path, manifest_json: &str) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file("alloy.mod.json", options).unwrap();
        zip.write_all(manifest_json.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    fn manifest(id: &str, deps: &str) -> String {
        format!(
            r#"{{"id":"{id}","name":"{id}","version":"1.0.0","entrypoint":"{id}.Entry","environment":"both","dependencies":{deps}}}"#
        )
    }

    fn config_for(mods_dir: &Path) -> LoaderConfig {
        LoaderConfig {
            mods_directory: mods_dir.to_string_lossy().to_string(),
            reserved_ids: crate::config::ReservedIds {
                host: alloy_resolver::HOST_ID.to_string(),
                loader: alloy_resolver::LOADER_ID.to_string(),
            },
            archive_extensions: vec!["jar".to_string()],
            game_thread_name: "server-main".to_string(),
        }
    }

    #[test]
    fn invokes_entrypoints_in_resolved_order() {
        let dir = tempdir::TempDir::new("alloy-loader").unwrap();
        write_jar(&dir.path().join("b.jar"), &manifest("mod-b", r#"{"mod-a":">=1.0.0"}"#));
        write_jar(&dir.path().join("a.jar"), &manifest("mod-a", "{}"));

        let loader = Loader::new(config_for(dir.path()));
        let entrypoints = RecordingEntrypoints::default();
        let ordered = loader
            .load(
                SemanticVersion::parse("1.21.4").unwrap(),
                SemanticVersion::parse("0.1.0").unwrap(),
                &entrypoints,
                Arc::new(StubServer),
            )
            .unwrap();

        assert_eq!(
            ordered.iter().map(|c| c.metadata.id.clone()).collect::<Vec<_>>(),
            vec!["mod-a".to_string(), "mod-b".to_string()]
        );
        assert_eq!(
            *entrypoints.invoked.lock(),
            vec!["mod-a.Entry".to_string(), "mod-b.Entry".to_string()]
        );
    }

    #[test]
    fn entrypoint_failure_is_reported_and_stops_subsequent_invocations() {
        let dir = tempdir::TempDir::new("alloy-loader").unwrap();
        write_jar(&dir.path().join("a.jar"), &manifest("mod-a", "{}"));
        write_jar(&dir.path().join("b.jar"), &manifest("mod-b", r#"{"mod-a":">=1.0.0"}"#));

        let loader = Loader::new(config_for(dir.path()));
        let entrypoints = RecordingEntrypoints {
            fail: Some("mod-a.Entry"),
            ..Default::default()
        };
        let err = loader
            .load(
                SemanticVersion::parse("1.21.4").unwrap(),
                SemanticVersion::parse("0.1.0").unwrap(),
                &entrypoints,
                Arc::new(StubServer),
            )
            .unwrap_err();

        match err {
            LoaderError::Entrypoint { mod_id, entrypoint, reason } => {
                assert_eq!(mod_id, "mod-a");
                assert_eq!(entrypoint, "mod-a.Entry");
                assert_eq!(reason, "boom");
            }
            other => panic!("expected LoaderError::Entrypoint, got {other}"),
        }
        // mod-a is resolved before mod-b and its entrypoint fails, so mod-b's
        // never runs.
        assert!(entrypoints.invoked.lock().is_empty());
    }

    #[test]
    fn resolution_failure_aborts_before_any_entrypoint_runs() {
        let dir = tempdir::TempDir::new("alloy-loader").unwrap();
        write_jar(&dir.path().join("a.jar"), &manifest("mod-a", r#"{"missing":"*"}"#));

        let loader = Loader::new(config_for(dir.path()));
        let entrypoints = RecordingEntrypoints::default();
        let result = loader.load(
            SemanticVersion::parse("1.21.4").unwrap(),
            SemanticVersion::parse("0.1.0").unwrap(),
            &entrypoints,
            Arc::new(StubServer),
        );

        assert!(result.is_err());
        assert!(entrypoints.invoked.lock().is_empty());
    }

    #[test]
    fn missing_mods_directory_yields_an_empty_load() {
        let dir = tempdir::TempDir::new("alloy-loader").unwrap();
        let missing = dir.path().join("does-not-exist");
        let loader = Loader::new(config_for(&missing));
        let entrypoints = RecordingEntrypoints::default();
        let ordered = loader
            .load(
                SemanticVersion::parse("1.21.4").unwrap(),
                SemanticVersion::parse("0.1.0").unwrap(),
                &entrypoints,
                Arc::new(StubServer),
            )
            .unwrap();
        assert!(ordered.is_empty());
    }

    #[test]
    fn discover_is_reachable_directly_for_embedders_that_want_just_discovery() {
        let dir = tempdir::TempDir::new("alloy-loader").unwrap();
        write_jar(&dir.path().join("a.jar"), &manifest("mod-a", "{}"));
        assert_eq!(discover(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn from_config_builds_a_loader_from_defaults_when_no_file_is_present() {
        let loader = Loader::from_config("/nonexistent/alloy.toml").unwrap();
        assert_eq!(loader.config.mods_directory, "mods");
    }
}
