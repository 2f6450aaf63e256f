//! The mod-facing API surface: a mod's entrypoint receives one `Initializer`
//! giving it the event bus, the command registry, the scheduler, the server
//! façade, and a diagnostic logger.

use std::path::PathBuf;
use std::sync::Arc;

use alloy_bridge::CommandDescriptor;
use alloy_events::EventBus;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::scheduler::{PeriodicTask, Scheduler, Task};

/// The host operations a mod can read through the server façade.
/// Implemented by the host embedding; consumed here.
pub trait ServerApi: Send + Sync {
    fn players(&self) -> Vec<String>;
    fn worlds(&self) -> Vec<String>;
    fn data_directory(&self) -> PathBuf;
    fn broadcast(&self, message: &str);
}

/// Accumulates command registrations from every mod's entrypoint; the
/// loader later drains it to install each one through
/// [`alloy_bridge::Bridge::install_commands`].
#[derive(Default)]
pub struct CommandRegistry {
    commands: Mutex<Vec<CommandDescriptor>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        execute: Arc<dyn Fn(&[String]) + Send + Sync>,
    ) {
        self.commands.lock().push(CommandDescriptor {
            name: name.into(),
            executor: execute,
        });
    }

    pub fn drain(&self) -> Vec<CommandDescriptor> {
        std::mem::take(&mut self.commands.lock())
    }
}

/// A thin `tracing`-backed logger handed to each mod, tagging every line
/// with the declaring mod's id.
pub struct DiagnosticLogger {
    mod_id: String,
}

impl DiagnosticLogger {
    pub fn new(mod_id: impl Into<String>) -> Self {
        DiagnosticLogger { mod_id: mod_id.into() }
    }

    pub fn info(&self, message: &str) {
        info!(mod_id = %self.mod_id, "{message}");
    }

    pub fn warn(&self, message: &str) {
        warn!(mod_id = %self.mod_id, "{message}");
    }

    pub fn error(&self, message: &str) {
        error!(mod_id = %self.mod_id, "{message}");
    }
}

/// Passed once to a mod's entrypoint.
pub struct Initializer {
    mod_id: String,
    event_bus: Arc<EventBus>,
    command_registry: Arc<CommandRegistry>,
    scheduler: Arc<Scheduler>,
    server: Arc<dyn ServerApi>,
    logger: DiagnosticLogger,
}

impl Initializer {
    pub fn new(
        mod_id: impl Into<String>,
        event_bus: Arc<EventBus>,
        command_registry: Arc<CommandRegistry>,
        scheduler: Arc<Scheduler>,
        server: Arc<dyn ServerApi>,
    ) -> Self {
        let mod_id = mod_id.into();
        let logger = DiagnosticLogger::new(mod_id.clone());
        Initializer {
            mod_id,
            event_bus,
            command_registry,
            scheduler,
            server,
            logger,
        }
    }

    pub fn mod_id(&self) -> &str {
        &self.mod_id
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn register_command(&self, name: impl Into<String>, execute: Arc<dyn Fn(&[String]) + Send + Sync>) {
        self.command_registry.register(name, execute);
    }

    pub fn run_later(&self, task: Task, delay_ticks: u64) {
        self.scheduler.run_later(task, delay_ticks);
    }

    pub fn run_periodic(&self, task: PeriodicTask, delay_ticks: u64, period_ticks: u64) {
        self.scheduler.run_periodic(task, delay_ticks, period_ticks);
    }

    pub fn run_async(&self, task: Task) {
        self.scheduler.run_async(task);
    }

    pub fn server(&self) -> &Arc<dyn ServerApi> {
        &self.server
    }

    pub fn logger(&self) -> &DiagnosticLogger {
        &self.logger
    }
}
