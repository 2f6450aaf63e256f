//! The facade crate: wires the version algebra, discovery, resolver, event
//! bus, and runtime bridge into one startup sequence, and hands each mod's
//! entrypoint an [`Initializer`].

mod config;
mod error;
mod initializer;
mod loader;
mod scheduler;

pub use config::{ConfigError, LoaderConfig, ReservedIds};
pub use error::LoaderError;
pub use initializer::{CommandRegistry, DiagnosticLogger, Initializer, ServerApi};
pub use loader::{EntrypointRegistry, Loader};
pub use scheduler::{PeriodicTask, Scheduler, Task};
