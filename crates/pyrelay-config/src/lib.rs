//! Configuration for the pyrelay host bridge
//!
//! - [`settings`]: the persisted worker settings and their store
//! - [`executable`]: resolution of interpreter names and paths

pub mod executable;
pub mod settings;

pub use executable::{ExecutableResolver, ResolveError, DEFAULT_INTERPRETER};
pub use settings::{SettingsError, SettingsStore, WorkerConfig};
