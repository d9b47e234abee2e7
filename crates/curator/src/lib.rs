pub mod broadcast;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod fixity;
pub mod job;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod plugin;
pub mod premis;
pub mod report;
pub mod sanitize;
pub mod services;
pub mod source;

pub use broadcast::{JobProgressBroadcaster, JobProgressEvent, ProgressKind};
pub use config::{load_config, load_config_from_str, EngineConfig};
pub use engine::{Engine, JobRequest};
pub use error::{
    ConfigError, CuratorError, PluginError, PremisError, Result, ServiceError, SourceError,
    StorageError, WorkerError,
};
pub use job::{Job, JobState, JobStats, JobStore};
pub use model::{ArchivalObject, ObjectKind};
pub use orchestrator::{CancellationToken, JobOutcome, Orchestrator, OrchestratorSettings};
pub use plugin::{Plugin, PluginDescriptor, PluginRegistry, PluginWorker};
pub use report::{PluginState, Report, ReportItem};
pub use services::{FilesystemStorage, InMemoryRepository, Services};
pub use source::ObjectSource;
