use std::path::PathBuf;
use thiserror::Error;

use crate::model::ObjectKind;

#[derive(Error, Debug)]
pub enum CuratorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Object source error: {0}")]
    Source(#[from] SourceError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("PREMIS error: {0}")]
    Premis(#[from] PremisError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("Invalid value for parameter '{id}': {reason}")]
    InvalidParameter { id: String, reason: String },

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Mandatory parameter '{0}' has no value and no default")]
    MissingParameter(String),

    #[error("Plugin '{plugin}' cannot act on {kind} objects")]
    UnsupportedObjectKind { plugin: String, kind: ObjectKind },

    #[error("Plugin initialization failed: {0}")]
    Init(String),

    #[error("{hook} failed: {reason}")]
    Hook { hook: String, reason: String },

    #[error("Block execution failed: {0}")]
    Execution(String),

    #[error("Illegal lifecycle transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Plugin worker panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Premis(#[from] PremisError),
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to resolve objects from index: {0}")]
    Index(#[from] ServiceError),

    #[error("Object source yields {source_kind} objects but plugin '{plugin}' expects {expected}")]
    KindMismatch {
        plugin: String,
        source_kind: ObjectKind,
        expected: String,
    },

    #[error("Transfer folder scan failed for '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Transfer folder does not exist: {0}")]
    MissingTransferFolder(PathBuf),

    #[error("Object source ended after {yielded} of {expected} objects")]
    Truncated { yielded: u64, expected: u64 },
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: String, id: String },

    #[error("{kind} '{id}' already exists")]
    AlreadyExists { kind: String, id: String },

    #[error("Request not valid: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Binary not found at '{0}'")]
    NotFound(String),

    #[error("Invalid storage path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Binary already exists at '{0}'")]
    AlreadyExists(String),

}

#[derive(Error, Debug)]
pub enum PremisError {
    #[error("Failed to write PREMIS document: {0}")]
    Serialize(String),

    #[error("Failed to parse PREMIS document: {0}")]
    Parse(String),

    #[error("Unknown {field} value '{value}'")]
    InvalidValue { field: &'static str, value: String },

    #[error("Unsupported digest algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("Failed to compute digest: {0}")]
    Digest(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, CuratorError>;
