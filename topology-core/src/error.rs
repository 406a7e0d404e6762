//! Topology error abstractions.

use thiserror::Error;

use crate::model::ComponentKind;

/// Application error variants.
#[derive(Debug, Error)]
pub enum AppError {
    /// A general configuration failure.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A config source with the same name and ordinal is already registered.
    #[error("duplicate config source: name={name}, ordinal={ordinal}")]
    DuplicateConfigSource { name: String, ordinal: i32 },
    /// An invalid argument was given to a migration, builder or formatter.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// A migration was handed a document at a version it does not upgrade.
    #[error("invalid schema version: found {found}, expected {expected}")]
    InvalidSchemaVersion { found: u64, expected: u64 },
    /// The schema version field of a persisted document could not be read as an integer.
    #[error("invalid schema version field on {model}: {value}")]
    MalformedSchemaVersion { model: String, value: String },
    /// No migration accepts the document's version, yet it is not at the current version.
    #[error("no migration path for {model} from schema version {found} to {target}")]
    MigrationChainExhausted { model: String, found: u64, target: u64 },
    /// A persisted document was written by a newer lineage than this build understands.
    #[error("{model} has schema version {found} which is newer than the supported version {current}")]
    UnsupportedSchemaVersion { model: String, found: u64, current: u64 },
    /// A schema definition's migrations are not a strict `previous + 1` chain.
    #[error("invalid migration chain for {model}: {reason}")]
    InvalidMigrationChain { model: String, reason: String },

    /// A component failed its construction-time validation.
    #[error("invalid {kind} component: {field}={value}: {reason}")]
    ComponentValidation {
        kind: ComponentKind,
        field: &'static str,
        value: String,
        reason: &'static str,
    },
    /// A component with the same id already exists for its kind.
    #[error("{kind} component with id {id} already exists")]
    ComponentExists { kind: ComponentKind, id: i64 },
    /// The requested component does not exist.
    #[error("{kind} component with id {id} not found")]
    ComponentNotFound { kind: ComponentKind, id: i64 },

    /// The storage backend does not support the requested operation.
    #[error("unsupported storage operation: {0}")]
    UnsupportedStorageOperation(String),
    /// The storage backend failed to read or write data.
    #[error("storage backend error: {0}")]
    StorageBackend(String),
    /// Untyped data could not be mapped to or from a model.
    #[error("object mapping error: {0}")]
    Mapping(String),

    /// Model data was read before the owning source was loaded.
    #[error("attempted to read {0} before it was loaded")]
    ReadBeforeLoad(String),
    /// Model data was written before the owning source was loaded.
    #[error("attempted to write {0} before it was loaded")]
    WriteBeforeLoad(String),
    /// A source was loaded, but its medium holds no document.
    #[error("no document found for {0}")]
    DocumentNotFound(String),
    /// A mutation of centrally persisted state was attempted without holding the lease.
    #[error("the lease for {0} is not held by this process")]
    LeaseNotHeld(String),
    /// The lease could not be acquired before the timeout as another holder kept it.
    #[error("the lease for {name} is held by {holder}")]
    LeaseHeld { name: String, holder: String },
}

impl AppError {
    /// True for the `ConfigurationError` family of errors.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::DuplicateConfigSource { .. })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Mapping(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::StorageBackend(format!("error (de)serializing yaml: {}", err))
    }
}

/// A result type where the error is an `AppError`.
pub type Result<T> = ::std::result::Result<T, AppError>;
