use std::path::PathBuf;

use tether_core::StorageKind;
use thiserror::Error;
use uuid::Uuid;

use crate::document::ElementId;

/// Errors raised by a host document.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("element {0} does not exist")]
    UnknownElement(ElementId),

    #[error("family '{0}' is not loaded")]
    UnknownFamily(String),

    #[error("family '{family}' has no type '{type_name}'")]
    UnknownType { family: String, type_name: String },

    #[error("level {0} does not exist")]
    UnknownLevel(ElementId),

    #[error("view {0} does not exist")]
    UnknownView(ElementId),

    #[error("element {element} has no parameter '{name}'")]
    ParameterMissing { element: ElementId, name: String },

    #[error("parameter '{name}' stores {expected}, got {found}")]
    StorageMismatch {
        name: String,
        expected: StorageKind,
        found: StorageKind,
    },

    #[error("placement point {index} out of range (element {element} has {count})")]
    PlacementIndex {
        element: ElementId,
        index: usize,
        count: usize,
    },

    #[error("schema {0} is not registered")]
    SchemaNotRegistered(Uuid),

    #[error("schema {schema} has no field '{field}'")]
    SchemaField { schema: Uuid, field: String },

    #[error("no transaction is open")]
    NoTransaction,

    #[error("transaction '{0}' is already open")]
    TransactionActive(String),

    #[error("modification outside a transaction is not allowed")]
    ReadOnly,

    #[error("native creation failed: {0}")]
    Creation(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse model at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> HostError {
    HostError::Io {
        path: path.into(),
        source,
    }
}
