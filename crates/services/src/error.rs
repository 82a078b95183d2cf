//! # ServiceError
//!
//! Centralized error handling for the map services.
//! A [`Failure`] says what went wrong; a [`ServiceError`] says which
//! operation it happened in and on what.

use domains::TreeError;
use thiserror::Error;
use uuid::Uuid;

use crate::archive::ArchiveError;

/// The underlying failure kind, independent of the operation that hit it.
#[derive(Error, Debug)]
pub enum Failure {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The tree violates its invariants (missing root, dangling parent, cycle)
    #[error("malformed tree: {0}")]
    MalformedTree(#[from] TreeError),

    /// A persisted map without a null-parent node; indicates corruption
    #[error("map {0} has no root node")]
    NoRootNode(Uuid),

    #[error("map not found with ID {0}")]
    MapNotFound(Uuid),

    #[error("node not found with ID {0}")]
    NodeNotFound(Uuid),

    /// Caller input rejected before touching storage (e.g. blank title)
    #[error("validation error: {0}")]
    Invalid(String),

    /// The unit of work could not be completed or committed
    #[error("persistence failed: {0}")]
    PersistenceFailed(#[source] anyhow::Error),

    /// Temporary files for import/export could not be created or written
    #[error("scratch file error: {0}")]
    Scratch(#[source] std::io::Error),
}

/// Coarse classification of a [`Failure`], for callers mapping errors to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidArchive,
    MissingDescriptor,
    MalformedDocument,
    MalformedTree,
    NoRootNode,
    NotFound,
    Invalid,
    PersistenceFailed,
    Internal,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArchive => "invalid_archive",
            Self::MissingDescriptor => "missing_descriptor",
            Self::MalformedDocument => "malformed_document",
            Self::MalformedTree => "malformed_tree",
            Self::NoRootNode => "no_root_node",
            Self::NotFound => "not_found",
            Self::Invalid => "invalid",
            Self::PersistenceFailed => "persistence_failed",
            Self::Internal => "internal",
        }
    }
}

impl Failure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Archive(ArchiveError::InvalidArchive(_)) => FailureKind::InvalidArchive,
            Self::Archive(ArchiveError::MissingDescriptor(_)) => FailureKind::MissingDescriptor,
            Self::Archive(ArchiveError::MalformedDocument(_) | ArchiveError::TooDeep { .. }) => {
                FailureKind::MalformedDocument
            }
            Self::Archive(ArchiveError::Encode(_) | ArchiveError::Pack(_)) => FailureKind::Internal,
            Self::MalformedTree(_) => FailureKind::MalformedTree,
            Self::NoRootNode(_) => FailureKind::NoRootNode,
            Self::MapNotFound(_) | Self::NodeNotFound(_) => FailureKind::NotFound,
            Self::Invalid(_) => FailureKind::Invalid,
            Self::PersistenceFailed(_) => FailureKind::PersistenceFailed,
            Self::Scratch(_) => FailureKind::Internal,
        }
    }
}

/// The primary error type returned by every service entry point.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("import of {origin} failed: {cause}")]
    ImportFailed {
        origin: String,
        #[source]
        cause: Failure,
    },

    #[error("export of map {map_id} failed: {cause}")]
    ExportFailed {
        map_id: Uuid,
        #[source]
        cause: Failure,
    },

    #[error("duplication of map {map_id} failed: {cause}")]
    DuplicationFailed {
        map_id: Uuid,
        #[source]
        cause: Failure,
    },

    #[error("map edit failed: {cause}")]
    EditFailed {
        map_id: Option<Uuid>,
        #[source]
        cause: Failure,
    },
}

impl ServiceError {
    pub fn failure(&self) -> &Failure {
        match self {
            Self::ImportFailed { cause, .. }
            | Self::ExportFailed { cause, .. }
            | Self::DuplicationFailed { cause, .. }
            | Self::EditFailed { cause, .. } => cause,
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.failure().kind()
    }
}

/// A specialized Result type for service entry points.
pub type Result<T> = std::result::Result<T, ServiceError>;
