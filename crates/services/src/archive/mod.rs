//! # Archive Codec
//!
//! Converts between a persisted map tree and the `.mind` interchange format:
//! [`document`] maps models to the `map.json` structure, [`container`] packs
//! that structure into (and out of) the zip container.

pub mod container;
pub mod document;

use thiserror::Error;
use zip::result::ZipError;

pub use container::{pack_archive, read_archive, unpack_archive, write_archive, DESCRIPTOR_NAME};
pub use document::{decode_document, encode_document, ArchiveDocument, MapFields, NodeDescriptor, UNTITLED_MAP};

/// Failures while reading or writing a `.mind` archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The bytes are not a readable zip container (corrupt, foreign, empty)
    #[error("archive could not be opened: {0}")]
    InvalidArchive(#[source] ZipError),

    #[error("archive has no `{0}` entry")]
    MissingDescriptor(&'static str),

    #[error("archive descriptor is not a valid map document: {0}")]
    MalformedDocument(#[source] serde_json::Error),

    #[error("archive descriptor nests deeper than {limit} levels")]
    TooDeep { limit: usize },

    #[error("map document could not be serialized: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("archive could not be written: {0}")]
    Pack(#[source] ZipError),
}
