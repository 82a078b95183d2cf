//! mindmap/crates/services/src/lib.rs
//!
//! Use cases over the domain ports: the `.mind` archive codec, import,
//! export, duplication and interactive editing of maps.

pub mod archive;
pub mod duplicator;
pub mod editor;
pub mod error;
pub mod exporter;
pub mod importer;
pub mod scratch;

pub use archive::{ArchiveDocument, ArchiveError};
pub use duplicator::MapDuplicator;
pub use editor::{checked_title, MapEditor, MapUpdate, NodeUpdate, SubtreeRemoval, TitleEdit};
pub use error::{Failure, FailureKind, Result, ServiceError};
pub use exporter::{ExportedArchive, MindFileExporter};
pub use importer::MindFileImporter;
pub use scratch::ScratchSpace;
