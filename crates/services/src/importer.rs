//! # Importer
//!
//! Turns a `.mind` archive into a new persisted map owned by a user.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use domains::{MapRepository, MindMap};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use zip::result::ZipError;

use crate::archive::{decode_document, read_archive, ArchiveDocument, ArchiveError};
use crate::error::{Failure, Result, ServiceError};
use crate::scratch::ScratchSpace;

/// Name the spooled upload gets inside its work directory.
const SPOOL_NAME: &str = "upload.mind";

pub struct MindFileImporter {
    repo: Arc<dyn MapRepository>,
    scratch: ScratchSpace,
}

impl MindFileImporter {
    pub fn new(repo: Arc<dyn MapRepository>, scratch: ScratchSpace) -> Self {
        Self { repo, scratch }
    }

    /// Imports an archive received as bytes (e.g. an upload).
    ///
    /// The bytes are spooled into a private work directory that is removed
    /// however the import ends.
    #[instrument(skip(self, archive), fields(bytes = archive.len()))]
    pub async fn import(&self, archive: &[u8], owner_id: Uuid) -> Result<MindMap> {
        self.import_spooled(archive, owner_id)
            .await
            .map_err(|cause| rejected(SPOOL_NAME, cause))
    }

    /// Imports an archive already on disk. The file itself is left in place.
    #[instrument(skip(self))]
    pub async fn import_file(&self, path: &Path, owner_id: Uuid) -> Result<MindMap> {
        let outcome = match read_document(path.to_path_buf()).await {
            Ok(document) => self.materialize(&document, owner_id).await,
            Err(cause) => Err(cause),
        };
        outcome.map_err(|cause| rejected(&path.display().to_string(), cause))
    }

    async fn import_spooled(&self, archive: &[u8], owner_id: Uuid) -> std::result::Result<MindMap, Failure> {
        let work_dir = self.scratch.work_dir("mind_").map_err(Failure::Scratch)?;
        let spooled = work_dir.path().join(SPOOL_NAME);
        tokio::fs::write(&spooled, archive)
            .await
            .map_err(Failure::Scratch)?;

        let outcome = match read_document(spooled).await {
            Ok(document) => self.materialize(&document, owner_id).await,
            Err(cause) => Err(cause),
        };
        debug!(dir = %work_dir.path().display(), "discarding import work dir");
        outcome
    }

    /// Creates the map and its whole node tree in one unit of work.
    ///
    /// Nodes are created parent-first with an explicit stack, so the depth of
    /// an untrusted document never grows the call stack.
    async fn materialize(&self, document: &ArchiveDocument, owner_id: Uuid) -> std::result::Result<MindMap, Failure> {
        let (fields, root) = decode_document(document)?;

        let mut unit = self.repo.begin().await.map_err(Failure::PersistenceFailed)?;
        let map = unit
            .create_map(fields.owned_by(owner_id))
            .await
            .map_err(Failure::PersistenceFailed)?;

        let mut pending = vec![(root, None)];
        let mut created = 0usize;
        while let Some((descriptor, parent_id)) = pending.pop() {
            let node = unit
                .create_node(descriptor.to_new_node(map.id, parent_id))
                .await
                .map_err(Failure::PersistenceFailed)?;
            created += 1;
            pending.extend(
                descriptor
                    .children
                    .iter()
                    .rev()
                    .map(|child| (child, Some(node.id))),
            );
        }

        unit.commit().await.map_err(Failure::PersistenceFailed)?;
        info!(map_id = %map.id, owner_id = %owner_id, nodes = created, "imported map");
        Ok(map)
    }
}

async fn read_document(path: PathBuf) -> std::result::Result<ArchiveDocument, Failure> {
    tokio::task::spawn_blocking(move || -> std::result::Result<ArchiveDocument, Failure> {
        let file = File::open(&path).map_err(|e| ArchiveError::InvalidArchive(ZipError::Io(e)))?;
        Ok(read_archive(BufReader::new(file))?)
    })
    .await
    .map_err(|e| Failure::Scratch(io::Error::other(e)))?
}

fn rejected(origin: &str, cause: Failure) -> ServiceError {
    warn!(origin, kind = cause.kind().as_str(), error = %cause, "import rejected");
    ServiceError::ImportFailed {
        origin: origin.to_string(),
        cause,
    }
}
