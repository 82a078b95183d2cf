//! # Exporter
//!
//! Produces a `.mind` archive from a persisted map.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use domains::{MapRepository, MapTree, MindMap};
use tempfile::NamedTempFile;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::archive::{encode_document, pack_archive, ArchiveDocument};
use crate::error::{Failure, Result, ServiceError};
use crate::scratch::ScratchSpace;

/// A finished export on disk.
///
/// The file is deleted when this value is dropped, so the caller keeps it
/// alive exactly as long as it needs to deliver the bytes.
#[derive(Debug)]
pub struct ExportedArchive {
    file: NamedTempFile,
    file_name: String,
    node_count: usize,
}

impl ExportedArchive {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Suggested download name, `<map title>.mind`.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub async fn read_bytes(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.path()).await
    }
}

pub struct MindFileExporter {
    repo: Arc<dyn MapRepository>,
    scratch: ScratchSpace,
}

impl MindFileExporter {
    pub fn new(repo: Arc<dyn MapRepository>, scratch: ScratchSpace) -> Self {
        Self { repo, scratch }
    }

    /// Exports the map to a per-export file under the export directory.
    #[instrument(skip(self))]
    pub async fn export(&self, map_id: Uuid) -> Result<ExportedArchive> {
        let outcome = match self.build_document(map_id).await {
            Ok((map, tree_len, document)) => self.write_file(&map, tree_len, document).await,
            Err(cause) => Err(cause),
        };
        outcome.map_err(|cause| failed(map_id, cause))
    }

    /// The archive document for the map, without packing it.
    #[instrument(skip(self))]
    pub async fn export_document(&self, map_id: Uuid) -> Result<ArchiveDocument> {
        self.build_document(map_id)
            .await
            .map(|(_, _, document)| document)
            .map_err(|cause| failed(map_id, cause))
    }

    async fn build_document(&self, map_id: Uuid) -> std::result::Result<(MindMap, usize, ArchiveDocument), Failure> {
        let map = self
            .repo
            .find_map(map_id)
            .await
            .map_err(Failure::PersistenceFailed)?
            .ok_or(Failure::MapNotFound(map_id))?;

        if self
            .repo
            .load_root(map_id)
            .await
            .map_err(Failure::PersistenceFailed)?
            .is_none()
        {
            return Err(Failure::NoRootNode(map_id));
        }

        let nodes = self
            .repo
            .load_nodes(map_id)
            .await
            .map_err(Failure::PersistenceFailed)?;
        let tree = MapTree::from_nodes(nodes)?;
        let document = encode_document(&map, &tree);
        Ok((map, tree.len(), document))
    }

    async fn write_file(
        &self,
        map: &MindMap,
        node_count: usize,
        document: ArchiveDocument,
    ) -> std::result::Result<ExportedArchive, Failure> {
        let file = self.scratch.export_file(map.id).map_err(Failure::Scratch)?;
        let file = tokio::task::spawn_blocking(move || -> std::result::Result<NamedTempFile, Failure> {
            let bytes = pack_archive(&document)?;
            let mut file = file;
            file.write_all(&bytes).map_err(Failure::Scratch)?;
            file.flush().map_err(Failure::Scratch)?;
            Ok(file)
        })
        .await
        .map_err(|e| Failure::Scratch(io::Error::other(e)))??;

        info!(map_id = %map.id, nodes = node_count, path = %file.path().display(), "exported map");
        Ok(ExportedArchive {
            file,
            file_name: download_name(&map.title),
            node_count,
        })
    }
}

fn failed(map_id: Uuid, cause: Failure) -> ServiceError {
    warn!(%map_id, kind = cause.kind().as_str(), error = %cause, "export failed");
    ServiceError::ExportFailed { map_id, cause }
}

fn download_name(title: &str) -> String {
    let stem: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '"' | ':' | '*' | '?' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if stem.is_empty() {
        "map.mind".to_string()
    } else {
        format!("{stem}.mind")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::unpack_archive;
    use crate::error::FailureKind;
    use domains::{MapUnitOfWork, MockMapRepository, NewMap, NewNode, NodeContent};
    use serde_json::json;
    use storage_adapters::MemoryMapRepo;

    async fn seeded(repo: &MemoryMapRepo) -> MindMap {
        let mut unit = repo.begin().await.unwrap();
        let mut new_map = NewMap::blank(Uuid::now_v7(), "Garden / Plan");
        new_map.metadata.connections = json!([{ "from": "a", "to": "b" }]);
        let map = unit.create_map(new_map).await.unwrap();
        let root = unit
            .create_node(NewNode::titled(map.id, None, "Garden", 0))
            .await
            .unwrap();
        let mut beds = NewNode::titled(map.id, Some(root.id), "Beds", 1);
        beds.pos_x = Some(40);
        beds.content = NodeContent {
            note: Some("north side".to_string()),
            ..NodeContent::default()
        };
        unit.create_node(beds).await.unwrap();
        unit.create_node(NewNode::titled(map.id, Some(root.id), "Tools", 0))
            .await
            .unwrap();
        unit.commit().await.unwrap();
        map
    }

    #[tokio::test]
    async fn test_export_writes_readable_archive_and_cleans_up() {
        let repo = Arc::new(MemoryMapRepo::new());
        let map = seeded(&repo).await;
        let dir = tempfile::tempdir().unwrap();
        let exporter = MindFileExporter::new(repo.clone(), ScratchSpace::under(dir.path()));

        let exported = exporter.export(map.id).await.unwrap();
        assert_eq!(exported.file_name(), "Garden _ Plan.mind");
        assert_eq!(exported.node_count(), 3);
        assert!(exported.path().starts_with(dir.path().join("exports")));

        let document = unpack_archive(&exported.read_bytes().await.unwrap()).unwrap();
        let root = document.root.as_ref().unwrap();
        assert_eq!(root.title, "Garden");
        let titles: Vec<&str> = root.children.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Tools", "Beds"]);
        assert_eq!(root.children[1].pos, [Some(40), None]);
        assert_eq!(root.children[1].note.as_deref(), Some("north side"));
        assert!(root.created_at.is_some());
        assert_eq!(document.connections, json!([{ "from": "a", "to": "b" }]));

        let path = exported.path().to_path_buf();
        drop(exported);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_map_without_nodes_has_no_root() {
        let repo = Arc::new(MemoryMapRepo::new());
        let mut unit = repo.begin().await.unwrap();
        let map = unit
            .create_map(NewMap::blank(Uuid::now_v7(), "Empty"))
            .await
            .unwrap();
        unit.commit().await.unwrap();
        let dir = tempfile::tempdir().unwrap();

        let err = MindFileExporter::new(repo, ScratchSpace::under(dir.path()))
            .export(map.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::NoRootNode);
        assert!(matches!(err, ServiceError::ExportFailed { map_id, .. } if map_id == map.id));
    }

    #[tokio::test]
    async fn test_unknown_map_and_storage_errors() {
        let repo = Arc::new(MemoryMapRepo::new());
        let dir = tempfile::tempdir().unwrap();
        let err = MindFileExporter::new(repo, ScratchSpace::under(dir.path()))
            .export_document(Uuid::now_v7())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::NotFound);

        let mut broken = MockMapRepository::new();
        broken
            .expect_find_map()
            .returning(|_| Err(anyhow::anyhow!("connection reset")));
        let err = MindFileExporter::new(Arc::new(broken), ScratchSpace::under(dir.path()))
            .export(Uuid::now_v7())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::PersistenceFailed);
    }

    #[test]
    fn test_download_name_is_filesystem_safe() {
        assert_eq!(download_name("Plans"), "Plans.mind");
        assert_eq!(download_name("a/b\\c"), "a_b_c.mind");
        assert_eq!(download_name("   "), "map.mind");
        assert_eq!(download_name("Café ☕"), "Café ☕.mind");
    }
}
