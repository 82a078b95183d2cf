use std::io::{Cursor, Read};

use domains::{MapRepository, MapTree, MAX_DEPTH};
use integration_tests::{
    archive_from_json, chain_document, rich_document, sqlite_repo, two_node_document, without_timestamps,
};
use serde_json::from_value;
use services::archive::{unpack_archive, ArchiveDocument, DESCRIPTOR_NAME};
use services::{FailureKind, MindFileExporter, MindFileImporter, ScratchSpace};
use uuid::Uuid;

#[tokio::test]
async fn test_import_then_export_reproduces_the_document() {
    let repo = sqlite_repo().await;
    let dir = tempfile::tempdir().unwrap();
    let scratch = ScratchSpace::under(dir.path());
    let importer = MindFileImporter::new(repo.clone(), scratch.clone());
    let exporter = MindFileExporter::new(repo.clone(), scratch);

    let original: ArchiveDocument = from_value(rich_document()).unwrap();
    let map = importer
        .import(&archive_from_json(rich_document()), Uuid::now_v7())
        .await
        .unwrap();
    assert_eq!(map.title, "Café/Bar");
    assert_eq!(map.layout, 3);

    let exported = exporter.export(map.id).await.unwrap();
    assert_eq!(exported.node_count(), 4);
    let bytes = exported.read_bytes().await.unwrap();
    let round_tripped = unpack_archive(&bytes).unwrap();

    let root = round_tripped.root.as_ref().unwrap();
    assert!(root.created_at.as_deref().unwrap().ends_with("+00:00"));
    assert_eq!(without_timestamps(round_tripped), original);
}

#[tokio::test]
async fn test_scenario_two_nodes() {
    let repo = sqlite_repo().await;
    let dir = tempfile::tempdir().unwrap();
    let scratch = ScratchSpace::under(dir.path());

    let map = MindFileImporter::new(repo.clone(), scratch.clone())
        .import(&archive_from_json(two_node_document()), Uuid::now_v7())
        .await
        .unwrap();
    assert_eq!(map.title, "Root");

    let tree = MapTree::from_nodes(repo.load_nodes(map.id).await.unwrap()).unwrap();
    assert_eq!(tree.len(), 2);
    let root = tree.root();
    assert!(root.parent_id.is_none());
    let children = tree.children_of(root.id).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].title, "Child A");
    assert_eq!(children[0].parent_id, Some(root.id));
    assert_eq!((children[0].pos_x, children[0].pos_y), (Some(100), Some(50)));

    let document = MindFileExporter::new(repo, scratch)
        .export_document(map.id)
        .await
        .unwrap();
    let expected: ArchiveDocument = from_value(two_node_document()).unwrap();
    assert_eq!(without_timestamps(document), expected);
}

#[tokio::test]
async fn test_exported_container_layout() {
    let repo = sqlite_repo().await;
    let dir = tempfile::tempdir().unwrap();
    let scratch = ScratchSpace::under(dir.path());
    let map = MindFileImporter::new(repo.clone(), scratch.clone())
        .import(&archive_from_json(rich_document()), Uuid::now_v7())
        .await
        .unwrap();

    let exported = MindFileExporter::new(repo, scratch).export(map.id).await.unwrap();
    assert_eq!(exported.file_name(), "Café_Bar.mind");
    let bytes = exported.read_bytes().await.unwrap();

    let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    assert_eq!(zip.len(), 1);
    let mut text = String::new();
    zip.by_name(DESCRIPTOR_NAME).unwrap().read_to_string(&mut text).unwrap();
    assert!(text.contains("\"Café/Bar\""));
    assert!(text.contains("https://example.org/a/b"));
    assert!(text.contains("\n    \"map_version\": \"3.0\""));
}

#[tokio::test]
async fn test_deep_chain_survives_import_then_export() {
    let repo = sqlite_repo().await;
    let dir = tempfile::tempdir().unwrap();
    let scratch = ScratchSpace::under(dir.path());
    let levels = 120;

    let map = MindFileImporter::new(repo.clone(), scratch.clone())
        .import(&archive_from_json(chain_document(levels)), Uuid::now_v7())
        .await
        .unwrap();
    let tree = MapTree::from_nodes(repo.load_nodes(map.id).await.unwrap()).unwrap();
    assert_eq!(tree.len(), levels);

    let exported = MindFileExporter::new(repo, scratch).export(map.id).await.unwrap();
    let bytes = exported.read_bytes().await.unwrap();
    let expected: ArchiveDocument = from_value(chain_document(levels)).unwrap();
    assert_eq!(without_timestamps(unpack_archive(&bytes).unwrap()), expected);
}

#[tokio::test]
async fn test_import_refuses_trees_deeper_than_storage_allows() {
    let repo = sqlite_repo().await;
    let dir = tempfile::tempdir().unwrap();
    let importer = MindFileImporter::new(repo, ScratchSpace::under(dir.path()));

    let err = importer
        .import(&archive_from_json(chain_document(MAX_DEPTH + 1)), Uuid::now_v7())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::MalformedTree);
}
