use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use domains::{MapRepository, MapTree, Node};
use integration_tests::{archive_from_json, rich_document, sqlite_repo};
use services::{FailureKind, MapDuplicator, MapEditor, MindFileImporter, ScratchSpace};
use storage_adapters::MemoryMapRepo;
use uuid::Uuid;

/// Every node reaches a single root within `nodes.len()` parent hops.
fn assert_well_formed(nodes: &[Node]) {
    let by_id: HashMap<Uuid, &Node> = nodes.iter().map(|n| (n.id, n)).collect();
    let roots: Vec<&Node> = nodes.iter().filter(|n| n.is_root()).collect();
    assert_eq!(roots.len(), 1, "expected exactly one root");

    for node in nodes {
        let mut current: &Node = node;
        let mut hops = 0;
        while let Some(parent_id) = current.parent_id {
            current = by_id.get(&parent_id).copied().expect("parent must exist in the same map");
            hops += 1;
            assert!(hops <= nodes.len(), "cycle through {}", node.id);
        }
        assert_eq!(current.id, roots[0].id);
    }
}

#[tokio::test]
async fn test_duplicate_five_nodes_then_cascade_delete_in_copy() {
    let repo = sqlite_repo().await;
    let editor = MapEditor::new(repo.clone());
    let (source, root) = editor.create_map(Uuid::now_v7(), "Five").await.unwrap();
    let a = editor.add_node(source.id, root.id, "a").await.unwrap();
    editor.add_node(source.id, a.id, "a1").await.unwrap();
    editor.add_node(source.id, a.id, "a2").await.unwrap();
    editor.add_node(source.id, root.id, "b").await.unwrap();

    let copy = MapDuplicator::new(repo.clone())
        .duplicate(source.id, "Five (copy)")
        .await
        .unwrap();

    let source_nodes = repo.load_nodes(source.id).await.unwrap();
    let copy_nodes = repo.load_nodes(copy.id).await.unwrap();
    assert_eq!(copy_nodes.len(), 5);
    assert_well_formed(&copy_nodes);

    let source_ids: HashSet<Uuid> = source_nodes.iter().map(|n| n.id).collect();
    assert!(copy_nodes.iter().all(|n| !source_ids.contains(&n.id)));

    let source_tree = MapTree::from_nodes(source_nodes).unwrap();
    let copy_tree = MapTree::from_nodes(copy_nodes).unwrap();
    let shape = |tree: &MapTree| -> Vec<(String, i64, usize)> {
        tree.iter()
            .map(|n| (n.title.clone(), n.rank, tree.children_of(n.id).unwrap().len()))
            .collect()
    };
    assert_eq!(shape(&copy_tree), shape(&source_tree));

    let copy_a = copy_tree.iter().find(|n| n.title == "a").unwrap().id;
    let mut doomed: HashSet<Uuid> = copy_tree.descendants_of(copy_a).unwrap().map(|n| n.id).collect();
    doomed.insert(copy_a);

    let removal = editor.delete_node(copy.id, copy_a).await.unwrap();
    assert_eq!(removal.removed.iter().copied().collect::<HashSet<_>>(), doomed);

    let remaining = repo.load_nodes(copy.id).await.unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|n| !doomed.contains(&n.id)));
    assert_well_formed(&remaining);
    assert_eq!(repo.load_nodes(source.id).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_edits_keep_a_single_root() {
    let repo = sqlite_repo().await;
    let dir = tempfile::tempdir().unwrap();
    let map = MindFileImporter::new(repo.clone(), ScratchSpace::under(dir.path()))
        .import(&archive_from_json(rich_document()), Uuid::now_v7())
        .await
        .unwrap();
    assert_well_formed(&repo.load_nodes(map.id).await.unwrap());

    let editor = MapEditor::new(repo.clone());
    let (_, tree) = editor.load_tree(map.id).await.unwrap();
    let root_id = tree.root().id;
    let first = tree.children_of(root_id).unwrap()[0].id;

    let added = editor.add_node(map.id, root_id, "third").await.unwrap();
    assert_eq!(added.rank, 2);
    editor.set_title_or_delete(map.id, first, "").await.unwrap();

    let err = editor.delete_node(map.id, root_id).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Invalid);

    let nodes = repo.load_nodes(map.id).await.unwrap();
    assert_eq!(nodes.len(), 3);
    assert_well_formed(&nodes);

    editor.delete_map(map.id).await.unwrap();
    assert!(repo.find_map(map.id).await.unwrap().is_none());
    assert!(repo.load_nodes(map.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_import_leaves_nothing_behind() {
    let repo = Arc::new(MemoryMapRepo::new());
    let dir = tempfile::tempdir().unwrap();
    let importer = MindFileImporter::new(
        Arc::new(repo.as_ref().clone().fail_after_node_creates(3)),
        ScratchSpace::under(dir.path()),
    );

    let err = importer
        .import(&archive_from_json(rich_document()), Uuid::now_v7())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::PersistenceFailed);
    assert_eq!(repo.map_count(), 0);
    assert_eq!(repo.node_count(), 0);

    let leftovers = std::fs::read_dir(dir.path().join("scratch")).unwrap().count();
    assert_eq!(leftovers, 0);
}
