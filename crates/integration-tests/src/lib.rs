//! Shared fixtures for the end-to-end tests in `tests/`.

use std::sync::Arc;

use serde_json::{json, Value};
use services::archive::{pack_archive, ArchiveDocument, NodeDescriptor};
use storage_adapters::SqliteMapRepo;

/// A fresh, migrated in-memory database.
pub async fn sqlite_repo() -> Arc<SqliteMapRepo> {
    Arc::new(
        SqliteMapRepo::connect("sqlite::memory:", 1)
            .await
            .expect("in-memory sqlite should open"),
    )
}

/// Packs a `map.json` value into `.mind` bytes.
pub fn archive_from_json(document: Value) -> Vec<u8> {
    let document: ArchiveDocument = serde_json::from_value(document).expect("fixture document should parse");
    pack_archive(&document).expect("fixture document should pack")
}

/// The two-node document: a root and one positioned child.
pub fn two_node_document() -> Value {
    json!({
        "map_version": "3.0",
        "layout": 1,
        "theme": null,
        "attachments": [],
        "connections": [],
        "custom_colors": [],
        "images": [],
        "slides": [],
        "root": {
            "title": "Root",
            "rank": 0,
            "pos": [null, null],
            "children": [
                { "title": "Child A", "rank": 0, "pos": [100, 50], "children": [] }
            ]
        }
    })
}

/// A descriptor with every optional field filled in, as an exporter writes it.
pub fn rich_node(title: &str, rank: i64, children: Vec<Value>) -> Value {
    json!({
        "title": title,
        "rank": rank,
        "pos": [rank * 10, null],
        "icon": "star",
        "style": { "color": "#ff8800", "bold": true },
        "note": format!("notes for {title}"),
        "link": "https://example.org/a/b",
        "task": { "status": "open", "due": "2025-03-01" },
        "external_task": { "provider": "tracker", "id": 42 },
        "attachments": [{ "name": "spec.pdf" }],
        "image": { "src": "img/1.png", "w": 64 },
        "boundary": { "kind": "cloud" },
        "video": { "url": "https://video.example/v/1" },
        "property": { "priority": 2 },
        "children": children
    })
}

/// A document exercising every map-level and node-level field.
pub fn rich_document() -> Value {
    json!({
        "map_version": "3.0",
        "layout": 3,
        "theme": { "name": "Café/Bar", "colors": ["#000", "#fff"] },
        "attachments": [{ "id": "a1" }],
        "connections": [{ "from": 1, "to": 2 }],
        "custom_colors": ["#123456"],
        "images": [],
        "slides": [{ "title": "Intro" }],
        "root": rich_node("Café/Bar", 0, vec![
            rich_node("first", 0, vec![rich_node("deep", 7, vec![])]),
            rich_node("second", 1, vec![]),
        ])
    })
}

/// A document whose tree is a single chain `levels` deep.
pub fn chain_document(levels: usize) -> Value {
    let mut node = rich_node(&format!("level {levels}"), 0, vec![]);
    for level in (1..levels).rev() {
        node = rich_node(&format!("level {level}"), 0, vec![node]);
    }
    let mut document = two_node_document();
    document["root"] = node;
    document
}

/// The document with export-only timestamps removed from every node.
pub fn without_timestamps(mut document: ArchiveDocument) -> ArchiveDocument {
    fn strip(node: &mut NodeDescriptor) {
        node.created_at = None;
        node.updated_at = None;
        node.children.iter_mut().for_each(strip);
    }
    if let Some(root) = document.root.as_mut() {
        strip(root);
    }
    document
}
