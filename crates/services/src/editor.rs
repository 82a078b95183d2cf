//! # Map Editor
//!
//! Interactive editing of persisted maps: create, rename, delete and the
//! node-level operations behind the editor view.

use std::sync::Arc;

use domains::{
    MapPatch, MapRepository, MapTree, MindMap, NewMap, NewNode, Node, NodePatch, MAX_DEPTH,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Failure, Result, ServiceError};

/// Maps returned per page by [`MapEditor::list_maps`].
pub const MAPS_PER_PAGE: i64 = 10;

/// Longest title accepted for maps and nodes, in characters.
pub const MAX_TITLE_CHARS: usize = 255;

/// Trims a caller-supplied title and rejects it when blank or too long.
pub fn checked_title(raw: &str) -> std::result::Result<&str, Failure> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(Failure::Invalid("title must not be blank".to_string()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(Failure::Invalid(format!(
            "title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(title)
}

/// A batch of edits applied to one map in a single unit of work.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MapUpdate {
    pub title: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeUpdate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeUpdate {
    pub id: Uuid,
    pub title: Option<String>,
    pub pos_x: Option<i64>,
    pub pos_y: Option<i64>,
}

/// What a subtree deletion removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtreeRemoval {
    pub root: Uuid,
    /// The deleted node followed by all of its descendants
    pub removed: Vec<Uuid>,
}

impl SubtreeRemoval {
    pub fn count(&self) -> usize {
        self.removed.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TitleEdit {
    Renamed(Node),
    Deleted(SubtreeRemoval),
}

pub struct MapEditor {
    repo: Arc<dyn MapRepository>,
}

impl MapEditor {
    pub fn new(repo: Arc<dyn MapRepository>) -> Self {
        Self { repo }
    }

    /// Creates an empty map with a root node carrying the same title.
    #[instrument(skip(self))]
    pub async fn create_map(&self, owner_id: Uuid, title: &str) -> Result<(MindMap, Node)> {
        let outcome = async {
            let title = checked_title(title)?;
            let mut unit = self.repo.begin().await.map_err(Failure::PersistenceFailed)?;
            let map = unit
                .create_map(NewMap::blank(owner_id, title))
                .await
                .map_err(Failure::PersistenceFailed)?;
            let root = unit
                .create_node(NewNode::titled(map.id, None, title, 0))
                .await
                .map_err(Failure::PersistenceFailed)?;
            unit.commit().await.map_err(Failure::PersistenceFailed)?;
            info!(map_id = %map.id, %owner_id, "created map");
            Ok::<_, Failure>((map, root))
        }
        .await;
        outcome.map_err(|cause| edit_failed(None, cause))
    }

    /// Page `page` (1-based) of the owner's maps, newest first.
    #[instrument(skip(self))]
    pub async fn list_maps(&self, owner_id: Uuid, page: u32) -> Result<Vec<MindMap>> {
        let outcome = async {
            let Some(skipped) = page.checked_sub(1) else {
                return Err(Failure::Invalid("pages are numbered from 1".to_string()));
            };
            self.repo
                .list_maps(owner_id, MAPS_PER_PAGE, i64::from(skipped) * MAPS_PER_PAGE)
                .await
                .map_err(Failure::PersistenceFailed)
        }
        .await;
        outcome.map_err(|cause| edit_failed(None, cause))
    }

    /// The map with its validated node tree.
    #[instrument(skip(self))]
    pub async fn load_tree(&self, map_id: Uuid) -> Result<(MindMap, MapTree)> {
        self.tree_of(map_id)
            .await
            .map_err(|cause| edit_failed(Some(map_id), cause))
    }

    /// Applies a title change and node edits atomically.
    ///
    /// Node ids that are not part of the map are skipped. Returns how many
    /// node edits were applied.
    #[instrument(skip(self, update), fields(nodes = update.nodes.len()))]
    pub async fn apply_updates(&self, map_id: Uuid, update: MapUpdate) -> Result<usize> {
        let outcome = async {
            let title = update.title.as_deref().map(checked_title).transpose()?;
            let (_, tree) = self.tree_of(map_id).await?;

            let mut unit = self.repo.begin().await.map_err(Failure::PersistenceFailed)?;
            if let Some(title) = title {
                unit.update_map(
                    map_id,
                    MapPatch {
                        title: Some(title.to_string()),
                    },
                )
                .await
                .map_err(Failure::PersistenceFailed)?;
            }

            let mut applied = 0;
            for edit in &update.nodes {
                if !tree.contains(edit.id) {
                    debug!(node_id = %edit.id, "skipping edit for unknown node");
                    continue;
                }
                let patch = NodePatch {
                    title: edit.title.as_deref().map(checked_title).transpose()?.map(str::to_string),
                    pos_x: edit.pos_x.map(Some),
                    pos_y: edit.pos_y.map(Some),
                    ..NodePatch::default()
                };
                if patch.is_empty() {
                    continue;
                }
                unit.update_node(edit.id, patch)
                    .await
                    .map_err(Failure::PersistenceFailed)?;
                applied += 1;
            }

            unit.commit().await.map_err(Failure::PersistenceFailed)?;
            info!(%map_id, applied, "applied map updates");
            Ok::<_, Failure>(applied)
        }
        .await;
        outcome.map_err(|cause| edit_failed(Some(map_id), cause))
    }

    /// Deletes the map and all of its nodes.
    #[instrument(skip(self))]
    pub async fn delete_map(&self, map_id: Uuid) -> Result<()> {
        let outcome = async {
            self.existing_map(map_id).await?;
            let mut unit = self.repo.begin().await.map_err(Failure::PersistenceFailed)?;
            unit.delete_map(map_id).await.map_err(Failure::PersistenceFailed)?;
            unit.commit().await.map_err(Failure::PersistenceFailed)?;
            info!(%map_id, "deleted map");
            Ok::<_, Failure>(())
        }
        .await;
        outcome.map_err(|cause| edit_failed(Some(map_id), cause))
    }

    /// Appends a child after the parent's current last child.
    ///
    /// Refused when the child would sit below [`MAX_DEPTH`], so every map
    /// stays exportable.
    #[instrument(skip(self))]
    pub async fn add_node(&self, map_id: Uuid, parent_id: Uuid, title: &str) -> Result<Node> {
        let outcome = async {
            let title = checked_title(title)?;
            let (_, tree) = self.tree_of(map_id).await?;
            let rank = tree
                .children_of(parent_id)
                .map_err(|_| Failure::NodeNotFound(parent_id))?
                .iter()
                .map(|child| child.rank)
                .max()
                .map_or(0, |last| last + 1);
            if tree.depth_of(parent_id)? >= MAX_DEPTH {
                return Err(Failure::Invalid(format!(
                    "maps are limited to {MAX_DEPTH} levels"
                )));
            }

            let mut unit = self.repo.begin().await.map_err(Failure::PersistenceFailed)?;
            let node = unit
                .create_node(NewNode::titled(map_id, Some(parent_id), title, rank))
                .await
                .map_err(Failure::PersistenceFailed)?;
            unit.commit().await.map_err(Failure::PersistenceFailed)?;
            debug!(node_id = %node.id, rank, "added node");
            Ok::<_, Failure>(node)
        }
        .await;
        outcome.map_err(|cause| edit_failed(Some(map_id), cause))
    }

    #[instrument(skip(self))]
    pub async fn rename_node(&self, map_id: Uuid, node_id: Uuid, title: &str) -> Result<Node> {
        let outcome = async {
            let title = checked_title(title)?;
            self.retitle(map_id, node_id, title).await
        }
        .await;
        outcome.map_err(|cause| edit_failed(Some(map_id), cause))
    }

    /// Renames the node, or deletes it with its subtree when the title is blank.
    #[instrument(skip(self))]
    pub async fn set_title_or_delete(&self, map_id: Uuid, node_id: Uuid, title: &str) -> Result<TitleEdit> {
        let outcome = async {
            if title.trim().is_empty() {
                self.remove_subtree(map_id, node_id).await.map(TitleEdit::Deleted)
            } else {
                let title = checked_title(title)?;
                self.retitle(map_id, node_id, title).await.map(TitleEdit::Renamed)
            }
        }
        .await;
        outcome.map_err(|cause| edit_failed(Some(map_id), cause))
    }

    /// Deletes a non-root node and everything below it.
    #[instrument(skip(self))]
    pub async fn delete_node(&self, map_id: Uuid, node_id: Uuid) -> Result<SubtreeRemoval> {
        self.remove_subtree(map_id, node_id)
            .await
            .map_err(|cause| edit_failed(Some(map_id), cause))
    }

    async fn existing_map(&self, map_id: Uuid) -> std::result::Result<MindMap, Failure> {
        self.repo
            .find_map(map_id)
            .await
            .map_err(Failure::PersistenceFailed)?
            .ok_or(Failure::MapNotFound(map_id))
    }

    async fn tree_of(&self, map_id: Uuid) -> std::result::Result<(MindMap, MapTree), Failure> {
        let map = self.existing_map(map_id).await?;
        let nodes = self
            .repo
            .load_nodes(map_id)
            .await
            .map_err(Failure::PersistenceFailed)?;
        if nodes.is_empty() {
            return Err(Failure::NoRootNode(map_id));
        }
        Ok((map, MapTree::from_nodes(nodes)?))
    }

    async fn retitle(&self, map_id: Uuid, node_id: Uuid, title: &str) -> std::result::Result<Node, Failure> {
        let mut node = self
            .repo
            .find_node(map_id, node_id)
            .await
            .map_err(Failure::PersistenceFailed)?
            .ok_or(Failure::NodeNotFound(node_id))?;
        let patch = NodePatch::retitle(title);

        let mut unit = self.repo.begin().await.map_err(Failure::PersistenceFailed)?;
        unit.update_node(node_id, patch.clone())
            .await
            .map_err(Failure::PersistenceFailed)?;
        unit.commit().await.map_err(Failure::PersistenceFailed)?;

        patch.apply_to(&mut node);
        Ok(node)
    }

    async fn remove_subtree(&self, map_id: Uuid, node_id: Uuid) -> std::result::Result<SubtreeRemoval, Failure> {
        let (_, tree) = self.tree_of(map_id).await?;
        let node = tree.get(node_id).ok_or(Failure::NodeNotFound(node_id))?;
        if node.is_root() {
            return Err(Failure::Invalid(
                "the root node cannot be deleted; delete the map instead".to_string(),
            ));
        }

        let removed: Vec<Uuid> = std::iter::once(node_id)
            .chain(tree.descendants_of(node_id)?.map(|n| n.id))
            .collect();

        let mut unit = self.repo.begin().await.map_err(Failure::PersistenceFailed)?;
        let deleted = unit.delete_node(node_id).await.map_err(Failure::PersistenceFailed)?;
        unit.commit().await.map_err(Failure::PersistenceFailed)?;

        if deleted != removed.len() as u64 {
            warn!(%node_id, expected = removed.len(), deleted, "subtree size changed during delete");
        }
        info!(%map_id, %node_id, removed = removed.len(), "deleted subtree");
        Ok(SubtreeRemoval {
            root: node_id,
            removed,
        })
    }
}

fn edit_failed(map_id: Option<Uuid>, cause: Failure) -> ServiceError {
    warn!(map_id = ?map_id, kind = cause.kind().as_str(), error = %cause, "map edit failed");
    ServiceError::EditFailed { map_id, cause }
}
