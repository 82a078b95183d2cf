//! # Duplicator
//!
//! Clones a persisted map and its whole node tree under fresh identities.

use std::collections::HashMap;
use std::sync::Arc;

use domains::{MapRepository, MindMap, NewMap, NewNode, NodePatch, TreeError};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::editor::checked_title;
use crate::error::{Failure, Result, ServiceError};

pub struct MapDuplicator {
    repo: Arc<dyn MapRepository>,
}

impl MapDuplicator {
    pub fn new(repo: Arc<dyn MapRepository>) -> Self {
        Self { repo }
    }

    /// Copies `map_id` into a new map titled `new_title`, owned by the same user.
    ///
    /// Both passes run in one unit of work; a failure leaves no partial copy.
    #[instrument(skip(self))]
    pub async fn duplicate(&self, map_id: Uuid, new_title: &str) -> Result<MindMap> {
        self.clone_map(map_id, new_title).await.map_err(|cause| {
            warn!(%map_id, kind = cause.kind().as_str(), error = %cause, "duplication failed");
            ServiceError::DuplicationFailed { map_id, cause }
        })
    }

    async fn clone_map(&self, map_id: Uuid, new_title: &str) -> std::result::Result<MindMap, Failure> {
        let title = checked_title(new_title)?;
        let source = self
            .repo
            .find_map(map_id)
            .await
            .map_err(Failure::PersistenceFailed)?
            .ok_or(Failure::MapNotFound(map_id))?;
        let nodes = self
            .repo
            .load_nodes(map_id)
            .await
            .map_err(Failure::PersistenceFailed)?;

        let mut unit = self.repo.begin().await.map_err(Failure::PersistenceFailed)?;
        let copy = unit
            .create_map(NewMap {
                owner_id: source.owner_id,
                title: title.to_string(),
                map_version: source.map_version.clone(),
                layout: source.layout,
                theme: source.theme.clone(),
                metadata: source.metadata.clone(),
            })
            .await
            .map_err(Failure::PersistenceFailed)?;

        // Pass one: every clone starts detached; identities only exist once created.
        let mut clone_of: HashMap<Uuid, Uuid> = HashMap::with_capacity(nodes.len());
        for node in &nodes {
            let clone = unit
                .create_node(NewNode::detached_copy(node, copy.id))
                .await
                .map_err(Failure::PersistenceFailed)?;
            clone_of.insert(node.id, clone.id);
        }

        // Pass two: point each clone at the clone of its source parent.
        for node in &nodes {
            let Some(parent_id) = node.parent_id else {
                continue;
            };
            let new_parent = *clone_of.get(&parent_id).ok_or(TreeError::DanglingParent {
                node: node.id,
                parent: parent_id,
            })?;
            unit.update_node(clone_of[&node.id], NodePatch::reparent(Some(new_parent)))
                .await
                .map_err(Failure::PersistenceFailed)?;
        }

        unit.commit().await.map_err(Failure::PersistenceFailed)?;
        info!(source = %map_id, copy = %copy.id, nodes = nodes.len(), "duplicated map");
        Ok(copy)
    }
}
