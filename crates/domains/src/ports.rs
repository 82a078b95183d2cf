//! # Core Traits (Ports)
//!
//! Any persistence adapter must implement these traits to be used by the services.
//! Reads go through [`MapRepository`]; every write happens inside a
//! [`MapUnitOfWork`] so that multi-row changes commit or roll back together.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{MapPatch, MindMap, NewMap, NewNode, Node, NodePatch};

/// Read access to maps and nodes, plus the entry point for atomic writes.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MapRepository: Send + Sync {
    async fn find_map(&self, id: Uuid) -> anyhow::Result<Option<MindMap>>;

    /// A page of the maps owned by `owner_id`, newest first.
    async fn list_maps(&self, owner_id: Uuid, limit: i64, offset: i64) -> anyhow::Result<Vec<MindMap>>;

    /// The unique null-parent node of the map, if any.
    async fn load_root(&self, map_id: Uuid) -> anyhow::Result<Option<Node>>;

    /// Every node of the map, ordered by rank with creation order as tie-break.
    async fn load_nodes(&self, map_id: Uuid) -> anyhow::Result<Vec<Node>>;

    /// A node, only if it belongs to `map_id`.
    async fn find_node(&self, map_id: Uuid, node_id: Uuid) -> anyhow::Result<Option<Node>>;

    /// Opens a unit of work. Dropping it without calling `commit` discards its writes.
    async fn begin(&self) -> anyhow::Result<Box<dyn MapUnitOfWork>>;
}

/// A set of writes that is persisted all-or-nothing.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MapUnitOfWork: Send {
    async fn create_map(&mut self, map: NewMap) -> anyhow::Result<MindMap>;

    async fn update_map(&mut self, id: Uuid, patch: MapPatch) -> anyhow::Result<()>;

    /// Removes the map and, by cascade, all of its nodes.
    async fn delete_map(&mut self, id: Uuid) -> anyhow::Result<()>;

    /// Fails unless the parent, if any, is a node of the same map.
    async fn create_node(&mut self, node: NewNode) -> anyhow::Result<Node>;

    async fn update_node(&mut self, id: Uuid, patch: NodePatch) -> anyhow::Result<()>;

    /// Removes the node and its whole subtree, returning how many rows went away.
    async fn delete_node(&mut self, id: Uuid) -> anyhow::Result<u64>;

    async fn commit(self: Box<Self>) -> anyhow::Result<()>;
}
