//! # In-memory repository
//!
//! `MapRepository` backed by `DashMap`s. Used by service tests and as a
//! throwaway store. Each unit of work keeps its writes in a private overlay and
//! only touches the shared maps on `commit`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use domains::{MapPatch, MapRepository, MapUnitOfWork, MindMap, NewMap, NewNode, Node, NodePatch};
use tracing::debug;
use uuid::Uuid;

/// A stored node plus its insertion sequence, used as the rank tie-break.
#[derive(Debug, Clone)]
struct Row {
    seq: u64,
    node: Node,
}

#[derive(Debug, Default)]
struct Store {
    maps: DashMap<Uuid, MindMap>,
    nodes: DashMap<Uuid, Row>,
    seq: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryMapRepo {
    store: Arc<Store>,
    /// Units opened from this handle fail on the (n + 1)th `create_node`
    fail_after_node_creates: Option<usize>,
}

impl MemoryMapRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every unit opened through this handle error once it has created
    /// `n` nodes. Clones share storage, so a faulty handle can sit next to a
    /// healthy one over the same data.
    pub fn fail_after_node_creates(mut self, n: usize) -> Self {
        self.fail_after_node_creates = Some(n);
        self
    }

    /// Committed maps.
    pub fn map_count(&self) -> usize {
        self.store.maps.len()
    }

    /// Committed nodes across all maps.
    pub fn node_count(&self) -> usize {
        self.store.nodes.len()
    }
}

#[async_trait]
impl MapRepository for MemoryMapRepo {
    async fn find_map(&self, id: Uuid) -> anyhow::Result<Option<MindMap>> {
        Ok(self.store.maps.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_maps(&self, owner_id: Uuid, limit: i64, offset: i64) -> anyhow::Result<Vec<MindMap>> {
        let limit = usize::try_from(limit).context("page limit must not be negative")?;
        let offset = usize::try_from(offset).context("page offset must not be negative")?;
        let mut maps: Vec<MindMap> = self
            .store
            .maps
            .iter()
            .filter(|entry| entry.owner_id == owner_id)
            .map(|entry| entry.value().clone())
            .collect();
        maps.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(maps.into_iter().skip(offset).take(limit).collect())
    }

    async fn load_root(&self, map_id: Uuid) -> anyhow::Result<Option<Node>> {
        Ok(self
            .store
            .nodes
            .iter()
            .filter(|entry| entry.node.map_id == map_id && entry.node.is_root())
            .min_by_key(|entry| entry.seq)
            .map(|entry| entry.node.clone()))
    }

    async fn load_nodes(&self, map_id: Uuid) -> anyhow::Result<Vec<Node>> {
        let mut rows: Vec<Row> = self
            .store
            .nodes
            .iter()
            .filter(|entry| entry.node.map_id == map_id)
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|row| (row.node.rank, row.seq));
        Ok(rows.into_iter().map(|row| row.node).collect())
    }

    async fn find_node(&self, map_id: Uuid, node_id: Uuid) -> anyhow::Result<Option<Node>> {
        Ok(self
            .store
            .nodes
            .get(&node_id)
            .filter(|entry| entry.node.map_id == map_id)
            .map(|entry| entry.node.clone()))
    }

    async fn begin(&self) -> anyhow::Result<Box<dyn MapUnitOfWork>> {
        Ok(Box::new(MemoryUnit {
            store: Arc::clone(&self.store),
            maps: HashMap::new(),
            nodes: HashMap::new(),
            node_creates: 0,
            fail_after_node_creates: self.fail_after_node_creates,
        }))
    }
}

/// Staged writes. `None` marks a deletion.
struct MemoryUnit {
    store: Arc<Store>,
    maps: HashMap<Uuid, Option<MindMap>>,
    nodes: HashMap<Uuid, Option<Row>>,
    node_creates: usize,
    fail_after_node_creates: Option<usize>,
}

impl MemoryUnit {
    fn map(&self, id: Uuid) -> Option<MindMap> {
        match self.maps.get(&id) {
            Some(staged) => staged.clone(),
            None => self.store.maps.get(&id).map(|entry| entry.value().clone()),
        }
    }

    fn row(&self, id: Uuid) -> Option<Row> {
        match self.nodes.get(&id) {
            Some(staged) => staged.clone(),
            None => self.store.nodes.get(&id).map(|entry| entry.value().clone()),
        }
    }

    /// Parent links may only point at existing nodes of the same map.
    fn check_parent(&self, map_id: Uuid, parent_id: Uuid) -> anyhow::Result<()> {
        let parent = self
            .row(parent_id)
            .ok_or_else(|| anyhow!("parent node {parent_id} does not exist"))?;
        if parent.node.map_id != map_id {
            bail!("parent node {parent_id} belongs to another map");
        }
        Ok(())
    }

    /// Every node of the map as this unit currently sees it.
    fn map_nodes(&self, map_id: Uuid) -> Vec<Node> {
        let committed = self
            .store
            .nodes
            .iter()
            .filter(|entry| !self.nodes.contains_key(entry.key()))
            .map(|entry| entry.node.clone())
            .collect::<Vec<_>>();
        let staged = self.nodes.values().flatten().map(|row| row.node.clone());
        committed
            .into_iter()
            .chain(staged)
            .filter(|node| node.map_id == map_id)
            .collect()
    }
}

#[async_trait]
impl MapUnitOfWork for MemoryUnit {
    async fn create_map(&mut self, map: NewMap) -> anyhow::Result<MindMap> {
        let now = Utc::now();
        let created = MindMap {
            id: Uuid::now_v7(),
            owner_id: map.owner_id,
            title: map.title,
            map_version: map.map_version,
            layout: map.layout,
            theme: map.theme,
            metadata: map.metadata,
            created_at: now,
            updated_at: now,
        };
        self.maps.insert(created.id, Some(created.clone()));
        Ok(created)
    }

    async fn update_map(&mut self, id: Uuid, patch: MapPatch) -> anyhow::Result<()> {
        let mut map = self.map(id).ok_or_else(|| anyhow!("map {id} does not exist"))?;
        if let Some(title) = patch.title {
            map.title = title;
        }
        map.updated_at = Utc::now();
        self.maps.insert(id, Some(map));
        Ok(())
    }

    async fn delete_map(&mut self, id: Uuid) -> anyhow::Result<()> {
        for node in self.map_nodes(id) {
            self.nodes.insert(node.id, None);
        }
        self.maps.insert(id, None);
        Ok(())
    }

    async fn create_node(&mut self, node: NewNode) -> anyhow::Result<Node> {
        if let Some(limit) = self.fail_after_node_creates {
            if self.node_creates >= limit {
                bail!("injected failure after {limit} node creations");
            }
        }
        if self.map(node.map_id).is_none() {
            bail!("map {} does not exist", node.map_id);
        }
        if let Some(parent_id) = node.parent_id {
            self.check_parent(node.map_id, parent_id)?;
        }

        let now = Utc::now();
        let created = Node {
            id: Uuid::now_v7(),
            map_id: node.map_id,
            parent_id: node.parent_id,
            title: node.title,
            rank: node.rank,
            pos_x: node.pos_x,
            pos_y: node.pos_y,
            content: node.content,
            created_at: now,
            updated_at: now,
        };
        let seq = self.store.seq.fetch_add(1, Ordering::Relaxed);
        self.nodes.insert(
            created.id,
            Some(Row {
                seq,
                node: created.clone(),
            }),
        );
        self.node_creates += 1;
        Ok(created)
    }

    async fn update_node(&mut self, id: Uuid, patch: NodePatch) -> anyhow::Result<()> {
        let mut row = self.row(id).ok_or_else(|| anyhow!("node {id} does not exist"))?;
        if let Some(Some(parent_id)) = patch.parent_id {
            self.check_parent(row.node.map_id, parent_id)?;
        }
        patch.apply_to(&mut row.node);
        row.node.updated_at = Utc::now();
        self.nodes.insert(id, Some(row));
        Ok(())
    }

    async fn delete_node(&mut self, id: Uuid) -> anyhow::Result<u64> {
        let Some(row) = self.row(id) else {
            return Ok(0);
        };

        let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for node in self.map_nodes(row.node.map_id) {
            if let Some(parent_id) = node.parent_id {
                children.entry(parent_id).or_default().push(node.id);
            }
        }

        let mut doomed = HashSet::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if doomed.insert(current) {
                pending.extend(children.get(&current).into_iter().flatten().copied());
            }
        }

        for node_id in &doomed {
            self.nodes.insert(*node_id, None);
        }
        Ok(doomed.len() as u64)
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        let unit = *self;
        debug!(maps = unit.maps.len(), nodes = unit.nodes.len(), "committing memory unit");
        for (id, staged) in unit.maps {
            match staged {
                Some(map) => {
                    unit.store.maps.insert(id, map);
                }
                None => {
                    unit.store.maps.remove(&id);
                }
            }
        }
        for (id, staged) in unit.nodes {
            match staged {
                Some(row) => {
                    unit.store.nodes.insert(id, row);
                }
                None => {
                    unit.store.nodes.remove(&id);
                }
            }
        }
        Ok(())
    }
}
