//! # Tree Model
//!
//! In-memory, validated view of a map's node hierarchy.
//!
//! A [`MapTree`] is only ever constructed from a node set that satisfies the
//! map invariants: exactly one root, every parent present in the same map,
//! no cycles, and no node more than [`MAX_DEPTH`] levels down. Anything else
//! is rejected with a [`TreeError`].

use std::collections::HashMap;

use thiserror::Error;
use uuid::Uuid;

use crate::models::Node;

/// Deepest level a node may sit at, counting the root as level 1.
///
/// The `.mind` reader accepts every tree within this bound.
pub const MAX_DEPTH: usize = 128;

/// Ways a node set can fail to form a well-formed map tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("tree has no root node")]
    MissingRoot,

    #[error("tree has {} root nodes, expected exactly one", .0.len())]
    MultipleRoots(Vec<Uuid>),

    #[error("node {0} appears more than once")]
    DuplicateNode(Uuid),

    #[error("node {node} references missing parent {parent}")]
    DanglingParent { node: Uuid, parent: Uuid },

    #[error("node {node} references parent {parent} from another map")]
    ForeignParent { node: Uuid, parent: Uuid },

    #[error("node {0} is part of a parent cycle")]
    Cycle(Uuid),

    #[error("node {0} is not part of this tree")]
    UnknownNode(Uuid),

    #[error("tree is deeper than {limit} levels")]
    TooDeep { limit: usize },
}

/// A validated map hierarchy with rank-ordered children.
#[derive(Debug, Clone)]
pub struct MapTree {
    root: Uuid,
    nodes: HashMap<Uuid, Node>,
    children: HashMap<Uuid, Vec<Uuid>>,
    depths: HashMap<Uuid, usize>,
}

impl MapTree {
    /// Builds and validates a tree from a flat node set.
    ///
    /// Siblings are ordered by `rank`; equal ranks keep the order in which the
    /// nodes were supplied.
    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self, TreeError> {
        let mut by_id: HashMap<Uuid, Node> = HashMap::with_capacity(nodes.len());
        let mut arrival: Vec<Uuid> = Vec::with_capacity(nodes.len());
        for node in nodes {
            let id = node.id;
            if by_id.insert(id, node).is_some() {
                return Err(TreeError::DuplicateNode(id));
            }
            arrival.push(id);
        }

        let roots: Vec<Uuid> = arrival
            .iter()
            .copied()
            .filter(|id| by_id[id].parent_id.is_none())
            .collect();
        let root = match roots.as_slice() {
            [] => return Err(TreeError::MissingRoot),
            [root] => *root,
            _ => return Err(TreeError::MultipleRoots(roots)),
        };

        let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for id in &arrival {
            let node = &by_id[id];
            let Some(parent_id) = node.parent_id else {
                continue;
            };
            let parent = by_id.get(&parent_id).ok_or(TreeError::DanglingParent {
                node: node.id,
                parent: parent_id,
            })?;
            if parent.map_id != node.map_id {
                return Err(TreeError::ForeignParent {
                    node: node.id,
                    parent: parent_id,
                });
            }
            children.entry(parent_id).or_default().push(node.id);
        }
        for siblings in children.values_mut() {
            siblings.sort_by_key(|id| by_id[id].rank);
        }

        let mut tree = Self {
            root,
            nodes: by_id,
            children,
            depths: HashMap::new(),
        };
        tree.depths = tree.measure_depths()?;

        // With a single root and no dangling parents, anything the root
        // cannot reach hangs off a cycle.
        if tree.depths.len() != tree.nodes.len() {
            let stray = arrival
                .into_iter()
                .find(|id| !tree.depths.contains_key(id))
                .ok_or(TreeError::MissingRoot)?;
            return Err(TreeError::Cycle(stray));
        }

        Ok(tree)
    }

    pub fn root(&self) -> &Node {
        &self.nodes[&self.root]
    }

    pub fn get(&self, id: Uuid) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Level of `id` in the tree; the root is at level 1.
    pub fn depth_of(&self, id: Uuid) -> Result<usize, TreeError> {
        self.depths.get(&id).copied().ok_or(TreeError::UnknownNode(id))
    }

    /// Direct children of `id`, ordered by rank.
    pub fn children_of(&self, id: Uuid) -> Result<Vec<&Node>, TreeError> {
        if !self.contains(id) {
            return Err(TreeError::UnknownNode(id));
        }
        Ok(self
            .child_ids(id)
            .iter()
            .map(|child| &self.nodes[child])
            .collect())
    }

    /// All transitive children of `id`, parents before their descendants and
    /// siblings in rank order. `id` itself is not included.
    ///
    /// The returned iterator is lazy; call again to restart the walk.
    pub fn descendants_of(&self, id: Uuid) -> Result<Descendants<'_>, TreeError> {
        if !self.contains(id) {
            return Err(TreeError::UnknownNode(id));
        }
        let mut stack = Vec::new();
        stack.extend(self.child_ids(id).iter().rev().copied());
        Ok(Descendants { tree: self, stack })
    }

    /// Every node, root first, in the same order as [`MapTree::descendants_of`].
    pub fn iter(&self) -> impl Iterator<Item = &Node> + '_ {
        std::iter::once(self.root()).chain(
            Descendants {
                tree: self,
                stack: self.child_ids(self.root).iter().rev().copied().collect(),
            },
        )
    }

    fn child_ids(&self, id: Uuid) -> &[Uuid] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Levels of every node reachable from the root.
    fn measure_depths(&self) -> Result<HashMap<Uuid, usize>, TreeError> {
        let mut depths = HashMap::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root, 1)];
        while let Some((id, depth)) = stack.pop() {
            if depths.contains_key(&id) {
                continue;
            }
            if depth > MAX_DEPTH {
                return Err(TreeError::TooDeep { limit: MAX_DEPTH });
            }
            depths.insert(id, depth);
            stack.extend(self.child_ids(id).iter().map(|child| (*child, depth + 1)));
        }
        Ok(depths)
    }
}

/// Pre-order walk over a subtree. See [`MapTree::descendants_of`].
#[derive(Debug, Clone)]
pub struct Descendants<'a> {
    tree: &'a MapTree,
    stack: Vec<Uuid>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.child_ids(id).iter().rev().copied());
        self.tree.nodes.get(&id)
    }
}
