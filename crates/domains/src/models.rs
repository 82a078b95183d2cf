//! # Domain Models
//!
//! These structs represent the core entities of a mind map.
//! Identities are UUID v7 (time-ordered) and are assigned by the persistence
//! layer when a row is created, never by callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Format version written into maps that do not say otherwise.
pub const BASELINE_MAP_VERSION: &str = "3.0";

/// Layout selector used when a map does not carry one.
pub const DEFAULT_LAYOUT: i64 = 1;

/// A named mind-map document owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MindMap {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    /// Version of the `.mind` format the map was created with (e.g. "3.0")
    pub map_version: String,
    pub layout: i64,
    /// Opaque theme document, passed through untouched
    pub theme: Option<Value>,
    pub metadata: MapMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Map-scoped collections carried by the `.mind` format.
///
/// None of these are interpreted here; they are stored and exported verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapMetadata {
    pub attachments: Value,
    pub connections: Value,
    pub custom_colors: Value,
    pub images: Value,
    pub slides: Value,
}

impl Default for MapMetadata {
    fn default() -> Self {
        Self {
            attachments: Value::Array(Vec::new()),
            connections: Value::Array(Vec::new()),
            custom_colors: Value::Array(Vec::new()),
            images: Value::Array(Vec::new()),
            slides: Value::Array(Vec::new()),
        }
    }
}

/// Fields needed to create a map. The repository fills in identity and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMap {
    pub owner_id: Uuid,
    pub title: String,
    pub map_version: String,
    pub layout: i64,
    pub theme: Option<Value>,
    pub metadata: MapMetadata,
}

impl NewMap {
    /// An empty map at the baseline version and default layout.
    pub fn blank(owner_id: Uuid, title: impl Into<String>) -> Self {
        Self {
            owner_id,
            title: title.into(),
            map_version: BASELINE_MAP_VERSION.to_string(),
            layout: DEFAULT_LAYOUT,
            theme: None,
            metadata: MapMetadata::default(),
        }
    }
}

/// Partial update of a map row. `None` leaves the column alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapPatch {
    pub title: Option<String>,
}

/// One entry in a map's hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub map_id: Uuid,
    /// `None` means this node is the root of its map
    pub parent_id: Option<Uuid>,
    pub title: String,
    /// Sibling ordering key; not necessarily contiguous
    pub rank: i64,
    /// Absent coordinates leave placement to the layout engine
    pub pos_x: Option<i64>,
    pub pos_y: Option<i64>,
    #[serde(flatten)]
    pub content: NodeContent,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Optional rich content attached to a node.
///
/// The JSON-typed fields are opaque documents: nothing in this workspace
/// assumes a schema for them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeContent {
    pub icon: Option<String>,
    pub style: Option<Value>,
    pub note: Option<String>,
    pub link: Option<String>,
    pub task_data: Option<Value>,
    pub external_task: Option<Value>,
    pub attachments: Option<Value>,
    pub image: Option<Value>,
    pub boundary: Option<Value>,
    pub video: Option<Value>,
    /// Free-form extension bag
    pub properties: Option<Value>,
}

/// Fields needed to create a node. The repository fills in identity and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    pub map_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub title: String,
    pub rank: i64,
    pub pos_x: Option<i64>,
    pub pos_y: Option<i64>,
    pub content: NodeContent,
}

impl NewNode {
    /// A content-less node, as created by the editor.
    pub fn titled(map_id: Uuid, parent_id: Option<Uuid>, title: impl Into<String>, rank: i64) -> Self {
        Self {
            map_id,
            parent_id,
            title: title.into(),
            rank,
            pos_x: None,
            pos_y: None,
            content: NodeContent::default(),
        }
    }

    /// Copy of `source` placed in `map_id` with no parent.
    ///
    /// Everything except identity, parent and timestamps is carried over.
    pub fn detached_copy(source: &Node, map_id: Uuid) -> Self {
        Self {
            map_id,
            parent_id: None,
            title: source.title.clone(),
            rank: source.rank,
            pos_x: source.pos_x,
            pos_y: source.pos_y,
            content: source.content.clone(),
        }
    }
}

/// Partial update of a node row.
///
/// The outer `Option` says whether a column is touched; for nullable columns the
/// inner value is what gets written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePatch {
    pub parent_id: Option<Option<Uuid>>,
    pub title: Option<String>,
    pub rank: Option<i64>,
    pub pos_x: Option<Option<i64>>,
    pub pos_y: Option<Option<i64>>,
}

impl NodePatch {
    pub fn reparent(parent_id: Option<Uuid>) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::default()
        }
    }

    pub fn retitle(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parent_id.is_none()
            && self.title.is_none()
            && self.rank.is_none()
            && self.pos_x.is_none()
            && self.pos_y.is_none()
    }

    /// Applies the patch to an in-memory copy of a node.
    pub fn apply_to(&self, node: &mut Node) {
        if let Some(parent_id) = self.parent_id {
            node.parent_id = parent_id;
        }
        if let Some(title) = &self.title {
            node.title = title.clone();
        }
        if let Some(rank) = self.rank {
            node.rank = rank;
        }
        if let Some(pos_x) = self.pos_x {
            node.pos_x = pos_x;
        }
        if let Some(pos_y) = self.pos_y {
            node.pos_y = pos_y;
        }
    }
}
