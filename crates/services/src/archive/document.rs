//! The `map.json` document: a map's fields plus its nested node tree.
//!
//! Every optional node field is written even when empty (as `null`, or `[]`
//! for `attachments` and `children`) so that readers can tell "empty" apart
//! from "unknown to the writer".

use chrono::SecondsFormat;
use domains::{
    MapMetadata, MapTree, MindMap, NewMap, NewNode, Node, NodeContent, TreeError,
    BASELINE_MAP_VERSION, DEFAULT_LAYOUT, MAX_DEPTH,
};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};
use uuid::Uuid;

/// Title given to an imported map whose root node has none.
pub const UNTITLED_MAP: &str = "Untitled map";

/// Top level of `map.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveDocument {
    #[serde(default = "baseline_version", deserialize_with = "version_string")]
    pub map_version: String,
    #[serde(default = "default_layout", deserialize_with = "layout_number")]
    pub layout: i64,
    #[serde(default)]
    pub theme: Option<Value>,
    #[serde(default = "empty_array", deserialize_with = "null_as_empty_array")]
    pub attachments: Value,
    #[serde(default = "empty_array", deserialize_with = "null_as_empty_array")]
    pub connections: Value,
    #[serde(default = "empty_array", deserialize_with = "null_as_empty_array")]
    pub custom_colors: Value,
    #[serde(default = "empty_array", deserialize_with = "null_as_empty_array")]
    pub images: Value,
    #[serde(default = "empty_array", deserialize_with = "null_as_empty_array")]
    pub slides: Value,
    #[serde(default)]
    pub root: Option<NodeDescriptor>,
}

/// One node of the nested tree in `map.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub rank: i64,
    #[serde(default, deserialize_with = "position")]
    pub pos: [Option<i64>; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub style: Option<Value>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub task: Option<Value>,
    #[serde(default)]
    pub external_task: Option<Value>,
    #[serde(default = "empty_array", deserialize_with = "null_as_empty_array")]
    pub attachments: Value,
    #[serde(default)]
    pub image: Option<Value>,
    #[serde(default)]
    pub boundary: Option<Value>,
    #[serde(default)]
    pub video: Option<Value>,
    #[serde(default)]
    pub property: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub children: Vec<NodeDescriptor>,
}

/// Map-level fields recovered from a document.
#[derive(Debug, Clone, PartialEq)]
pub struct MapFields {
    pub title: String,
    pub map_version: String,
    pub layout: i64,
    pub theme: Option<Value>,
    pub metadata: MapMetadata,
}

impl MapFields {
    pub fn owned_by(self, owner_id: Uuid) -> NewMap {
        NewMap {
            owner_id,
            title: self.title,
            map_version: self.map_version,
            layout: self.layout,
            theme: self.theme,
            metadata: self.metadata,
        }
    }
}

/// Builds the document for `map`, starting at the root of `tree`.
pub fn encode_document(map: &MindMap, tree: &MapTree) -> ArchiveDocument {
    ArchiveDocument {
        map_version: map.map_version.clone(),
        layout: map.layout,
        theme: map.theme.clone(),
        attachments: or_empty_array(&map.metadata.attachments),
        connections: or_empty_array(&map.metadata.connections),
        custom_colors: or_empty_array(&map.metadata.custom_colors),
        images: or_empty_array(&map.metadata.images),
        slides: or_empty_array(&map.metadata.slides),
        root: Some(encode_node(tree, tree.root())),
    }
}

fn encode_node(tree: &MapTree, node: &Node) -> NodeDescriptor {
    let content = &node.content;
    let children = tree
        .children_of(node.id)
        .unwrap_or_default()
        .into_iter()
        .map(|child| encode_node(tree, child))
        .collect();

    NodeDescriptor {
        title: node.title.clone(),
        rank: node.rank,
        pos: [node.pos_x, node.pos_y],
        created_at: Some(node.created_at.to_rfc3339_opts(SecondsFormat::Secs, false)),
        updated_at: Some(node.updated_at.to_rfc3339_opts(SecondsFormat::Secs, false)),
        icon: present_text(&content.icon),
        style: present(&content.style),
        note: present_text(&content.note),
        link: present_text(&content.link),
        task: present(&content.task_data),
        external_task: present(&content.external_task),
        attachments: present(&content.attachments).unwrap_or_else(empty_array),
        image: present(&content.image),
        boundary: present(&content.boundary),
        video: present(&content.video),
        property: present(&content.properties),
        children,
    }
}

/// Splits a document into the fields of the map to create and its root descriptor.
///
/// Trees deeper than [`MAX_DEPTH`] are refused, as they could never be stored.
pub fn decode_document(document: &ArchiveDocument) -> Result<(MapFields, &NodeDescriptor), TreeError> {
    let root = document.root.as_ref().ok_or(TreeError::MissingRoot)?;
    if root.depth() > MAX_DEPTH {
        return Err(TreeError::TooDeep { limit: MAX_DEPTH });
    }
    let title = if root.title.is_empty() {
        UNTITLED_MAP.to_string()
    } else {
        root.title.clone()
    };

    let fields = MapFields {
        title,
        map_version: document.map_version.clone(),
        layout: document.layout,
        theme: document.theme.clone(),
        metadata: MapMetadata {
            attachments: document.attachments.clone(),
            connections: document.connections.clone(),
            custom_colors: document.custom_colors.clone(),
            images: document.images.clone(),
            slides: document.slides.clone(),
        },
    };
    Ok((fields, root))
}

impl NodeDescriptor {
    /// The node this descriptor stands for, placed under `parent_id` in `map_id`.
    ///
    /// Timestamps are not carried over; the repository assigns fresh ones.
    pub fn to_new_node(&self, map_id: Uuid, parent_id: Option<Uuid>) -> NewNode {
        NewNode {
            map_id,
            parent_id,
            title: self.title.clone(),
            rank: self.rank,
            pos_x: self.pos[0],
            pos_y: self.pos[1],
            content: NodeContent {
                icon: self.icon.clone(),
                style: self.style.clone(),
                note: self.note.clone(),
                link: self.link.clone(),
                task_data: self.task.clone(),
                external_task: self.external_task.clone(),
                attachments: present(&Some(self.attachments.clone())),
                image: self.image.clone(),
                boundary: self.boundary.clone(),
                video: self.video.clone(),
                properties: self.property.clone(),
            },
        }
    }

    /// Levels in this subtree, itself included.
    pub fn depth(&self) -> usize {
        let mut stack = vec![(self, 1)];
        let mut deepest = 0;
        while let Some((descriptor, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(descriptor.children.iter().map(|child| (child, depth + 1)));
        }
        deepest
    }

    /// Number of descriptors in this subtree, itself included.
    pub fn subtree_len(&self) -> usize {
        let mut stack = vec![self];
        let mut count = 0;
        while let Some(descriptor) = stack.pop() {
            count += 1;
            stack.extend(descriptor.children.iter());
        }
        count
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn present(value: &Option<Value>) -> Option<Value> {
    value.as_ref().filter(|v| !is_blank(v)).cloned()
}

fn present_text(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}

fn or_empty_array(value: &Value) -> Value {
    if value.is_null() {
        empty_array()
    } else {
        value.clone()
    }
}

fn empty_array() -> Value {
    Value::Array(Vec::new())
}

fn baseline_version() -> String {
    BASELINE_MAP_VERSION.to_string()
}

fn default_layout() -> i64 {
    DEFAULT_LAYOUT
}

// Floats truncate toward zero, matching how the format's other readers cast.
fn number_to_i64(n: &Number) -> i64 {
    match n.as_i64() {
        Some(i) => i,
        None => n.as_f64().map(|f| f.trunc() as i64).unwrap_or_default(),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_empty_array<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.unwrap_or_else(empty_array))
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Number>::deserialize(deserializer)?
        .map(|n| number_to_i64(&n))
        .unwrap_or_default())
}

fn layout_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Number>::deserialize(deserializer)?
        .map(|n| number_to_i64(&n))
        .unwrap_or(DEFAULT_LAYOUT))
}

fn version_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None => Ok(baseline_version()),
        Some(Value::String(s)) => Ok(s),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(de::Error::custom(format!(
            "map_version must be a string or number, got {other}"
        ))),
    }
}

fn position<'de, D>(deserializer: D) -> Result<[Option<i64>; 2], D::Error>
where
    D: Deserializer<'de>,
{
    let coords = Option::<Vec<Option<Number>>>::deserialize(deserializer)?.unwrap_or_default();
    let coord = |i: usize| coords.get(i).and_then(Option::as_ref).map(number_to_i64);
    Ok([coord(0), coord(1)])
}
