//! # Map Handlers
//!
//! Coordinates the flow between HTTP requests and the map services.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use domains::{MapRepository, MindMap, Node};
use serde::{Deserialize, Serialize};
use services::{
    Failure, MapDuplicator, MapEditor, MapUpdate, MindFileExporter, MindFileImporter, ScratchSpace, ServiceError,
    SubtreeRemoval, TitleEdit,
};
use uuid::Uuid;

use crate::error::ApiError;

/// Header carrying the acting user. Authentication happens upstream.
pub const OWNER_HEADER: &str = "x-owner-id";

/// Header carrying the original name of an uploaded archive.
pub const FILE_NAME_HEADER: &str = "x-file-name";

const ARCHIVE_EXTENSION: &str = ".mind";

/// State shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub importer: Arc<MindFileImporter>,
    pub exporter: Arc<MindFileExporter>,
    pub duplicator: Arc<MapDuplicator>,
    pub editor: Arc<MapEditor>,
}

impl AppState {
    pub fn new(repo: Arc<dyn MapRepository>, scratch: ScratchSpace) -> Self {
        Self {
            importer: Arc::new(MindFileImporter::new(repo.clone(), scratch.clone())),
            exporter: Arc::new(MindFileExporter::new(repo.clone(), scratch)),
            duplicator: Arc::new(MapDuplicator::new(repo.clone())),
            editor: Arc::new(MapEditor::new(repo)),
        }
    }
}

/// The user on whose behalf a map is created.
#[derive(Debug, Clone, Copy)]
pub struct OwnerId(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for OwnerId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .map(OwnerId)
            .ok_or(ApiError::MissingOwner)
    }
}

#[derive(Debug, Deserialize)]
pub struct TitleInput {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct NewNodeInput {
    pub parent_id: Uuid,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "first_page")]
    pub page: u32,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Serialize)]
pub struct CreatedMap {
    pub map: MindMap,
    pub root: Node,
}

#[derive(Debug, Serialize)]
pub struct MapView {
    pub map: MindMap,
    /// Every node, parents before children, siblings in rank order
    pub nodes: Vec<Node>,
}

#[derive(Debug, Serialize)]
pub struct UpdateSummary {
    pub applied: usize,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TitleOutcome {
    Renamed { node: Node },
    Deleted { removal: SubtreeRemoval },
}

pub async fn create_map(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Json(input): Json<TitleInput>,
) -> Result<impl IntoResponse, ApiError> {
    let (map, root) = state.editor.create_map(owner_id, &input.title).await?;
    Ok((StatusCode::CREATED, Json(CreatedMap { map, root })))
}

/// The caller's maps, newest first, ten per page.
pub async fn list_maps(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<MindMap>>, ApiError> {
    Ok(Json(state.editor.list_maps(owner_id, query.page).await?))
}

/// Imports a raw `.mind` body. The declared file name must carry the extension.
pub async fn import_map(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let file_name = headers
        .get(FILE_NAME_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !file_name.to_ascii_lowercase().ends_with(ARCHIVE_EXTENSION) {
        return Err(ApiError::BadRequest(format!(
            "uploaded file must have a {ARCHIVE_EXTENSION} extension"
        )));
    }

    let map = state.importer.import(&body, owner_id).await?;
    Ok((StatusCode::CREATED, Json(map)))
}

pub async fn get_map(State(state): State<AppState>, Path(map_id): Path<Uuid>) -> Result<Json<MapView>, ApiError> {
    let (map, tree) = state.editor.load_tree(map_id).await?;
    let nodes = tree.iter().cloned().collect();
    Ok(Json(MapView { map, nodes }))
}

pub async fn update_map(
    State(state): State<AppState>,
    Path(map_id): Path<Uuid>,
    Json(update): Json<MapUpdate>,
) -> Result<Json<UpdateSummary>, ApiError> {
    let applied = state.editor.apply_updates(map_id, update).await?;
    Ok(Json(UpdateSummary { applied }))
}

pub async fn delete_map(State(state): State<AppState>, Path(map_id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    state.editor.delete_map(map_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Streams the archive as an attachment named after the map.
pub async fn export_map(State(state): State<AppState>, Path(map_id): Path<Uuid>) -> Result<Response, ApiError> {
    let exported = state.exporter.export(map_id).await?;
    let bytes = exported
        .read_bytes()
        .await
        .map_err(|e| ServiceError::ExportFailed {
            map_id,
            cause: Failure::Scratch(e),
        })?;
    let disposition = attachment_header(exported.file_name());
    drop(exported);

    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

pub async fn duplicate_map(
    State(state): State<AppState>,
    Path(map_id): Path<Uuid>,
    Json(input): Json<TitleInput>,
) -> Result<impl IntoResponse, ApiError> {
    let copy = state.duplicator.duplicate(map_id, &input.title).await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

pub async fn add_node(
    State(state): State<AppState>,
    Path(map_id): Path<Uuid>,
    Json(input): Json<NewNodeInput>,
) -> Result<impl IntoResponse, ApiError> {
    let node = state.editor.add_node(map_id, input.parent_id, &input.title).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

/// Renames the node; a blank title deletes it together with its subtree.
pub async fn set_node_title(
    State(state): State<AppState>,
    Path((map_id, node_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<TitleInput>,
) -> Result<Json<TitleOutcome>, ApiError> {
    let outcome = match state.editor.set_title_or_delete(map_id, node_id, &input.title).await? {
        TitleEdit::Renamed(node) => TitleOutcome::Renamed { node },
        TitleEdit::Deleted(removal) => TitleOutcome::Deleted { removal },
    };
    Ok(Json(outcome))
}

pub async fn delete_node(
    State(state): State<AppState>,
    Path((map_id, node_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SubtreeRemoval>, ApiError> {
    Ok(Json(state.editor.delete_node(map_id, node_id).await?))
}

/// `attachment` disposition with an ASCII fallback plus the RFC 5987 UTF-8 form.
fn attachment_header(file_name: &str) -> HeaderValue {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    let encoded: String = file_name
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => (b as char).to_string(),
            _ => format!("%{b:02X}"),
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}"))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
