use std::sync::Arc;

use api_adapters::handlers::{FILE_NAME_HEADER, OWNER_HEADER};
use api_adapters::{router, AppState};
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use services::archive::{pack_archive, unpack_archive, ArchiveDocument};
use services::ScratchSpace;
use storage_adapters::MemoryMapRepo;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

const UPLOAD_LIMIT: usize = 64 * 1024;

fn app() -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(Arc::new(MemoryMapRepo::new()), ScratchSpace::under(dir.path()));
    (router(state, UPLOAD_LIMIT), dir)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(OWNER_HEADER, Uuid::now_v7().to_string())
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn upload(name: &str, bytes: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/maps/import")
        .header(OWNER_HEADER, Uuid::now_v7().to_string())
        .header(FILE_NAME_HEADER, name)
        .body(Body::from(bytes))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    let value = if body.is_empty() { Value::Null } else { serde_json::from_slice(&body).unwrap() };
    (status, value)
}

fn sample_archive() -> Vec<u8> {
    let document: ArchiveDocument = serde_json::from_value(json!({
        "map_version": "3.0",
        "layout": 2,
        "root": {
            "title": "Holiday",
            "rank": 0,
            "pos": [0, 0],
            "children": [
                { "title": "Flights", "rank": 0, "pos": [null, null], "children": [] },
                { "title": "Hotel", "rank": 1, "pos": [120, 40], "note": "sea view", "children": [] }
            ]
        }
    }))
    .unwrap();
    pack_archive(&document).unwrap()
}

#[tokio::test]
async fn test_create_edit_and_export_map() {
    let (app, _dir) = app();

    let (status, created) = send_json(&app, json_request("POST", "/maps", json!({ "title": "Plans" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let map_id = created["map"]["id"].as_str().unwrap().to_string();
    let root_id = created["root"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["root"]["title"], "Plans");

    let (status, node) = send_json(
        &app,
        json_request("POST", &format!("/maps/{map_id}/nodes"), json!({ "parent_id": root_id, "title": "Budget" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(node["rank"], 0);

    let (status, summary) = send_json(
        &app,
        json_request(
            "PATCH",
            &format!("/maps/{map_id}"),
            json!({ "title": "Plans 2025", "nodes": [{ "id": node["id"], "pos_x": 30, "pos_y": 15 }] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["applied"], 1);

    let (status, view) = send_json(&app, json_request("GET", &format!("/maps/{map_id}"), Value::Null)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["map"]["title"], "Plans 2025");
    assert_eq!(view["nodes"].as_array().unwrap().len(), 2);

    let response = app
        .clone()
        .oneshot(json_request("GET", &format!("/maps/{map_id}/export"), Value::Null))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.contains("filename=\"Plans 2025.mind\""));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let document = unpack_archive(&bytes).unwrap();
    let root = document.root.unwrap();
    assert_eq!(root.title, "Plans");
    assert_eq!(root.children[0].title, "Budget");
    assert_eq!(root.children[0].pos, [Some(30), Some(15)]);
}

#[tokio::test]
async fn test_list_maps_shows_only_the_callers_maps() {
    let (app, _dir) = app();
    let owner = Uuid::now_v7().to_string();
    let create = |title: &str| {
        Request::builder()
            .method("POST")
            .uri("/maps")
            .header(header::CONTENT_TYPE, "application/json")
            .header(OWNER_HEADER, owner.as_str())
            .body(Body::from(json!({ "title": title }).to_string()))
            .unwrap()
    };
    for title in ["older", "newer"] {
        let (status, _) = send_json(&app, create(title)).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    send_json(&app, json_request("POST", "/maps", json!({ "title": "someone else's" }))).await;

    let list = |uri: &str| {
        Request::builder()
            .uri(uri)
            .header(OWNER_HEADER, owner.as_str())
            .body(Body::empty())
            .unwrap()
    };
    let (status, maps) = send_json(&app, list("/maps")).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = maps.as_array().unwrap().iter().map(|m| m["title"].as_str().unwrap()).collect();
    assert_eq!(titles, vec!["newer", "older"]);

    let (status, maps) = send_json(&app, list("/maps?page=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(maps, json!([]));

    let (status, body) = send_json(&app, list("/maps?page=0")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid");

    let anonymous = Request::builder().uri("/maps").body(Body::empty()).unwrap();
    assert_eq!(send(&app, anonymous).await.0, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_import_then_duplicate() {
    let (app, _dir) = app();

    let (status, map) = send_json(&app, upload("holiday.MIND", sample_archive())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(map["title"], "Holiday");
    assert_eq!(map["layout"], 2);
    let map_id = map["id"].as_str().unwrap().to_string();

    let (status, copy) = send_json(
        &app,
        json_request("POST", &format!("/maps/{map_id}/duplicate"), json!({ "title": "Holiday (copy)" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(copy["id"], map["id"]);

    let (_, view) = send_json(&app, json_request("GET", &format!("/maps/{}", copy["id"].as_str().unwrap()), Value::Null)).await;
    let titles: Vec<&str> = view["nodes"].as_array().unwrap().iter().map(|n| n["title"].as_str().unwrap()).collect();
    assert_eq!(titles, vec!["Holiday", "Flights", "Hotel"]);
    assert_eq!(view["nodes"][2]["note"], "sea view");
}

#[tokio::test]
async fn test_import_rejections() {
    let (app, dir) = app();

    let (status, body) = send_json(&app, upload("holiday.zip", sample_archive())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid");

    let (status, body) = send_json(&app, upload("broken.mind", b"not a zip".to_vec())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_archive");

    let (status, _) = send(&app, upload("huge.mind", vec![0u8; UPLOAD_LIMIT + 1])).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let anonymous = Request::builder()
        .method("POST")
        .uri("/maps/import")
        .header(FILE_NAME_HEADER, "holiday.mind")
        .body(Body::from(sample_archive()))
        .unwrap();
    let (status, body) = send_json(&app, anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let leftovers = std::fs::read_dir(dir.path().join("scratch")).map(|entries| entries.count()).unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_node_title_edits_and_errors() {
    let (app, _dir) = app();
    let (_, created) = send_json(&app, json_request("POST", "/maps", json!({ "title": "Tree" }))).await;
    let map_id = created["map"]["id"].as_str().unwrap().to_string();
    let root_id = created["root"]["id"].as_str().unwrap().to_string();

    let (_, child) = send_json(
        &app,
        json_request("POST", &format!("/maps/{map_id}/nodes"), json!({ "parent_id": root_id, "title": "leaf" })),
    )
    .await;
    let child_uri = format!("/maps/{map_id}/nodes/{}", child["id"].as_str().unwrap());

    let (status, outcome) = send_json(&app, json_request("PUT", &child_uri, json!({ "title": "renamed" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "renamed");
    assert_eq!(outcome["node"]["title"], "renamed");

    let (status, outcome) = send_json(&app, json_request("PUT", &child_uri, json!({ "title": "  " }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "deleted");
    assert_eq!(outcome["removal"]["removed"].as_array().unwrap().len(), 1);

    let (status, body) = send_json(&app, json_request("DELETE", &child_uri, Value::Null)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let root_uri = format!("/maps/{map_id}/nodes/{root_id}");
    let (status, body) = send_json(&app, json_request("DELETE", &root_uri, Value::Null)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid");

    let (status, _) = send_json(&app, json_request("DELETE", &format!("/maps/{map_id}"), Value::Null)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send_json(&app, json_request("GET", &format!("/maps/{map_id}/export"), Value::Null)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send_json(&app, json_request("GET", &format!("/maps/{}", Uuid::now_v7()), Value::Null)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
