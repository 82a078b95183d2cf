//! # SQLite repository
//!
//! Maps between the relational `maps`/`nodes` tables and the domain models.
//! Opaque JSON documents live in TEXT columns; UUIDs are stored as BLOBs.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::Utc;
use domains::{
    MapMetadata, MapPatch, MapRepository, MapUnitOfWork, MindMap, NewMap, NewNode, Node, NodeContent,
    NodePatch,
};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use tracing::info;
use uuid::Uuid;

const MAP_COLUMNS: &str =
    "id, owner_id, title, map_version, layout, theme, metadata, created_at, updated_at";

const NODE_COLUMNS: &str = r#"id, map_id, parent_id, title, "rank", pos_x, pos_y, icon, style, note, link,
    task_data, external_task, attachments, image, boundary, video, properties, created_at, updated_at"#;

#[derive(Debug, Clone)]
pub struct SqliteMapRepo {
    pool: SqlitePool,
}

impl SqliteMapRepo {
    /// Opens (creating if needed) the database and applies pending migrations.
    ///
    /// An in-memory URL is pinned to a single long-lived connection, since every
    /// new connection would otherwise see its own empty database.
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| "invalid sqlite url")?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .acquire_timeout(Duration::from_secs(5))
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(max_connections.max(1))
                .connect_with(options)
                .await?
        };

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(in_memory, "sqlite map repository ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn json_text(value: &Option<Value>) -> anyhow::Result<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(Into::into)
}

fn json_value(text: Option<String>) -> anyhow::Result<Option<Value>> {
    text.as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(Into::into)
}

fn map_from_row(row: &SqliteRow) -> anyhow::Result<MindMap> {
    let metadata: String = row.try_get("metadata")?;
    Ok(MindMap {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        title: row.try_get("title")?,
        map_version: row.try_get("map_version")?,
        layout: row.try_get("layout")?,
        theme: json_value(row.try_get("theme")?)?,
        metadata: serde_json::from_str::<MapMetadata>(&metadata)
            .with_context(|| "stored map metadata is not valid JSON")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn node_from_row(row: &SqliteRow) -> anyhow::Result<Node> {
    Ok(Node {
        id: row.try_get("id")?,
        map_id: row.try_get("map_id")?,
        parent_id: row.try_get("parent_id")?,
        title: row.try_get("title")?,
        rank: row.try_get("rank")?,
        pos_x: row.try_get("pos_x")?,
        pos_y: row.try_get("pos_y")?,
        content: NodeContent {
            icon: row.try_get("icon")?,
            style: json_value(row.try_get("style")?)?,
            note: row.try_get("note")?,
            link: row.try_get("link")?,
            task_data: json_value(row.try_get("task_data")?)?,
            external_task: json_value(row.try_get("external_task")?)?,
            attachments: json_value(row.try_get("attachments")?)?,
            image: json_value(row.try_get("image")?)?,
            boundary: json_value(row.try_get("boundary")?)?,
            video: json_value(row.try_get("video")?)?,
            properties: json_value(row.try_get("properties")?)?,
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl MapRepository for SqliteMapRepo {
    async fn find_map(&self, id: Uuid) -> anyhow::Result<Option<MindMap>> {
        let row = sqlx::query(&format!("SELECT {MAP_COLUMNS} FROM maps WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_from_row).transpose()
    }

    async fn list_maps(&self, owner_id: Uuid, limit: i64, offset: i64) -> anyhow::Result<Vec<MindMap>> {
        sqlx::query(&format!(
            "SELECT {MAP_COLUMNS} FROM maps WHERE owner_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?"
        ))
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(map_from_row)
        .collect()
    }

    async fn load_root(&self, map_id: Uuid) -> anyhow::Result<Option<Node>> {
        let row = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE map_id = ? AND parent_id IS NULL ORDER BY rowid LIMIT 1"
        ))
        .bind(map_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(node_from_row).transpose()
    }

    async fn load_nodes(&self, map_id: Uuid) -> anyhow::Result<Vec<Node>> {
        sqlx::query(&format!(
            r#"SELECT {NODE_COLUMNS} FROM nodes WHERE map_id = ? ORDER BY "rank", rowid"#
        ))
        .bind(map_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(node_from_row)
        .collect()
    }

    async fn find_node(&self, map_id: Uuid, node_id: Uuid) -> anyhow::Result<Option<Node>> {
        let row = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE id = ? AND map_id = ?"
        ))
        .bind(node_id)
        .bind(map_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(node_from_row).transpose()
    }

    async fn begin(&self) -> anyhow::Result<Box<dyn MapUnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteUnit { tx }))
    }
}

/// One SQLite transaction. Dropping it rolls back.
struct SqliteUnit {
    tx: Transaction<'static, Sqlite>,
}

impl SqliteUnit {
    /// The foreign key only proves the parent exists; it must also share the map.
    async fn check_parent(&mut self, map_id: Uuid, parent_id: Uuid) -> anyhow::Result<()> {
        let parent_map: Option<Uuid> = sqlx::query_scalar("SELECT map_id FROM nodes WHERE id = ?")
            .bind(parent_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        match parent_map {
            None => Err(anyhow!("parent node {parent_id} does not exist")),
            Some(owner) if owner != map_id => Err(anyhow!("parent node {parent_id} belongs to another map")),
            Some(_) => Ok(()),
        }
    }
}

#[async_trait]
impl MapUnitOfWork for SqliteUnit {
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

        sqlx::query(&format!(
            "INSERT INTO maps ({MAP_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(created.id)
        .bind(created.owner_id)
        .bind(&created.title)
        .bind(&created.map_version)
        .bind(created.layout)
        .bind(json_text(&created.theme)?)
        .bind(serde_json::to_string(&created.metadata)?)
        .bind(created.created_at)
        .bind(created.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(created)
    }

    async fn update_map(&mut self, id: Uuid, patch: MapPatch) -> anyhow::Result<()> {
        let result = sqlx::query("UPDATE maps SET title = COALESCE(?, title), updated_at = ? WHERE id = ?")
            .bind(patch.title)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("map {id} does not exist"));
        }
        Ok(())
    }

    async fn delete_map(&mut self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM maps WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn create_node(&mut self, node: NewNode) -> anyhow::Result<Node> {
        if let Some(parent_id) = node.parent_id {
            self.check_parent(node.map_id, parent_id).await?;
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
        let content = &created.content;

        sqlx::query(&format!(
            "INSERT INTO nodes ({NODE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(created.id)
        .bind(created.map_id)
        .bind(created.parent_id)
        .bind(&created.title)
        .bind(created.rank)
        .bind(created.pos_x)
        .bind(created.pos_y)
        .bind(&content.icon)
        .bind(json_text(&content.style)?)
        .bind(&content.note)
        .bind(&content.link)
        .bind(json_text(&content.task_data)?)
        .bind(json_text(&content.external_task)?)
        .bind(json_text(&content.attachments)?)
        .bind(json_text(&content.image)?)
        .bind(json_text(&content.boundary)?)
        .bind(json_text(&content.video)?)
        .bind(json_text(&content.properties)?)
        .bind(created.created_at)
        .bind(created.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(created)
    }

    async fn update_node(&mut self, id: Uuid, patch: NodePatch) -> anyhow::Result<()> {
        let row = sqlx::query(&format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| anyhow!("node {id} does not exist"))?;
        let mut node = node_from_row(&row)?;
        if let Some(Some(parent_id)) = patch.parent_id {
            self.check_parent(node.map_id, parent_id).await?;
        }
        patch.apply_to(&mut node);

        sqlx::query(
            r#"UPDATE nodes SET parent_id = ?, title = ?, "rank" = ?, pos_x = ?, pos_y = ?, updated_at = ? WHERE id = ?"#,
        )
        .bind(node.parent_id)
        .bind(&node.title)
        .bind(node.rank)
        .bind(node.pos_x)
        .bind(node.pos_y)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_node(&mut self, id: Uuid) -> anyhow::Result<u64> {
        // The cascade removes descendants without reporting them; count first.
        let removed: i64 = sqlx::query_scalar(
            "WITH RECURSIVE subtree(id) AS (
                SELECT id FROM nodes WHERE id = ?
                UNION
                SELECT n.id FROM nodes n JOIN subtree s ON n.parent_id = s.id
            )
            SELECT COUNT(*) FROM subtree",
        )
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await?;

        sqlx::query("DELETE FROM nodes WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(u64::try_from(removed)?)
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
