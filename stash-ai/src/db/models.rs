//! Model, file usage and stored file queries

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};
use std::collections::BTreeMap;
use uuid::Uuid;

use stash_common::{Error, Result};

use crate::models::{FileUsage, Model, StoredFile};

fn parse_model_row(row: &sqlx::sqlite::SqliteRow) -> Result<Model> {
    let id_str: String = row.get("id");
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))?;

    let metadata_json: String = row.get("metadata");
    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)
        .map_err(|e| Error::Internal(format!("Invalid metadata JSON for {}: {}", id, e)))?;

    let date_added_str: String = row.get("date_added");
    let date_added = DateTime::parse_from_rfc3339(&date_added_str)
        .map_err(|e| Error::Internal(format!("Invalid date_added for {}: {}", id, e)))?
        .with_timezone(&Utc);

    let delete_pending: i64 = row.get("delete_pending");

    Ok(Model {
        id,
        name: row.get("name"),
        hash: row.get("hash"),
        files: Vec::new(),
        delete_pending: delete_pending != 0,
        metadata,
        date_added,
    })
}

async fn load_file_usages(conn: &mut SqliteConnection, model_id: Uuid) -> Result<Vec<FileUsage>> {
    let rows = sqlx::query(
        r#"
        SELECT u.filename, u.file_hash, f.size
        FROM file_usages u
        JOIN stored_files f ON f.hash = u.file_hash
        WHERE u.model_id = ?
        ORDER BY u.filename
        "#,
    )
    .bind(model_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let size: i64 = row.get("size");
            FileUsage {
                filename: row.get("filename"),
                file: StoredFile::new(row.get::<String, _>("file_hash"), size.max(0) as u64),
            }
        })
        .collect())
}

async fn with_files(conn: &mut SqliteConnection, mut model: Model) -> Result<Model> {
    model.files = load_file_usages(conn, model.id).await?;
    Ok(model)
}

/// Load a model (with file usages) by id
pub async fn load_model(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Model>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, hash, delete_pending, metadata, date_added
        FROM models
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(Some(with_files(conn, parse_model_row(&row)?).await?)),
        None => Ok(None),
    }
}

/// Find the record to deduplicate against for `hash`.
///
/// Soft-deleted records sort last so an active record always wins over a
/// ghost; among soft-deleted ones the one deleted longest ago wins.
pub async fn find_by_hash(conn: &mut SqliteConnection, hash: &str) -> Result<Option<Model>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, hash, delete_pending, metadata, date_added
        FROM models
        WHERE hash = ?
        ORDER BY delete_pending ASC, updated_at ASC, date_added ASC
        LIMIT 1
        "#,
    )
    .bind(hash)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(Some(with_files(conn, parse_model_row(&row)?).await?)),
        None => Ok(None),
    }
}

/// Register blobs (idempotent)
pub async fn register_stored_files(conn: &mut SqliteConnection, files: &[&StoredFile]) -> Result<()> {
    for file in files {
        sqlx::query("INSERT OR IGNORE INTO stored_files (hash, size) VALUES (?, ?)")
            .bind(&file.hash)
            .bind(file.size as i64)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Insert a model with its file usages, registering any blobs not yet known
pub async fn insert_model(conn: &mut SqliteConnection, model: &Model) -> Result<()> {
    let metadata = serde_json::to_string(&model.metadata)
        .map_err(|e| Error::Internal(format!("Failed to serialize metadata: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO models (id, name, hash, delete_pending, metadata, date_added, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, strftime('%Y-%m-%d %H:%M:%f', 'now'))
        "#,
    )
    .bind(model.id.to_string())
    .bind(&model.name)
    .bind(&model.hash)
    .bind(model.delete_pending as i64)
    .bind(metadata)
    .bind(model.date_added.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    let files: Vec<&StoredFile> = model.files.iter().map(|u| &u.file).collect();
    register_stored_files(&mut *conn, &files).await?;

    for usage in &model.files {
        sqlx::query("INSERT INTO file_usages (model_id, filename, file_hash) VALUES (?, ?, ?)")
            .bind(model.id.to_string())
            .bind(&usage.filename)
            .bind(&usage.file.hash)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Flip the soft-delete flag. Returns false if no such model exists.
pub async fn set_delete_pending(conn: &mut SqliteConnection, id: Uuid, pending: bool) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE models SET delete_pending = ?, updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now') WHERE id = ?",
    )
    .bind(pending as i64)
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Count models, optionally including soft-deleted ones
pub async fn count_models(conn: &mut SqliteConnection, include_deleted: bool) -> Result<i64> {
    let sql = if include_deleted {
        "SELECT COUNT(*) FROM models"
    } else {
        "SELECT COUNT(*) FROM models WHERE delete_pending = 0"
    };
    let count: i64 = sqlx::query_scalar(sql).fetch_one(&mut *conn).await?;
    Ok(count)
}

/// Load every model, oldest first
pub async fn load_all_models(conn: &mut SqliteConnection, include_deleted: bool) -> Result<Vec<Model>> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, hash, delete_pending, metadata, date_added
        FROM models
        WHERE ? OR delete_pending = 0
        ORDER BY date_added, name
        "#,
    )
    .bind(include_deleted)
    .fetch_all(&mut *conn)
    .await?;

    let mut models = Vec::with_capacity(rows.len());
    for row in rows {
        models.push(with_files(conn, parse_model_row(&row)?).await?);
    }
    Ok(models)
}

/// Number of registered blobs
pub async fn count_stored_files(conn: &mut SqliteConnection) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stored_files")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}
