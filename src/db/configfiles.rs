use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};

use crate::models::*;

use super::row_helpers::map_configfile_row;

const SELECT_CONFIGFILE: &str = r#"
    SELECT id, name, device, parent_id, text, firmware, cvc, public,
           created_at, updated_at, deleted_at
    FROM configfiles
"#;

fn device_str(device: Option<DeviceClass>) -> &'static str {
    device.map(|d| d.as_str()).unwrap_or("")
}

/// Configfile database operations
pub struct ConfigfileRepo;

impl ConfigfileRepo {
    /// Live configfiles, oldest first
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Configfile>> {
        let rows = sqlx::query(&format!("{} WHERE deleted_at IS NULL ORDER BY id", SELECT_CONFIGFILE))
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_configfile_row).collect())
    }

    /// Every configfile including soft-deleted ones
    pub async fn list_with_trashed(pool: &Pool<Sqlite>) -> Result<Vec<Configfile>> {
        let rows = sqlx::query(&format!("{} ORDER BY id", SELECT_CONFIGFILE))
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_configfile_row).collect())
    }

    /// Get a configfile by id, soft-deleted or not
    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Configfile>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_CONFIGFILE))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_configfile_row))
    }

    /// Highest id ever assigned, soft-deleted rows included
    pub async fn max_id(pool: &Pool<Sqlite>) -> Result<Option<i64>> {
        let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(id) FROM configfiles")
            .fetch_one(pool)
            .await?;
        Ok(row.0)
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateConfigfileRequest) -> Result<Configfile> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO configfiles (name, device, parent_id, text, firmware, cvc, public, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(req.name.trim())
        .bind(device_str(req.device))
        .bind(req.parent_id)
        .bind(&req.text)
        .bind(&req.firmware)
        .bind(&req.cvc)
        .bind(req.public as i32)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        let id = result.last_insert_rowid();
        Self::get(pool, id)
            .await?
            .context("Configfile not found after creation")
    }

    /// Insert a configfile under a caller-chosen id
    pub async fn insert_with_id(conn: &mut SqliteConnection, id: i64, req: &CreateConfigfileRequest) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO configfiles (id, name, device, parent_id, text, firmware, cvc, public, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(req.name.trim())
        .bind(device_str(req.device))
        .bind(req.parent_id)
        .bind(&req.text)
        .bind(&req.firmware)
        .bind(&req.cvc)
        .bind(req.public as i32)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("Failed to insert configfile {}", id))?;

        Ok(())
    }

    /// Insert a batch of configfiles with preassigned ids in one transaction
    pub async fn insert_many(pool: &Pool<Sqlite>, nodes: &[(i64, CreateConfigfileRequest)]) -> Result<()> {
        let mut tx = pool.begin().await?;
        for (id, req) in nodes {
            Self::insert_with_id(&mut tx, *id, req).await?;
        }
        tx.commit().await.context("Failed to commit configfile import")?;
        Ok(())
    }

    pub async fn update(pool: &Pool<Sqlite>, id: i64, req: &CreateConfigfileRequest) -> Result<Configfile> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE configfiles SET name = ?, device = ?, parent_id = ?, text = ?, firmware = ?, cvc = ?,
                                   public = ?, updated_at = ?
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(req.name.trim())
        .bind(device_str(req.device))
        .bind(req.parent_id)
        .bind(&req.text)
        .bind(&req.firmware)
        .bind(&req.cvc)
        .bind(req.public as i32)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Configfile", &id.to_string()).into());
        }

        Self::get(pool, id)
            .await?
            .context("Configfile not found after update")
    }

    /// Set the device class of the given configfiles in one transaction
    pub async fn set_device(pool: &Pool<Sqlite>, ids: &[i64], device: Option<DeviceClass>) -> Result<()> {
        let now = Utc::now();
        let mut tx = pool.begin().await?;
        for id in ids {
            sqlx::query("UPDATE configfiles SET device = ?, updated_at = ? WHERE id = ?")
                .bind(device_str(device))
                .bind(now)
                .bind(*id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn soft_delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE configfiles SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Configfile", &id.to_string()).into());
        }
        Ok(())
    }

    pub async fn restore(pool: &Pool<Sqlite>, id: i64) -> Result<Configfile> {
        let result = sqlx::query("UPDATE configfiles SET deleted_at = NULL, updated_at = ? WHERE id = ? AND deleted_at IS NOT NULL")
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Deleted configfile", &id.to_string()).into());
        }

        Self::get(pool, id)
            .await?
            .context("Configfile not found after restore")
    }
}
