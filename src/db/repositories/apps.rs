use anyhow::{anyhow, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::Database;
use crate::icons::IconSource;

pub struct AppRepository<'a> {
    conn: &'a Connection,
}

impl<'a> AppRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Upsert the icon for an app (base64 PNG, `None` clears it).
    pub fn store_icon(&self, app_id: &str, icon_base64: Option<&str>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO apps (app_id, icon_base64, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(app_id) DO UPDATE SET
                 icon_base64 = excluded.icon_base64,
                 updated_at = excluded.updated_at",
            params![app_id, icon_base64, now],
        )?;
        Ok(())
    }

    /// Stored icon, `None` for unknown apps and apps without one.
    pub fn icon(&self, app_id: &str) -> Result<Option<String>> {
        let icon = self
            .conn
            .query_row(
                "SELECT icon_base64 FROM apps WHERE app_id = ?1",
                params![app_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten();
        Ok(icon)
    }
}

// Database async wrappers for app operations
impl Database {
    pub async fn store_app_icon(&self, app_id: &str, icon_base64: Option<&str>) -> Result<()> {
        let app_id = app_id.to_string();
        let icon_base64 = icon_base64.map(String::from);

        self.execute(move |conn| {
            AppRepository::new(conn).store_icon(&app_id, icon_base64.as_deref())
        })
        .await
    }
}

impl IconSource for Database {
    async fn fetch_icon(&self, app_id: &str) -> Result<String> {
        let lookup_id = app_id.to_string();
        self.execute(move |conn| AppRepository::new(conn).icon(&lookup_id))
            .await?
            .ok_or_else(|| anyhow!("no icon stored for {app_id}"))
    }
}
