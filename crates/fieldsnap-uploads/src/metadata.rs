//! Metadata recorder: one `site_photos` row per transferred photo
//!
//! The row is written after the object store accepted the bytes. The two
//! writes are independent; a failed insert leaves a stored but unindexed
//! object, which the pipeline reports on the item rather than undoing.

use crate::config::DatabaseConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldsnap_common::types::{Category, SiteKey};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

#[async_trait]
pub trait MetadataRecorder: Send + Sync {
    async fn insert(&self, site_key: &SiteKey, url: &str, category: &Category) -> Result<()>;
}

/// Indexed photo (maps to the site_photos table)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SitePhoto {
    pub id: Uuid,
    pub site_key: String,
    pub url: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PgMetadataRecorder {
    pool: PgPool,
}

impl PgMetadataRecorder {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .context("Failed to connect to metadata database")?;

        info!(max_connections = config.max_connections, "Metadata database pool ready");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run site_photos migrations")?;
        Ok(())
    }

    /// Photos indexed for a site, oldest first
    pub async fn photos_for_site(&self, site_key: &SiteKey) -> Result<Vec<SitePhoto>> {
        sqlx::query_as::<_, SitePhoto>(
            r#"
            SELECT id, site_key, url, category, created_at
            FROM site_photos
            WHERE site_key = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(site_key.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list site photos")
    }
}

#[async_trait]
impl MetadataRecorder for PgMetadataRecorder {
    #[instrument(skip(self))]
    async fn insert(&self, site_key: &SiteKey, url: &str, category: &Category) -> Result<()> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO site_photos (id, site_key, url, category)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id)
        .bind(site_key.as_str())
        .bind(url)
        .bind(category.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to insert site photo row")?;

        debug!(photo_id = %id, "Recorded site photo");

        Ok(())
    }
}
