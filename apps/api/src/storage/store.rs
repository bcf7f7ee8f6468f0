//! Persistence collaborator — application status, summaries and fill results.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;

use crate::errors::AppError;
use crate::models::application::{ApplicationKey, ApplicationRow, DocumentSummary, FieldStats};

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn update_status(
        &self,
        key: &ApplicationKey,
        status: &str,
        progress: u8,
    ) -> Result<(), AppError>;

    async fn save_document_summaries(
        &self,
        key: &ApplicationKey,
        summaries: &[DocumentSummary],
    ) -> Result<(), AppError>;

    /// Stores the stats and `completion_score = stats.overall.percent_filled`.
    async fn save_field_stats(&self, key: &ApplicationKey, stats: &FieldStats)
        -> Result<(), AppError>;

    async fn save_filled_form_key(
        &self,
        key: &ApplicationKey,
        storage_key: &str,
    ) -> Result<(), AppError>;

    async fn get(&self, key: &ApplicationKey) -> Result<Option<ApplicationRow>, AppError>;
}

/// PostgreSQL-backed store. Every write is an upsert on `(user_id, application_id)`.
#[derive(Clone)]
pub struct PgApplicationStore {
    pool: PgPool,
}

impl PgApplicationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApplicationStore for PgApplicationStore {
    async fn update_status(
        &self,
        key: &ApplicationKey,
        status: &str,
        progress: u8,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO applications (user_id, application_id, processing_status, progress)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, application_id) DO UPDATE
            SET processing_status = EXCLUDED.processing_status,
                progress = EXCLUDED.progress,
                updated_at = now()
            "#,
        )
        .bind(key.user_id)
        .bind(key.application_id)
        .bind(status)
        .bind(i32::from(progress))
        .execute(&self.pool)
        .await?;
        debug!("Application {key}: {status} ({progress}%)");
        Ok(())
    }

    async fn save_document_summaries(
        &self,
        key: &ApplicationKey,
        summaries: &[DocumentSummary],
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO applications (user_id, application_id, document_summaries)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, application_id) DO UPDATE
            SET document_summaries = EXCLUDED.document_summaries,
                updated_at = now()
            "#,
        )
        .bind(key.user_id)
        .bind(key.application_id)
        .bind(Json(summaries))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_field_stats(
        &self,
        key: &ApplicationKey,
        stats: &FieldStats,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO applications (user_id, application_id, field_stats, completion_score)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, application_id) DO UPDATE
            SET field_stats = EXCLUDED.field_stats,
                completion_score = EXCLUDED.completion_score,
                updated_at = now()
            "#,
        )
        .bind(key.user_id)
        .bind(key.application_id)
        .bind(Json(stats))
        .bind(stats.completion_score())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_filled_form_key(
        &self,
        key: &ApplicationKey,
        storage_key: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO applications (user_id, application_id, filled_form_key)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, application_id) DO UPDATE
            SET filled_form_key = EXCLUDED.filled_form_key,
                updated_at = now()
            "#,
        )
        .bind(key.user_id)
        .bind(key.application_id)
        .bind(storage_key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, key: &ApplicationKey) -> Result<Option<ApplicationRow>, AppError> {
        Ok(sqlx::query_as::<_, ApplicationRow>(
            "SELECT * FROM applications WHERE user_id = $1 AND application_id = $2",
        )
        .bind(key.user_id)
        .bind(key.application_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[cfg(test)]
pub mod memory {
    use chrono::Utc;
    use dashmap::DashMap;

    use super::*;

    /// In-memory store for tests. Records every status write in order.
    #[derive(Default)]
    pub struct InMemoryApplicationStore {
        rows: DashMap<ApplicationKey, ApplicationRow>,
        pub history: std::sync::Mutex<Vec<(String, u8)>>,
    }

    impl InMemoryApplicationStore {
        fn upsert(&self, key: &ApplicationKey, update: impl FnOnce(&mut ApplicationRow)) {
            let now = Utc::now();
            let mut row = self.rows.entry(*key).or_insert_with(|| ApplicationRow {
                user_id: key.user_id,
                application_id: key.application_id,
                processing_status: "pending".to_string(),
                progress: 0,
                document_summaries: serde_json::Value::Array(Vec::new()),
                field_stats: None,
                completion_score: None,
                filled_form_key: None,
                created_at: now,
                updated_at: now,
            });
            update(row.value_mut());
            row.updated_at = now;
        }

        pub fn statuses(&self) -> Vec<(String, u8)> {
            self.history.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ApplicationStore for InMemoryApplicationStore {
        async fn update_status(
            &self,
            key: &ApplicationKey,
            status: &str,
            progress: u8,
        ) -> Result<(), AppError> {
            self.history
                .lock()
                .unwrap()
                .push((status.to_string(), progress));
            self.upsert(key, |row| {
                row.processing_status = status.to_string();
                row.progress = i32::from(progress);
            });
            Ok(())
        }

        async fn save_document_summaries(
            &self,
            key: &ApplicationKey,
            summaries: &[DocumentSummary],
        ) -> Result<(), AppError> {
            let value = serde_json::to_value(summaries).map_err(anyhow::Error::from)?;
            self.upsert(key, |row| row.document_summaries = value);
            Ok(())
        }

        async fn save_field_stats(
            &self,
            key: &ApplicationKey,
            stats: &FieldStats,
        ) -> Result<(), AppError> {
            let value = serde_json::to_value(stats).map_err(anyhow::Error::from)?;
            self.upsert(key, |row| {
                row.field_stats = Some(value);
                row.completion_score = Some(stats.completion_score());
            });
            Ok(())
        }

        async fn save_filled_form_key(
            &self,
            key: &ApplicationKey,
            storage_key: &str,
        ) -> Result<(), AppError> {
            self.upsert(key, |row| row.filled_form_key = Some(storage_key.to_string()));
            Ok(())
        }

        async fn get(&self, key: &ApplicationKey) -> Result<Option<ApplicationRow>, AppError> {
            Ok(self.rows.get(key).map(|row| row.clone()))
        }
    }
}
