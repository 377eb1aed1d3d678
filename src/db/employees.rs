use async_trait::async_trait;
use sqlx::Row;
use tracing::{info, warn};

use super::{Database, RecordStore, RecordStoreError};
use crate::models::{AttachmentPointer, EmployeeId};

#[async_trait]
impl RecordStore for Database {
    async fn exists(&self, id: &EmployeeId) -> Result<bool, RecordStoreError> {
        self.with_retry(|| async {
            let row = sqlx::query(r#"SELECT EXISTS(SELECT 1 FROM employees WHERE dpi = $1) AS present"#)
                .bind(id.as_str())
                .fetch_one(&self.pool)
                .await?;

            Ok(row.get("present"))
        })
        .await
    }

    async fn get_pointer(&self, id: &EmployeeId) -> Result<Option<AttachmentPointer>, RecordStoreError> {
        self.with_retry(|| async {
            let row = sqlx::query(r#"SELECT foto, foto_blob FROM employees WHERE dpi = $1"#)
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;

            Ok(row.map(|row| {
                AttachmentPointer::from_columns(
                    row.get::<Option<String>, _>("foto"),
                    row.get::<Option<Vec<u8>>, _>("foto_blob"),
                )
            }))
        })
        .await
    }

    async fn set_pointer(&self, id: &EmployeeId, pointer: &AttachmentPointer) -> Result<(), RecordStoreError> {
        let (foto, foto_blob) = pointer.to_columns();

        self.with_retry(|| async {
            let result = sqlx::query(
                r#"UPDATE employees
                   SET foto = $2, foto_blob = $3, updated_at = NOW()
                   WHERE dpi = $1"#,
            )
            .bind(id.as_str())
            .bind(&foto)
            .bind(&foto_blob)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(RecordStoreError::RecordNotFound(id.clone()));
            }
            Ok(())
        })
        .await
    }

    async fn rename(&self, old_id: &EmployeeId, new_id: &EmployeeId) -> Result<(), RecordStoreError> {
        if old_id == new_id {
            return match self.exists(old_id).await? {
                true => Ok(()),
                false => Err(RecordStoreError::RecordNotFound(old_id.clone())),
            };
        }

        self.with_retry(|| async {
            let mut tx = self.pool.begin().await?;

            let target_taken: bool = sqlx::query(r#"SELECT EXISTS(SELECT 1 FROM employees WHERE dpi = $1) AS present"#)
                .bind(new_id.as_str())
                .fetch_one(&mut *tx)
                .await?
                .get("present");
            if target_taken {
                return Err(RecordStoreError::TargetExists(new_id.clone()));
            }

            let result = sqlx::query(r#"UPDATE employees SET dpi = $2, updated_at = NOW() WHERE dpi = $1"#)
                .bind(old_id.as_str())
                .bind(new_id.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| match &e {
                    // Lost a race with a concurrent insert of the target id
                    sqlx::Error::Database(db) if db.is_unique_violation() => {
                        RecordStoreError::TargetExists(new_id.clone())
                    }
                    _ => e.into(),
                })?;

            if result.rows_affected() == 0 {
                return Err(RecordStoreError::RecordNotFound(old_id.clone()));
            }

            tx.commit().await?;
            info!("Renamed employee {} to {}", old_id, new_id);
            Ok(())
        })
        .await
    }

    async fn references_key(&self, key: &str) -> Result<bool, RecordStoreError> {
        self.with_retry(|| async {
            // Same matching as AttachmentPointer::references_key, over every stored form.
            // No LIKE: `_` is a wildcard there and appears in every key
            let row = sqlx::query(
                r#"SELECT EXISTS(
                       SELECT 1 FROM employees
                       WHERE foto = 'file:' || $1
                          OR foto = $1
                          OR starts_with(foto, 's3:' || $1 || '|')
                          OR right(foto, length($1) + 1) = '/' || $1
                   ) AS referenced"#,
            )
            .bind(key)
            .fetch_one(&self.pool)
            .await?;

            Ok(row.get("referenced"))
        })
        .await
    }

    async fn list_employee_ids(&self) -> Result<Vec<EmployeeId>, RecordStoreError> {
        self.with_retry(|| async {
            let rows = sqlx::query(r#"SELECT dpi FROM employees ORDER BY dpi"#)
                .fetch_all(&self.pool)
                .await?;

            let mut ids = Vec::with_capacity(rows.len());
            for row in rows {
                let raw: String = row.get("dpi");
                match EmployeeId::parse(&raw) {
                    Ok(id) => ids.push(id),
                    Err(e) => warn!("Skipping employee with unusable identifier {:?}: {}", raw, e),
                }
            }
            Ok(ids)
        })
        .await
    }
}
