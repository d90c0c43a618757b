use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AuditEntry, AuditEntryId, AuditLogError, AuditLogType, AuditQuery, Result, TargetType,
    store::{AuditLogStore, EntryStream},
};

/// PostgreSQL `insufficient_privilege` error code.
const INSUFFICIENT_PRIVILEGE: &str = "42501";

const SELECT_COLUMNS: &str = "SELECT id, log_type, actor_id, actor_name, target_type, target_id, target_name, before_state, after_state, changed_fields, metadata, created_at FROM audit_logs";

/// PostgreSQL-backed audit trail.
#[derive(Clone)]
pub struct PostgresAuditLogStore {
    pool: PgPool,
}

impl PostgresAuditLogStore {
    /// Creates a new PostgreSQL audit store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_entry(row: PgRow) -> Result<AuditEntry> {
        let log_type: String = row.try_get("log_type")?;
        let target_type: String = row.try_get("target_type")?;
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        Ok(AuditEntry {
            id: AuditEntryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            log_type: AuditLogType::parse(&log_type)
                .ok_or_else(|| AuditLogError::InvalidRow(format!("unknown log type {log_type}")))?,
            actor_id: row.try_get("actor_id")?,
            actor_name: row.try_get("actor_name")?,
            target_type: TargetType::parse(&target_type).ok_or_else(|| {
                AuditLogError::InvalidRow(format!("unknown target type {target_type}"))
            })?,
            target_id: row.try_get("target_id")?,
            target_name: row.try_get("target_name")?,
            before: row.try_get("before_state")?,
            after: row.try_get("after_state")?,
            changed_fields: row.try_get("changed_fields")?,
            metadata,
            created_at: row.try_get("created_at")?,
        })
    }

    fn map_write_error(e: sqlx::Error) -> AuditLogError {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.code().as_deref() == Some(INSUFFICIENT_PRIVILEGE)
        {
            return AuditLogError::PermissionDenied(db_err.message().to_string());
        }
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                AuditLogError::Unavailable(e.to_string())
            }
            other => AuditLogError::Database(other),
        }
    }
}

#[async_trait]
impl AuditLogStore for PostgresAuditLogStore {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        let metadata_json = serde_json::to_value(&entry.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, log_type, actor_id, actor_name, target_type, target_id, target_name, before_state, after_state, changed_fields, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.log_type.as_str())
        .bind(&entry.actor_id)
        .bind(&entry.actor_name)
        .bind(entry.target_type.as_str())
        .bind(&entry.target_id)
        .bind(&entry.target_name)
        .bind(&entry.before)
        .bind(&entry.after)
        .bind(&entry.changed_fields)
        .bind(metadata_json)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(Self::map_write_error)?;

        Ok(())
    }

    async fn query(&self, query: AuditQuery) -> Result<Vec<AuditEntry>> {
        let mut sql = format!("{SELECT_COLUMNS} WHERE 1=1");
        let mut param_count = 0;

        if query.target_type.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND target_type = ${param_count}"));
        }
        if query.target_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND target_id = ${param_count}"));
        }
        if query.log_types.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND log_type = ANY(${param_count})"));
        }
        if query.actor_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND actor_id = ${param_count}"));
        }
        if query.from_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at >= ${param_count}"));
        }
        if query.to_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at <= ${param_count}"));
        }

        sql.push_str(" ORDER BY created_at ASC, seq ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(target_type) = query.target_type {
            sqlx_query = sqlx_query.bind(target_type.as_str());
        }
        if let Some(target_id) = query.target_id {
            sqlx_query = sqlx_query.bind(target_id);
        }
        if let Some(log_types) = query.log_types {
            let names: Vec<String> = log_types.iter().map(|t| t.as_str().to_string()).collect();
            sqlx_query = sqlx_query.bind(names);
        }
        if let Some(actor_id) = query.actor_id {
            sqlx_query = sqlx_query.bind(actor_id);
        }
        if let Some(from_ts) = query.from_timestamp {
            sqlx_query = sqlx_query.bind(from_ts);
        }
        if let Some(to_ts) = query.to_timestamp {
            sqlx_query = sqlx_query.bind(to_ts);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(page_value(limit));
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(page_value(offset));
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn stream_all(&self) -> Result<EntryStream> {
        use futures_util::stream;

        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY created_at ASC, seq ASC"))
            .fetch_all(&self.pool)
            .await?;

        let entries: Vec<Result<AuditEntry>> = rows.into_iter().map(Self::row_to_entry).collect();
        Ok(Box::pin(stream::iter(entries)))
    }
}

/// LIMIT/OFFSET binding, saturating at the largest BIGINT.
fn page_value(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_value_saturates() {
        assert_eq!(page_value(25), 25);
        assert_eq!(page_value(usize::MAX), i64::MAX);
    }
}
