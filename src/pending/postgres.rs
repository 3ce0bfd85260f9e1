//! PostgreSQL pending action backend
//!
//! The conditional update is a single `UPDATE ... WHERE id = $1 AND status = $2`,
//! so concurrent resolvers across processes still have one winner.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::PendingStoreError;

use super::store::PendingActionBackend;
use super::{ActionStatus, ActionType, PendingAction, PendingFilter, ResumeToken};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS dispatch_pending_actions (
    id UUID PRIMARY KEY,
    session_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    user_role TEXT NOT NULL DEFAULT '',
    action_type TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    params JSONB NOT NULL DEFAULT '{}'::jsonb,
    confirmation_message TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL,
    resolved_at TIMESTAMPTZ,
    resolved_by TEXT,
    resolution_note TEXT,
    executed_at TIMESTAMPTZ,
    resume JSONB
);
CREATE INDEX IF NOT EXISTS idx_dispatch_pending_session
    ON dispatch_pending_actions (session_id, status, created_at DESC);
"#;

const COLUMNS: &str = "id, session_id, user_id, user_role, action_type, tool_name, params, \
     confirmation_message, status, created_at, expires_at, resolved_at, resolved_by, \
     resolution_note, executed_at, resume";

#[derive(Debug, Clone, FromRow)]
struct PendingActionRow {
    id: Uuid,
    session_id: String,
    user_id: String,
    user_role: String,
    action_type: String,
    tool_name: String,
    params: JsonValue,
    confirmation_message: String,
    status: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<String>,
    resolution_note: Option<String>,
    executed_at: Option<DateTime<Utc>>,
    resume: Option<JsonValue>,
}

impl TryFrom<PendingActionRow> for PendingAction {
    type Error = PendingStoreError;

    fn try_from(row: PendingActionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<ActionStatus>()
            .map_err(PendingStoreError::Backend)?;
        let action_type = row
            .action_type
            .parse::<ActionType>()
            .map_err(PendingStoreError::Backend)?;
        let resume = row
            .resume
            .map(serde_json::from_value::<ResumeToken>)
            .transpose()?;

        Ok(PendingAction {
            id: row.id,
            session_id: row.session_id,
            user_id: row.user_id,
            user_role: row.user_role,
            action_type,
            tool_name: row.tool_name,
            params: row.params,
            confirmation_message: row.confirmation_message,
            status,
            created_at: row.created_at,
            expires_at: row.expires_at,
            resolved_at: row.resolved_at,
            resolved_by: row.resolved_by,
            resolution_note: row.resolution_note,
            executed_at: row.executed_at,
            resume,
        })
    }
}

pub struct PostgresPendingBackend {
    pool: PgPool,
}

impl PostgresPendingBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, PendingStoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Create the table and index if they do not exist
    pub async fn ensure_schema(&self) -> Result<(), PendingStoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl PendingActionBackend for PostgresPendingBackend {
    async fn insert(&self, action: &PendingAction) -> Result<(), PendingStoreError> {
        let resume = action.resume.as_ref().map(serde_json::to_value).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO dispatch_pending_actions
                (id, session_id, user_id, user_role, action_type, tool_name, params,
                 confirmation_message, status, created_at, expires_at, resolved_at,
                 resolved_by, resolution_note, executed_at, resume)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(action.id)
        .bind(&action.session_id)
        .bind(&action.user_id)
        .bind(&action.user_role)
        .bind(action.action_type.as_str())
        .bind(&action.tool_name)
        .bind(&action.params)
        .bind(&action.confirmation_message)
        .bind(action.status.as_str())
        .bind(action.created_at)
        .bind(action.expires_at)
        .bind(action.resolved_at)
        .bind(&action.resolved_by)
        .bind(&action.resolution_note)
        .bind(action.executed_at)
        .bind(resume)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<PendingAction>, PendingStoreError> {
        let sql = format!("SELECT {} FROM dispatch_pending_actions WHERE id = $1", COLUMNS);
        sqlx::query_as::<_, PendingActionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(PendingAction::try_from)
            .transpose()
    }

    async fn scan(&self, filter: &PendingFilter) -> Result<Vec<PendingAction>, PendingStoreError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM dispatch_pending_actions
            WHERE ($1::text IS NULL OR session_id = $1)
              AND ($2::text IS NULL OR user_id = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY created_at DESC
            "#,
            COLUMNS
        );
        let rows = sqlx::query_as::<_, PendingActionRow>(&sql)
            .bind(&filter.session_id)
            .bind(&filter.user_id)
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(PendingAction::try_from).collect()
    }

    async fn compare_and_set(
        &self,
        expected: ActionStatus,
        updated: &PendingAction,
    ) -> Result<bool, PendingStoreError> {
        let resume = updated.resume.as_ref().map(serde_json::to_value).transpose()?;
        let result = sqlx::query(
            r#"
            UPDATE dispatch_pending_actions
            SET status = $3,
                resolved_at = $4,
                resolved_by = $5,
                resolution_note = $6,
                executed_at = $7,
                resume = $8
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(updated.id)
        .bind(expected.as_str())
        .bind(updated.status.as_str())
        .bind(updated.resolved_at)
        .bind(&updated.resolved_by)
        .bind(&updated.resolution_note)
        .bind(updated.executed_at)
        .bind(resume)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_resolved_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, PendingStoreError> {
        let terminal: Vec<&str> = ActionStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .map(|s| s.as_str())
            .collect();
        let result = sqlx::query(
            r#"
            DELETE FROM dispatch_pending_actions
            WHERE status = ANY($1)
              AND COALESCE(executed_at, resolved_at, created_at) < $2
            "#,
        )
        .bind(terminal)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }
}
