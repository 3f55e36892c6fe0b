use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use dispatch_core::{DispatchError, DispatchResult};
use dispatch_domain::entities::{
    ChannelState, DispatchChannel, DispatchSession, Location, OverallStatus, TriageResult,
};
use dispatch_domain::repositories::SessionStore;

/// SQLite会话存储
///
/// 会话快照按session_id覆盖写入。分诊结果、位置和通道状态
/// 以JSON列存储，聚合状态与时间戳单列存放以便查询。
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 创建内嵌SQLite会话存储，自动初始化数据库
    pub async fn new_embedded(database_path: &str) -> DispatchResult<Self> {
        use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
        use std::str::FromStr;

        debug!("创建内嵌SQLite会话存储: {}", database_path);

        // 启用外键约束和WAL模式
        let connect_options = SqliteConnectOptions::from_str(database_path)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .connect_with(connect_options)
            .await?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> DispatchResult<()> {
        debug!("运行SQLite数据库迁移");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dispatch_sessions (
                session_id TEXT PRIMARY KEY,
                overall_status TEXT NOT NULL,
                triage_result TEXT NOT NULL,
                location TEXT NOT NULL,
                channel_states TEXT NOT NULL,
                created_at TEXT NOT NULL,
                sealed_at TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_dispatch_sessions_created_at \
             ON dispatch_sessions (created_at DESC)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> DispatchResult<DispatchSession> {
        let session_id: String = row.try_get("session_id")?;
        let session_id = Uuid::parse_str(&session_id)
            .map_err(|e| DispatchError::Internal(format!("无效的会话ID: {e}")))?;

        let overall_status: String = row.try_get("overall_status")?;
        let overall_status: OverallStatus =
            serde_json::from_value(serde_json::Value::String(overall_status))?;

        let triage_json: String = row.try_get("triage_result")?;
        let triage_result: TriageResult = serde_json::from_str(&triage_json)?;

        let location_json: String = row.try_get("location")?;
        let location: Location = serde_json::from_str(&location_json)?;

        let states_json: String = row.try_get("channel_states")?;
        let channel_states: HashMap<DispatchChannel, ChannelState> =
            serde_json::from_str(&states_json)?;

        let created_at: String = row.try_get("created_at")?;
        let created_at = parse_timestamp(&created_at)?;

        let sealed_at: Option<String> = row.try_get("sealed_at")?;
        let sealed_at = sealed_at.as_deref().map(parse_timestamp).transpose()?;

        Ok(DispatchSession {
            session_id,
            triage_result,
            location,
            channel_states,
            overall_status,
            created_at,
            sealed_at,
        })
    }
}

fn parse_timestamp(s: &str) -> DispatchResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DispatchError::Internal(format!("无效的时间戳 {s}: {e}")))
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn persist(&self, snapshot: &DispatchSession) -> DispatchResult<()> {
        let overall_status = snapshot.overall_status.to_string();
        let triage_json = serde_json::to_string(&snapshot.triage_result)?;
        let location_json = serde_json::to_string(&snapshot.location)?;
        let states_json = serde_json::to_string(&snapshot.channel_states)?;

        sqlx::query(
            r#"
            INSERT INTO dispatch_sessions
                (session_id, overall_status, triage_result, location, channel_states, created_at, sealed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                overall_status = excluded.overall_status,
                channel_states = excluded.channel_states,
                sealed_at = excluded.sealed_at
            "#,
        )
        .bind(snapshot.session_id.to_string())
        .bind(overall_status)
        .bind(triage_json)
        .bind(location_json)
        .bind(states_json)
        .bind(snapshot.created_at.to_rfc3339())
        .bind(snapshot.sealed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, session_id: Uuid) -> DispatchResult<Option<DispatchSession>> {
        let row = sqlx::query("SELECT * FROM dispatch_sessions WHERE session_id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn list_recent(&self, limit: i64) -> DispatchResult<Vec<DispatchSession>> {
        let rows = sqlx::query(
            "SELECT * FROM dispatch_sessions ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_session).collect()
    }
}
