// ==========================================
// 批量导入引擎 - 导入任务 Repository 实现
// ==========================================
// 职责: 使用 rusqlite 实现 ImportJobRepository
// 存储: import_job 表，警告/错误以 JSON 数组保存
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::import_job::{AuditEntry, ImportJob};
use crate::domain::types::JobStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::import_job_repo::ImportJobRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

// ==========================================
// SqliteImportJobRepository
// ==========================================
pub struct SqliteImportJobRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteImportJobRepository {
    /// 打开数据库文件创建 Repository
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    /// 从已有连接创建 Repository
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

/// 行 → 原始列值
struct JobRow {
    job_id: String,
    target_type: String,
    created_at: String,
    status: String,
    warnings_json: String,
    errors_json: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            job_id: row.get(0)?,
            target_type: row.get(1)?,
            created_at: row.get(2)?,
            status: row.get(3)?,
            warnings_json: row.get(4)?,
            errors_json: row.get(5)?,
        })
    }

    fn into_job(self) -> RepositoryResult<ImportJob> {
        let status = JobStatus::parse(&self.status).ok_or_else(|| {
            RepositoryError::ValidationError(format!(
                "未知的任务状态: job_id={}, status={}",
                self.job_id, self.status
            ))
        })?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RepositoryError::ValidationError(format!("created_at 格式错误: {}", e)))?;
        let warnings: Vec<AuditEntry> = serde_json::from_str(&self.warnings_json)?;
        let errors: Vec<AuditEntry> = serde_json::from_str(&self.errors_json)?;

        Ok(ImportJob {
            job_id: self.job_id,
            target_type: self.target_type,
            created_at,
            status,
            warnings,
            errors,
        })
    }
}

const SELECT_COLUMNS: &str =
    "job_id, target_type, created_at, status, warnings_json, errors_json";

#[async_trait]
impl ImportJobRepository for SqliteImportJobRepository {
    async fn create(
        &self,
        created_at: DateTime<Utc>,
        target_type: &str,
        status: JobStatus,
    ) -> RepositoryResult<ImportJob> {
        let job = ImportJob {
            job_id: Uuid::new_v4().to_string(),
            target_type: target_type.to_string(),
            created_at,
            status,
            warnings: Vec::new(),
            errors: Vec::new(),
        };

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO import_job (
                job_id, target_type, created_at, status, warnings_json, errors_json
            ) VALUES (?1, ?2, ?3, ?4, '[]', '[]')
            "#,
            params![
                job.job_id,
                job.target_type,
                job.created_at.to_rfc3339(),
                job.status.as_str(),
            ],
        )?;

        Ok(job)
    }

    async fn find_by_id(&self, job_id: &str) -> RepositoryResult<Option<ImportJob>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM import_job WHERE job_id = ?1", SELECT_COLUMNS),
                params![job_id],
                JobRow::from_row,
            )
            .optional()?;

        row.map(JobRow::into_job).transpose()
    }

    async fn save(&self, job: &ImportJob) -> RepositoryResult<ImportJob> {
        let warnings_json = serde_json::to_string(&job.warnings)?;
        let errors_json = serde_json::to_string(&job.errors)?;

        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE import_job
            SET status = ?1, warnings_json = ?2, errors_json = ?3, updated_at = ?4
            WHERE job_id = ?5
            "#,
            params![
                job.status.as_str(),
                warnings_json,
                errors_json,
                Utc::now().to_rfc3339(),
                job.job_id,
            ],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ImportJob".to_string(),
                id: job.job_id.clone(),
            });
        }

        Ok(job.clone())
    }

    async fn delete(&self, job_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute("DELETE FROM import_job WHERE job_id = ?1", params![job_id])?;
        Ok(affected > 0)
    }

    async fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<ImportJob>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM import_job ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            SELECT_COLUMNS
        ))?;

        let rows = stmt.query_map(params![limit as i64], JobRow::from_row)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?.into_job()?);
        }
        Ok(jobs)
    }
}
