// ==========================================
// 批量导入引擎 - 任务生命周期管理
// ==========================================
// 状态: PENDING → PROCESSING → FINISHED
// 规则: 每次状态转换与每次追加立即持久化，不做批量
// 失败: 任务记录加载/保存失败一律为致命错误（任务保持原状态，不标记 FINISHED）
// ==========================================

use crate::domain::import_job::{AuditEntry, ImportJob};
use crate::domain::types::JobStatus;
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::import_job_repo::ImportJobRepository;
use std::sync::Arc;

pub struct JobLifecycleManager {
    repo: Arc<dyn ImportJobRepository>,
    job: ImportJob,
}

impl JobLifecycleManager {
    /// 加载任务记录
    ///
    /// # 返回
    /// - Err(Fatal): 任务不存在或加载失败
    pub async fn load(repo: Arc<dyn ImportJobRepository>, job_id: &str) -> ImportResult<Self> {
        let job = match repo.find_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => return Err(ImportError::fatal(job_id, "任务记录不存在")),
            Err(e) => {
                return Err(ImportError::fatal(
                    job_id,
                    format!("任务记录加载失败: {}", e),
                ))
            }
        };

        Ok(Self { repo, job })
    }

    pub fn job(&self) -> &ImportJob {
        &self.job
    }

    pub fn job_id(&self) -> &str {
        &self.job.job_id
    }

    /// PENDING → PROCESSING
    pub async fn begin_processing(&mut self) -> ImportResult<()> {
        self.transition(JobStatus::Processing).await
    }

    /// PROCESSING → FINISHED
    pub async fn finish(&mut self) -> ImportResult<()> {
        self.transition(JobStatus::Finished).await
    }

    /// 追加一行的警告与错误并持久化
    ///
    /// 无条目时不写库
    pub async fn record(
        &mut self,
        warnings: Vec<AuditEntry>,
        errors: Vec<AuditEntry>,
    ) -> ImportResult<()> {
        if warnings.is_empty() && errors.is_empty() {
            return Ok(());
        }

        let job_id = self.job.job_id.clone();
        for entry in warnings {
            self.job
                .push_warning(entry)
                .map_err(|e| ImportError::fatal(&job_id, e.to_string()))?;
        }
        for entry in errors {
            self.job
                .push_error(entry)
                .map_err(|e| ImportError::fatal(&job_id, e.to_string()))?;
        }

        self.persist().await
    }

    async fn transition(&mut self, next: JobStatus) -> ImportResult<()> {
        let job_id = self.job.job_id.clone();
        self.job
            .advance_to(next)
            .map_err(|e| ImportError::fatal(&job_id, e.to_string()))?;
        self.persist().await?;

        tracing::info!(job_id = %job_id, status = %next, "任务状态已更新");
        Ok(())
    }

    async fn persist(&mut self) -> ImportResult<()> {
        match self.repo.save(&self.job).await {
            Ok(saved) => {
                self.job = saved;
                Ok(())
            }
            Err(e) => Err(ImportError::fatal(
                &self.job.job_id,
                format!("任务记录保存失败: {}", e),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::import_job::RawRow;
    use crate::repository::import_job_repo_impl::SqliteImportJobRepository;
    use chrono::Utc;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn setup_repo() -> Arc<SqliteImportJobRepository> {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        Arc::new(SqliteImportJobRepository::from_connection(Arc::new(
            Mutex::new(conn),
        )))
    }

    fn entry(row_number: usize, message: &str) -> AuditEntry {
        AuditEntry::new(row_number, RawRow::new(), message)
    }

    #[tokio::test]
    async fn test_lifecycle_persists_each_step() {
        let repo = setup_repo();
        let job = repo
            .create(Utc::now(), "Pet", JobStatus::Pending)
            .await
            .unwrap();

        let mut manager = JobLifecycleManager::load(repo.clone(), &job.job_id)
            .await
            .unwrap();

        manager.begin_processing().await.unwrap();
        let stored = repo.find_by_id(&job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Processing);

        manager
            .record(vec![entry(1, "w1")], vec![entry(1, "e1")])
            .await
            .unwrap();
        let stored = repo.find_by_id(&job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.warnings.len(), 1);
        assert_eq!(stored.errors[0].message, "e1");

        manager.finish().await.unwrap();
        let stored = repo.find_by_id(&job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Finished);
    }

    #[tokio::test]
    async fn test_missing_job_is_fatal() {
        let repo = setup_repo();
        let result = JobLifecycleManager::load(repo, "missing").await;
        assert!(matches!(result, Err(ref e) if e.is_fatal()));
    }

    #[tokio::test]
    async fn test_finished_job_rejects_changes() {
        let repo = setup_repo();
        let job = repo
            .create(Utc::now(), "Pet", JobStatus::Pending)
            .await
            .unwrap();

        let mut manager = JobLifecycleManager::load(repo.clone(), &job.job_id)
            .await
            .unwrap();
        manager.begin_processing().await.unwrap();
        manager.finish().await.unwrap();

        let result = manager.record(vec![entry(1, "late")], Vec::new()).await;
        assert!(matches!(result, Err(ref e) if e.is_fatal()));
        assert!(manager.begin_processing().await.unwrap_err().is_fatal());
    }
}
