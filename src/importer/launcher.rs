// ==========================================
// 批量导入引擎 - 导入启动器
// ==========================================
// 职责: 暂存上传文件 → 校验格式 → 创建 PENDING 任务 → 派发 worker
// 红线:
// - 返回时只保证文件已暂存、任务已创建，不等待处理
// - 格式不符时先删除暂存容器，再返回错误，不创建任务
// - 交给 worker 的只有 RunParams（可序列化）
// - 派发失败时删除刚创建的任务与暂存容器
// ==========================================

use crate::config::{EntityTypeRegistry, ImportConfigReader};
use crate::domain::types::JobStatus;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::importer_trait::WorkerExecutor;
use crate::importer::worker::{RunParams, WorkerHandle};
use crate::repository::import_job_repo::ImportJobRepository;
use crate::storage::{StagedFile, StagingStorage, UploadFile};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// 启动请求
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub target_type: String, // 目标实体类型名
    pub file: UploadFile,    // 上传文件
}

/// 启动结果
pub struct JobHandle {
    pub job_id: String,
    pub staged: StagedFile,
    pub worker: WorkerHandle,
}

/// 内容类型归一化：去参数、转小写
///
/// 例: "Text/CSV; charset=utf-8" → "text/csv"
pub fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

// ==========================================
// IngestionLauncher
// ==========================================
pub struct IngestionLauncher<C>
where
    C: ImportConfigReader + EntityTypeRegistry,
{
    config: Arc<C>,
    staging: Arc<dyn StagingStorage>,
    job_repo: Arc<dyn ImportJobRepository>,
    executor: Arc<dyn WorkerExecutor>,
    db_path: String,
}

impl<C> IngestionLauncher<C>
where
    C: ImportConfigReader + EntityTypeRegistry,
{
    /// 创建新的 IngestionLauncher 实例
    ///
    /// # 参数
    /// - config: 配置读取器 + 实体类型注册表
    /// - staging: 上传暂存
    /// - job_repo: 任务记录仓储
    /// - executor: worker 执行方式
    /// - db_path: 数据库路径（随运行参数下发，worker 自行打开连接）
    pub fn new(
        config: Arc<C>,
        staging: Arc<dyn StagingStorage>,
        job_repo: Arc<dyn ImportJobRepository>,
        executor: Arc<dyn WorkerExecutor>,
        db_path: impl Into<String>,
    ) -> Self {
        Self {
            config,
            staging,
            job_repo,
            executor,
            db_path: db_path.into(),
        }
    }

    /// 启动一次导入
    ///
    /// # 返回
    /// - Ok(JobHandle): 文件已暂存，任务已创建（PENDING），worker 已派发
    /// - Err(UnsupportedFormat): 内容类型不符（暂存容器已删除，未创建任务）
    /// - Err(UnknownEntityType / MissingCollaborator): 启动前校验失败
    /// - Err(WorkerSpawn): 派发失败（任务与暂存容器已删除）
    #[instrument(skip(self, request), fields(target_type = %request.target_type))]
    pub async fn start(&self, request: UploadRequest) -> ImportResult<JobHandle> {
        let UploadRequest { target_type, file } = request;

        // === 启动前校验 ===
        let job_record_type = self.config.get_job_record_type().await?;
        let container_type = self.config.get_container_type().await?;
        if job_record_type.trim().is_empty() {
            return Err(ImportError::MissingCollaborator("job_record_type".to_string()));
        }
        if container_type.trim().is_empty() {
            return Err(ImportError::MissingCollaborator("container_type".to_string()));
        }
        if self.config.get_entity_type(&target_type).await?.is_none() {
            return Err(ImportError::UnknownEntityType(target_type));
        }

        // === 暂存 ===
        let container = format!("{}-{}", container_type, Uuid::new_v4().simple());
        self.staging.create_container(&container).await?;
        let staged = match self.staging.upload(&container, file).await {
            Ok(staged) => staged,
            Err(e) => {
                self.discard(&container).await;
                return Err(e.into());
            }
        };

        // === 格式校验 ===
        let accepted = self.config.get_accepted_content_type().await?;
        let actual = normalize_content_type(&staged.content_type);
        if actual != normalize_content_type(&accepted) {
            warn!(container = %container, expected = %accepted, actual = %staged.content_type, "文件格式不支持");
            self.discard(&container).await;
            return Err(ImportError::UnsupportedFormat {
                expected: accepted,
                actual: staged.content_type,
            });
        }

        // === 创建任务 ===
        let job = match self
            .job_repo
            .create(Utc::now(), &target_type, JobStatus::Pending)
            .await
        {
            Ok(job) => job,
            Err(e) => {
                self.discard(&container).await;
                return Err(e.into());
            }
        };

        // === 派发 worker ===
        let params = RunParams {
            target_type,
            job_id: job.job_id.clone(),
            storage_root: staged.root.clone(),
            container: staged.container.clone(),
            file_name: staged.file_name.clone(),
            job_record_type,
            container_type,
            db_path: self.db_path.clone(),
        };
        let worker = match self.dispatch(&job.job_id, &params).await {
            Ok(worker) => worker,
            Err(e) => {
                // 无 worker 接手时删除任务与暂存容器
                warn!(job_id = %job.job_id, error = %e, "worker 派发失败");
                self.rollback_job(&job.job_id).await;
                self.discard(&container).await;
                return Err(e);
            }
        };

        info!(
            job_id = %job.job_id,
            container = %staged.container,
            file_name = %staged.file_name,
            size = staged.size,
            "导入任务已派发"
        );

        Ok(JobHandle {
            job_id: job.job_id,
            staged,
            worker,
        })
    }

    async fn dispatch(&self, job_id: &str, params: &RunParams) -> ImportResult<WorkerHandle> {
        let payload = params.to_payload()?;
        self.executor.dispatch(job_id, payload).await
    }

    async fn rollback_job(&self, job_id: &str) {
        if let Err(e) = self.job_repo.delete(job_id).await {
            warn!(job_id = %job_id, error = %e, "任务记录回滚失败");
        }
    }

    async fn discard(&self, container: &str) {
        if let Err(e) = self.staging.destroy_container(container).await {
            warn!(container = %container, error = %e, "暂存容器删除失败");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_content_type() {
        assert_eq!(normalize_content_type("text/csv"), "text/csv");
        assert_eq!(
            normalize_content_type(" Text/CSV; charset=utf-8"),
            "text/csv"
        );
        assert_eq!(normalize_content_type(""), "");
    }
}
