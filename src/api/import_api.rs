// ==========================================
// 批量导入引擎 - 导入API
// ==========================================
// 职责: 对外唯一的“开始导入”操作 + 任务记录查询
// 说明: start_import 在暂存成功、任务创建后即返回，不等待处理完成；
//       运行结果只能通过任务记录查询
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::domain::import_job::ImportJob;
use crate::importer::{IngestionLauncher, UploadRequest, WorkerHandle};
use crate::repository::import_job_repo::ImportJobRepository;
use crate::storage::UploadFile;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// 开始导入请求
#[derive(Debug, Clone)]
pub struct StartImportRequest {
    /// 目标实体类型名
    pub target_type: String,
    /// 上传文件名
    pub file_name: String,
    /// 声明的内容类型
    pub content_type: String,
    /// 文件内容
    pub bytes: Vec<u8>,
}

/// 暂存结果（容器/文件坐标）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingResult {
    /// 任务ID
    pub job_id: String,
    /// 暂存根目录
    pub storage_root: String,
    /// 容器名
    pub container: String,
    /// 文件名
    pub file_name: String,
    /// 内容类型
    pub content_type: String,
    /// 字节数
    pub size: u64,
}

/// 开始导入的返回值
pub struct StartedImport {
    pub staging: StagingResult,
    /// worker 句柄（调用方可选择等待或丢弃）
    pub worker: WorkerHandle,
}

/// 暂存完成回调
pub type StagingCallback = Box<dyn FnOnce(Result<&StagingResult, &ApiError>) + Send>;

// ==========================================
// ImportApi
// ==========================================
pub struct ImportApi {
    launcher: IngestionLauncher<ConfigManager>,
    job_repo: Arc<dyn ImportJobRepository>,
}

impl ImportApi {
    /// 创建新的ImportApi实例
    pub fn new(
        launcher: IngestionLauncher<ConfigManager>,
        job_repo: Arc<dyn ImportJobRepository>,
    ) -> Self {
        Self { launcher, job_repo }
    }

    /// 开始导入
    ///
    /// # 参数
    /// - request: 文件与目标实体类型
    /// - on_staged: 可选回调，暂存成功或失败时调用一次
    ///
    /// # 返回
    /// - Ok(StartedImport): 文件已暂存，任务已创建（PENDING）
    /// - Err(ApiError): 暂存失败或启动校验失败，不会创建任务
    pub async fn start_import(
        &self,
        request: StartImportRequest,
        on_staged: Option<StagingCallback>,
    ) -> ApiResult<StartedImport> {
        let result = self.do_start_import(request).await;

        if let Some(callback) = on_staged {
            match &result {
                Ok(started) => callback(Ok(&started.staging)),
                Err(e) => callback(Err(e)),
            }
        }

        result
    }

    async fn do_start_import(&self, request: StartImportRequest) -> ApiResult<StartedImport> {
        if request.target_type.trim().is_empty() {
            return Err(ApiError::InvalidInput("目标实体类型不能为空".to_string()));
        }
        if request.file_name.trim().is_empty() {
            return Err(ApiError::InvalidInput("文件名不能为空".to_string()));
        }

        let upload = UploadRequest {
            target_type: request.target_type,
            file: UploadFile {
                file_name: request.file_name,
                content_type: request.content_type,
                bytes: request.bytes,
            },
        };

        let handle = self.launcher.start(upload).await.map_err(|e| {
            warn!(error = %e, "开始导入失败");
            ApiError::from(e)
        })?;

        let staging = StagingResult {
            job_id: handle.job_id.clone(),
            storage_root: handle.staged.root.clone(),
            container: handle.staged.container.clone(),
            file_name: handle.staged.file_name.clone(),
            content_type: handle.staged.content_type.clone(),
            size: handle.staged.size,
        };
        info!(job_id = %staging.job_id, container = %staging.container, "导入已开始");

        Ok(StartedImport {
            staging,
            worker: handle.worker,
        })
    }

    /// 查询任务记录
    pub async fn get_job(&self, job_id: &str) -> ApiResult<ImportJob> {
        self.job_repo
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("ImportJob(id={})不存在", job_id)))
    }

    /// 查询最近的任务记录
    pub async fn list_recent_jobs(&self, limit: usize) -> ApiResult<Vec<ImportJob>> {
        if limit == 0 {
            return Err(ApiError::InvalidInput("limit 必须大于 0".to_string()));
        }
        Ok(self.job_repo.list_recent(limit).await?)
    }
}
