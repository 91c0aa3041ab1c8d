// ==========================================
// 批量导入引擎 - 导入任务 Repository Trait
// ==========================================
// 职责: 定义导入任务记录的数据访问接口（不包含业务逻辑）
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::domain::import_job::ImportJob;
use crate::domain::types::JobStatus;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

// ==========================================
// ImportJobRepository Trait
// ==========================================
// 用途: 导入任务审计记录的创建/查询/保存
// 实现者: SqliteImportJobRepository
#[async_trait]
pub trait ImportJobRepository: Send + Sync {
    /// 创建任务记录
    ///
    /// # 参数
    /// - created_at: 创建时间
    /// - target_type: 目标实体类型名
    /// - status: 初始状态
    ///
    /// # 返回
    /// - Ok(ImportJob): 新记录（job_id 由仓储生成）
    async fn create(
        &self,
        created_at: DateTime<Utc>,
        target_type: &str,
        status: JobStatus,
    ) -> RepositoryResult<ImportJob>;

    /// 按 ID 查询任务
    async fn find_by_id(&self, job_id: &str) -> RepositoryResult<Option<ImportJob>>;

    /// 保存任务当前内存状态（含已追加的警告/错误）
    async fn save(&self, job: &ImportJob) -> RepositoryResult<ImportJob>;

    /// 删除任务记录（仅用于派发失败时回滚刚创建的任务）
    ///
    /// # 返回
    /// - Ok(true): 已删除
    /// - Ok(false): 记录不存在
    async fn delete(&self, job_id: &str) -> RepositoryResult<bool>;

    /// 查询最近的任务（按创建时间倒序）
    async fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<ImportJob>>;
}
