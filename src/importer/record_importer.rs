// ==========================================
// 批量导入引擎 - 记录导入器
// ==========================================
// 职责: 单次运行的完整流程
// 流程: 加载任务 → 打开源文件 → PROCESSING → 逐行处理 → FINISHED
// ==========================================

use crate::domain::entity::EntityTypeDef;
use crate::domain::import_job::RunReport;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::CsvRowStream;
use crate::importer::importer_trait::FieldMapper;
use crate::importer::job_lifecycle::JobLifecycleManager;
use crate::importer::row_pipeline::RowPipeline;
use crate::importer::run_context::RunContext;
use crate::repository::entity_store::EntityStore;
use crate::repository::import_job_repo::ImportJobRepository;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, instrument};

// ==========================================
// RecordImporter
// ==========================================
pub struct RecordImporter {
    // 数据访问层
    entity_store: Arc<dyn EntityStore>,
    job_repo: Arc<dyn ImportJobRepository>,

    // 导入组件
    mapper: Arc<dyn FieldMapper>,

    // 行通道容量
    row_buffer_size: usize,
}

impl RecordImporter {
    /// 创建新的 RecordImporter 实例
    ///
    /// # 参数
    /// - entity_store: 宿主实体存储
    /// - job_repo: 任务记录仓储
    /// - mapper: 字段映射器
    /// - row_buffer_size: CSV 读取端与管道之间的通道容量
    pub fn new(
        entity_store: Arc<dyn EntityStore>,
        job_repo: Arc<dyn ImportJobRepository>,
        mapper: Arc<dyn FieldMapper>,
        row_buffer_size: usize,
    ) -> Self {
        Self {
            entity_store,
            job_repo,
            mapper,
            row_buffer_size,
        }
    }

    /// 执行一次导入运行
    ///
    /// # 参数
    /// - job_id: 已创建（PENDING）的任务 ID
    /// - entity_type: 目标实体类型定义
    /// - file_path: 已暂存的源文件
    ///
    /// # 返回
    /// - Ok(RunReport): 任务已 FINISHED
    /// - Err(Fatal): 任务记录不可用或源文件不可读，任务不会被标记 FINISHED
    #[instrument(skip(self, entity_type, file_path), fields(target_type = %entity_type.name))]
    pub async fn run(
        &self,
        job_id: &str,
        entity_type: &EntityTypeDef,
        file_path: &Path,
    ) -> ImportResult<RunReport> {
        info!(job_id = %job_id, file_path = %file_path.display(), "开始导入");

        let mut lifecycle = JobLifecycleManager::load(self.job_repo.clone(), job_id).await?;
        if lifecycle.job().target_type != entity_type.name {
            return Err(ImportError::fatal(
                job_id,
                format!(
                    "任务目标类型不一致: 任务={}, 参数={}",
                    lifecycle.job().target_type,
                    entity_type.name
                ),
            ));
        }

        let ctx = RunContext::resolve(job_id, entity_type.clone());

        let stream = CsvRowStream::open(file_path, self.row_buffer_size)
            .await
            .map_err(|e| {
                error!(job_id = %job_id, error = %e, "源文件打开失败");
                ImportError::fatal(job_id, format!("源文件打开失败: {}", e))
            })?;

        lifecycle.begin_processing().await?;

        let pipeline = RowPipeline::new(self.entity_store.clone(), self.mapper.clone());
        pipeline.run(&ctx, stream, &mut lifecycle).await
    }
}
