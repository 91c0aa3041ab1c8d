// ==========================================
// 批量导入引擎 - 导入层
// ==========================================
// 职责: 分隔文件流式导入、Upsert、关联解析、任务生命周期
// 流程: 启动器暂存并派发 → worker 加载任务 → 逐行 映射 → Upsert → 关联 → 记账
// ==========================================

// 模块声明
pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod importer_trait;
pub mod job_lifecycle;
pub mod launcher;
pub mod record_importer;
pub mod relation_resolver;
pub mod row_pipeline;
pub mod run_context;
pub mod upsert_resolver;
pub mod worker;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use field_mapper::FieldMapper as FieldMapperImpl;
pub use file_parser::{CsvRowStream, RowReadError, SourceItem, SourceRow};
pub use job_lifecycle::JobLifecycleManager;
pub use launcher::{normalize_content_type, IngestionLauncher, JobHandle, UploadRequest};
pub use record_importer::RecordImporter;
pub use relation_resolver::{
    ManyToManyStrategy, ReferenceStrategy, RelationOutcome, RelationResolver,
    MSG_ALREADY_RELATED,
};
pub use row_pipeline::{RowAccount, RowDisposition, RowPipeline};
pub use run_context::{ResolvedRelation, RunContext};
pub use upsert_resolver::{UpsertOutcome, UpsertResolver, MSG_ENTITY_EXISTS};
pub use worker::{
    fault_channel, run_worker, FaultReceiver, FaultSender, ProcessExecutor, RunParams,
    TaskExecutor, WorkerFault, WorkerHandle, FAULT_CHANNEL_CAPACITY,
};

// 重导出 Trait 接口
pub use importer_trait::{FieldMapper, MapOutcome, RelationStrategy, WorkerExecutor};
