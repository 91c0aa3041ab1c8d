// ==========================================
// 批量导入引擎 - 领域模型层
// ==========================================
// 职责: 定义导入任务、实体、映射配置等领域类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod entity;
pub mod import_job;
pub mod types;

// 重导出核心类型
pub use entity::{
    AttributeSet, Entity, EntityTypeDef, FieldMapping, MappedRecord, RelationDecl, RelationSpec,
};
pub use import_job::{AuditEntry, ImportJob, JobStateError, RawRow, RunReport};
pub use types::{JobStatus, RelationKind};
