// ==========================================
// 批量导入引擎 - 导入组件 Trait
// ==========================================
// 职责: 定义导入管道各组件接口（不包含实现）
// ==========================================

use crate::domain::entity::{Entity, FieldMapping, MappedRecord, RelationDecl};
use crate::domain::import_job::RawRow;
use crate::domain::types::RelationKind;
use crate::importer::error::ImportResult;
use crate::importer::worker::WorkerHandle;
use crate::repository::entity_store::EntityStore;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// MapOutcome - 字段映射结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapOutcome {
    Mapped(MappedRecord), // 映射成功
    Skip,                 // 主键缺失，静默跳过
}

// ==========================================
// FieldMapper Trait
// ==========================================
// 用途: 原始行 → 目标属性集（纯函数，无副作用，不会失败）
// 实现者: FieldMapperImpl
pub trait FieldMapper: Send + Sync {
    /// 按映射配置提取属性
    ///
    /// # 参数
    /// - row: 原始行（列名 → 值）
    /// - mapping: 目标属性名 → 源列名
    /// - primary_key: 主键属性名
    ///
    /// # 返回
    /// - MapOutcome::Mapped: 含主键的属性集（空值列被省略）
    /// - MapOutcome::Skip: 主键缺失
    fn map(&self, row: &RawRow, mapping: &FieldMapping, primary_key: &str) -> MapOutcome;
}

// ==========================================
// RelationStrategy Trait
// ==========================================
// 用途: 按关联类型决定“是否已关联”与“如何关联”
// 实现者: ReferenceStrategy, ManyToManyStrategy
#[async_trait]
pub trait RelationStrategy: Send + Sync {
    fn kind(&self) -> RelationKind;

    /// target 是否已关联到 entity 的 relation 下
    async fn is_attached(
        &self,
        store: &dyn EntityStore,
        entity: &Entity,
        relation: &RelationDecl,
        target: &Entity,
    ) -> RepositoryResult<bool>;

    /// 关联 target
    async fn attach(
        &self,
        store: &dyn EntityStore,
        entity: &Entity,
        relation: &RelationDecl,
        target: &Entity,
    ) -> RepositoryResult<()>;
}

// ==========================================
// WorkerExecutor Trait
// ==========================================
// 用途: 把序列化后的运行参数交给隔离执行环境
// 实现者: TaskExecutor（独立 tokio 任务）, ProcessExecutor（子进程）
// 红线: 调用方与执行方之间只传递 payload，不共享任何活动句柄
#[async_trait]
pub trait WorkerExecutor: Send + Sync {
    /// 派发一次导入运行
    ///
    /// # 参数
    /// - job_id: 任务 ID（仅用于日志与故障上报）
    /// - payload: RunParams 的 JSON 序列化
    async fn dispatch(&self, job_id: &str, payload: String) -> ImportResult<WorkerHandle>;
}
