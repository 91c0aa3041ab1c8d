// ==========================================
// 批量导入引擎 - 关联解析器
// ==========================================
// 职责: 对一行的每个关联并发执行 查找 → 判重 → 关联
// 并发: futures::join_all 扇出/扇入，单个关联失败不影响其他关联
// 策略: ReferenceStrategy（单槽引用）/ ManyToManyStrategy（多对多）
// ==========================================

use crate::domain::entity::{AttributeSet, Entity, RelationDecl, RelationSpec};
use crate::domain::import_job::RawRow;
use crate::domain::types::RelationKind;
use crate::importer::importer_trait::RelationStrategy;
use crate::importer::run_context::{ResolvedRelation, RunContext};
use crate::repository::entity_store::EntityStore;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

pub const MSG_ALREADY_RELATED: &str = "tried to relate existing relation";

pub fn missing_target_message(relation: &str) -> String {
    format!("tried to relate nonexistent instance of {}", relation)
}

// ==========================================
// 关联策略
// ==========================================

/// 按关联类型选择策略
pub fn strategy_for(kind: RelationKind) -> Arc<dyn RelationStrategy> {
    match kind {
        RelationKind::Reference => Arc::new(ReferenceStrategy),
        RelationKind::ManyToMany => Arc::new(ManyToManyStrategy),
    }
}

/// 单槽引用：设置即覆盖
pub struct ReferenceStrategy;

#[async_trait]
impl RelationStrategy for ReferenceStrategy {
    fn kind(&self) -> RelationKind {
        RelationKind::Reference
    }

    async fn is_attached(
        &self,
        store: &dyn EntityStore,
        entity: &Entity,
        relation: &RelationDecl,
        target: &Entity,
    ) -> RepositoryResult<bool> {
        let current = store.list_related(entity, &relation.name).await?;
        Ok(current.iter().any(|e| e.id == target.id))
    }

    async fn attach(
        &self,
        store: &dyn EntityStore,
        entity: &Entity,
        relation: &RelationDecl,
        target: &Entity,
    ) -> RepositoryResult<()> {
        store.set_reference(entity, relation, target).await
    }
}

/// 多对多：幂等添加
pub struct ManyToManyStrategy;

#[async_trait]
impl RelationStrategy for ManyToManyStrategy {
    fn kind(&self) -> RelationKind {
        RelationKind::ManyToMany
    }

    async fn is_attached(
        &self,
        store: &dyn EntityStore,
        entity: &Entity,
        relation: &RelationDecl,
        target: &Entity,
    ) -> RepositoryResult<bool> {
        let found = store
            .find_related_by_id(entity, &relation.name, target.id)
            .await?;
        Ok(found.is_some())
    }

    async fn attach(
        &self,
        store: &dyn EntityStore,
        entity: &Entity,
        relation: &RelationDecl,
        target: &Entity,
    ) -> RepositoryResult<()> {
        store.add_related(entity, relation, target).await
    }
}

// ==========================================
// RelationOutcome - 单个关联的处理结果
// ==========================================
#[derive(Debug)]
pub enum RelationOutcome {
    /// 已关联
    Attached { relation: String, target_id: i64 },
    /// 查找列全部为空，静默跳过
    SkippedNoLookup { relation: String },
    /// 未找到目标（警告）
    MissingTarget { relation: String },
    /// 目标已关联（警告）
    AlreadyAttached { relation: String, target_id: i64 },
    /// 查找/关联失败（行级错误）
    Failed {
        relation: String,
        error: RepositoryError,
    },
}

impl RelationOutcome {
    pub fn relation(&self) -> &str {
        match self {
            RelationOutcome::Attached { relation, .. }
            | RelationOutcome::SkippedNoLookup { relation }
            | RelationOutcome::MissingTarget { relation }
            | RelationOutcome::AlreadyAttached { relation, .. }
            | RelationOutcome::Failed { relation, .. } => relation,
        }
    }

    /// 需要记入任务警告的消息
    pub fn warning_message(&self) -> Option<String> {
        match self {
            RelationOutcome::MissingTarget { relation } => Some(missing_target_message(relation)),
            RelationOutcome::AlreadyAttached { .. } => Some(MSG_ALREADY_RELATED.to_string()),
            _ => None,
        }
    }
}

/// 查找条件构建结果
enum LookupFilter {
    Empty,
    Partial,
    Complete(AttributeSet),
}

/// 从原始行读取关联查找列
fn build_lookup(spec: &RelationSpec, row: &RawRow) -> LookupFilter {
    let mut filter = AttributeSet::new();
    let mut missing = 0usize;

    for (lookup_attribute, source_column) in spec.iter() {
        match row
            .get(source_column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
        {
            Some(value) => {
                filter.insert(lookup_attribute.clone(), value.to_string());
            }
            None => missing += 1,
        }
    }

    if filter.is_empty() {
        LookupFilter::Empty
    } else if missing > 0 {
        LookupFilter::Partial
    } else {
        LookupFilter::Complete(filter)
    }
}

// ==========================================
// RelationResolver
// ==========================================
pub struct RelationResolver {
    store: Arc<dyn EntityStore>,
}

impl RelationResolver {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// 并发解析一行的全部关联
    ///
    /// # 返回
    /// 与 ctx.relations 同序的结果列表（所有关联均已结束）
    pub async fn resolve_all(
        &self,
        ctx: &RunContext,
        entity: &Entity,
        row: &RawRow,
    ) -> Vec<RelationOutcome> {
        let futures = ctx
            .relations
            .iter()
            .map(|relation| self.resolve_one(relation, entity, row));
        join_all(futures).await
    }

    async fn resolve_one(
        &self,
        relation: &ResolvedRelation,
        entity: &Entity,
        row: &RawRow,
    ) -> RelationOutcome {
        let name = relation.decl.name.clone();

        let filter = match build_lookup(&relation.spec, row) {
            LookupFilter::Empty => return RelationOutcome::SkippedNoLookup { relation: name },
            LookupFilter::Partial => return RelationOutcome::MissingTarget { relation: name },
            LookupFilter::Complete(filter) => filter,
        };

        let target = match self
            .store
            .find_one(&relation.decl.target_type, &filter)
            .await
        {
            Ok(Some(target)) => target,
            Ok(None) => return RelationOutcome::MissingTarget { relation: name },
            Err(error) => {
                return RelationOutcome::Failed {
                    relation: name,
                    error,
                }
            }
        };

        let store = self.store.as_ref();
        match relation
            .strategy
            .is_attached(store, entity, &relation.decl, &target)
            .await
        {
            Ok(true) => {
                return RelationOutcome::AlreadyAttached {
                    relation: name,
                    target_id: target.id,
                }
            }
            Ok(false) => {}
            Err(error) => {
                return RelationOutcome::Failed {
                    relation: name,
                    error,
                }
            }
        }

        match relation
            .strategy
            .attach(store, entity, &relation.decl, &target)
            .await
        {
            Ok(()) => RelationOutcome::Attached {
                relation: name,
                target_id: target.id,
            },
            Err(error) => RelationOutcome::Failed {
                relation: name,
                error,
            },
        }
    }
}
