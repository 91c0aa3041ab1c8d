// ==========================================
// 批量导入引擎 - 运行上下文
// ==========================================
// 职责: 单次运行的只读上下文，显式传递给各组件
// 红线: 关联策略在此一次性解析，逐行处理时不再按名称推导
// ==========================================

use crate::domain::entity::{EntityTypeDef, RelationDecl, RelationSpec};
use crate::importer::importer_trait::RelationStrategy;
use crate::importer::relation_resolver::strategy_for;
use std::sync::Arc;

// ==========================================
// ResolvedRelation - 已解析的关联
// ==========================================
#[derive(Clone)]
pub struct ResolvedRelation {
    pub decl: RelationDecl,                 // 实体类型声明
    pub spec: RelationSpec,                 // 查找配置
    pub strategy: Arc<dyn RelationStrategy>, // 按关联类型选定的策略
}

// ==========================================
// RunContext
// ==========================================
#[derive(Clone)]
pub struct RunContext {
    pub job_id: String,
    pub entity_type: EntityTypeDef,
    pub relations: Vec<ResolvedRelation>,
}

impl RunContext {
    /// 构建运行上下文
    ///
    /// relation_specs 中未在实体类型上声明的关联被忽略
    pub fn resolve(job_id: impl Into<String>, entity_type: EntityTypeDef) -> Self {
        let job_id = job_id.into();
        let mut relations = Vec::new();

        for (name, spec) in &entity_type.relation_specs {
            match entity_type.declared_relation(name) {
                Some(decl) => relations.push(ResolvedRelation {
                    decl: decl.clone(),
                    spec: spec.clone(),
                    strategy: strategy_for(decl.kind),
                }),
                None => {
                    tracing::debug!(
                        job_id = %job_id,
                        entity_type = %entity_type.name,
                        relation = %name,
                        "关联未在实体类型上声明，忽略"
                    );
                }
            }
        }

        Self {
            job_id,
            entity_type,
            relations,
        }
    }

    pub fn primary_key(&self) -> &str {
        &self.entity_type.primary_key
    }

    pub fn target_type(&self) -> &str {
        &self.entity_type.name
    }
}
