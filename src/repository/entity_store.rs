// ==========================================
// 批量导入引擎 - 宿主实体存储 Trait
// ==========================================
// 职责: 定义导入引擎对宿主存储的能力契约（不包含实现）
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::domain::entity::{AttributeSet, Entity, RelationDecl};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// EntityStore Trait
// ==========================================
// 用途: 实体查找/创建/更新 + 关联访问
// 实现者: SqliteEntityStore
#[async_trait]
pub trait EntityStore: Send + Sync {
    // ===== 实体操作 =====

    /// 按属性过滤查找一个实体
    ///
    /// # 参数
    /// - entity_type: 实体类型名
    /// - filter: 属性名 → 期望值（全部相等）
    ///
    /// # 返回
    /// - Ok(Some(entity)): 找到（多条匹配时返回最早创建的一条）
    /// - Ok(None): 未找到；空过滤条件也视为未找到
    async fn find_one(
        &self,
        entity_type: &str,
        filter: &AttributeSet,
    ) -> RepositoryResult<Option<Entity>>;

    /// 创建实体（属性原样写入）
    async fn create(&self, entity_type: &str, attributes: AttributeSet) -> RepositoryResult<Entity>;

    /// 更新实体：attributes 中的每个属性覆盖原值，其余属性保持不变
    async fn update(&self, entity: &Entity, attributes: AttributeSet) -> RepositoryResult<Entity>;

    /// 统计某类型实体数量
    async fn count(&self, entity_type: &str) -> RepositoryResult<usize>;

    // ===== 关联访问 =====

    /// 在 entity 的 relation 下按目标 ID 查找已关联实体
    async fn find_related_by_id(
        &self,
        entity: &Entity,
        relation: &str,
        target_id: i64,
    ) -> RepositoryResult<Option<Entity>>;

    /// 列出 entity 在 relation 下的全部关联实体（按关联创建顺序）
    async fn list_related(&self, entity: &Entity, relation: &str) -> RepositoryResult<Vec<Entity>>;

    /// 多对多：添加关联（幂等）
    async fn add_related(
        &self,
        entity: &Entity,
        relation: &RelationDecl,
        target: &Entity,
    ) -> RepositoryResult<()>;

    /// 单槽引用：设置关联（覆盖原引用）
    async fn set_reference(
        &self,
        entity: &Entity,
        relation: &RelationDecl,
        target: &Entity,
    ) -> RepositoryResult<()>;
}
