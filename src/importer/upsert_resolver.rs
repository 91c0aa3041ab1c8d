// ==========================================
// 批量导入引擎 - Upsert 解析器
// ==========================================
// 职责: 按主键决定新建或更新
// 规则: 已存在 → 合并覆盖映射属性；不存在 → 按映射属性新建
// 失败: 查找/持久化失败原样返回，由调用方记为行级错误
// ==========================================

use crate::domain::entity::{AttributeSet, Entity, MappedRecord};
use crate::importer::run_context::RunContext;
use crate::repository::entity_store::EntityStore;
use crate::repository::error::{RepositoryError, RepositoryResult};
use std::sync::Arc;

pub const MSG_ENTITY_EXISTS: &str = "entity already exists, updating fields to new values";

// ==========================================
// UpsertOutcome
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(Entity),
    Updated(Entity),
}

impl UpsertOutcome {
    pub fn entity(&self) -> &Entity {
        match self {
            UpsertOutcome::Created(e) | UpsertOutcome::Updated(e) => e,
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(self, UpsertOutcome::Updated(_))
    }
}

pub struct UpsertResolver {
    store: Arc<dyn EntityStore>,
}

impl UpsertResolver {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// 新建或更新实体
    ///
    /// # 参数
    /// - ctx: 运行上下文（提供目标类型与主键名）
    /// - record: 已映射属性集（必含主键）
    pub async fn upsert(
        &self,
        ctx: &RunContext,
        record: MappedRecord,
    ) -> RepositoryResult<UpsertOutcome> {
        let primary_key = ctx.primary_key();
        let key_value = record.get(primary_key).ok_or_else(|| {
            RepositoryError::ValidationError(format!("缺少主键属性: {}", primary_key))
        })?;

        let mut filter = AttributeSet::new();
        filter.insert(primary_key.to_string(), key_value.to_string());

        match self.store.find_one(ctx.target_type(), &filter).await? {
            Some(existing) => {
                let updated = self.store.update(&existing, record.attributes).await?;
                Ok(UpsertOutcome::Updated(updated))
            }
            None => {
                let created = self
                    .store
                    .create(ctx.target_type(), record.attributes)
                    .await?;
                Ok(UpsertOutcome::Created(created))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::EntityTypeDef;
    use crate::repository::entity_store_impl::SqliteEntityStore;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn setup_store() -> Arc<SqliteEntityStore> {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        Arc::new(SqliteEntityStore::from_connection(Arc::new(Mutex::new(conn))))
    }

    fn ctx() -> RunContext {
        RunContext::resolve(
            "job-1",
            EntityTypeDef {
                name: "Pet".to_string(),
                primary_key: "id".to_string(),
                field_mapping: Default::default(),
                relation_specs: Default::default(),
                relations: Vec::new(),
            },
        )
    }

    fn record(pairs: &[(&str, &str)]) -> MappedRecord {
        MappedRecord {
            attributes: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates() {
        let store = setup_store();
        let resolver = UpsertResolver::new(store.clone());
        let ctx = ctx();

        let first = resolver
            .upsert(&ctx, record(&[("id", "1"), ("name", "A"), ("age", "2")]))
            .await
            .unwrap();
        assert!(!first.is_update());

        let second = resolver
            .upsert(&ctx, record(&[("id", "1"), ("name", "B")]))
            .await
            .unwrap();
        assert!(second.is_update());
        assert_eq!(second.entity().id, first.entity().id);
        assert_eq!(second.entity().attribute("name"), Some("B"));
        // 未出现在本行的属性保持原值
        assert_eq!(second.entity().attribute("age"), Some("2"));

        assert_eq!(store.count("Pet").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_missing_primary_key() {
        let store = setup_store();
        let resolver = UpsertResolver::new(store.clone());

        let result = resolver.upsert(&ctx(), record(&[("name", "A")])).await;
        assert!(matches!(result, Err(RepositoryError::ValidationError(_))));
        assert_eq!(store.count("Pet").await.unwrap(), 0);
    }
}
