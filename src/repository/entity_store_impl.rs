// ==========================================
// 批量导入引擎 - 宿主实体存储实现
// ==========================================
// 职责: 使用 rusqlite 实现 EntityStore
// 存储: entity_record（属性 JSON）+ entity_relation（关联链接）
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::entity::{AttributeSet, Entity, RelationDecl};
use crate::repository::entity_store::EntityStore;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// SqliteEntityStore
// ==========================================
pub struct SqliteEntityStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEntityStore {
    /// 打开数据库文件创建 Store
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    /// 从已有连接创建 Store
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn load_by_id(conn: &Connection, id: i64) -> RepositoryResult<Option<Entity>> {
        let row = conn
            .query_row(
                "SELECT id, entity_type, attributes_json FROM entity_record WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, entity_type, json)| to_entity(id, entity_type, &json))
            .transpose()
    }
}

fn to_entity(id: i64, entity_type: String, attributes_json: &str) -> RepositoryResult<Entity> {
    let attributes: AttributeSet = serde_json::from_str(attributes_json)?;
    Ok(Entity {
        entity_type,
        id,
        attributes,
    })
}

#[async_trait]
impl EntityStore for SqliteEntityStore {
    async fn find_one(
        &self,
        entity_type: &str,
        filter: &AttributeSet,
    ) -> RepositoryResult<Option<Entity>> {
        if filter.is_empty() {
            return Ok(None);
        }

        // 属性名按 json_each.key 原样比较，不经 JSON 路径解析（属性名可含引号/点号）
        let mut sql = String::from(
            "SELECT e.id, e.entity_type, e.attributes_json FROM entity_record e WHERE e.entity_type = ?",
        );
        let mut args: Vec<String> = vec![entity_type.to_string()];
        for (attribute, value) in filter {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM json_each(e.attributes_json) j WHERE j.key = ? AND j.value = ?)",
            );
            args.push(attribute.clone());
            args.push(value.clone());
        }
        sql.push_str(" ORDER BY e.id LIMIT 1");

        let conn = self.get_conn()?;
        let row = conn
            .query_row(&sql, params_from_iter(args.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .optional()?;

        row.map(|(id, entity_type, json)| to_entity(id, entity_type, &json))
            .transpose()
    }

    async fn create(&self, entity_type: &str, attributes: AttributeSet) -> RepositoryResult<Entity> {
        let json = serde_json::to_string(&attributes)?;
        let now = Utc::now().to_rfc3339();

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO entity_record (entity_type, attributes_json, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            "#,
            params![entity_type, json, now],
        )?;

        Ok(Entity {
            entity_type: entity_type.to_string(),
            id: conn.last_insert_rowid(),
            attributes,
        })
    }

    async fn update(&self, entity: &Entity, attributes: AttributeSet) -> RepositoryResult<Entity> {
        let conn = self.get_conn()?;

        // 以存储中的最新值为基准合并，避免覆盖调用方未持有的字段
        let current = Self::load_by_id(&conn, entity.id)?.ok_or_else(|| {
            RepositoryError::NotFound {
                entity: entity.entity_type.clone(),
                id: entity.id.to_string(),
            }
        })?;

        let mut merged = current.attributes;
        merged.extend(attributes);
        let json = serde_json::to_string(&merged)?;

        conn.execute(
            "UPDATE entity_record SET attributes_json = ?1, updated_at = ?2 WHERE id = ?3",
            params![json, Utc::now().to_rfc3339(), entity.id],
        )?;

        Ok(Entity {
            entity_type: current.entity_type,
            id: entity.id,
            attributes: merged,
        })
    }

    async fn count(&self, entity_type: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entity_record WHERE entity_type = ?1",
            params![entity_type],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    async fn find_related_by_id(
        &self,
        entity: &Entity,
        relation: &str,
        target_id: i64,
    ) -> RepositoryResult<Option<Entity>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT r.id, r.entity_type, r.attributes_json
                FROM entity_relation l
                JOIN entity_record r ON r.id = l.target_id
                WHERE l.entity_type = ?1 AND l.entity_id = ?2
                  AND l.relation = ?3 AND l.target_id = ?4
                "#,
                params![entity.entity_type, entity.id, relation, target_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, entity_type, json)| to_entity(id, entity_type, &json))
            .transpose()
    }

    async fn list_related(&self, entity: &Entity, relation: &str) -> RepositoryResult<Vec<Entity>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT r.id, r.entity_type, r.attributes_json
            FROM entity_relation l
            JOIN entity_record r ON r.id = l.target_id
            WHERE l.entity_type = ?1 AND l.entity_id = ?2 AND l.relation = ?3
            ORDER BY l.rowid
            "#,
        )?;

        let rows = stmt.query_map(params![entity.entity_type, entity.id, relation], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut related = Vec::new();
        for row in rows {
            let (id, entity_type, json) = row?;
            related.push(to_entity(id, entity_type, &json)?);
        }
        Ok(related)
    }

    async fn add_related(
        &self,
        entity: &Entity,
        relation: &RelationDecl,
        target: &Entity,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR IGNORE INTO entity_relation (
                entity_type, entity_id, relation, target_type, target_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                entity.entity_type,
                entity.id,
                relation.name,
                target.entity_type,
                target.id,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn set_reference(
        &self,
        entity: &Entity,
        relation: &RelationDecl,
        target: &Entity,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            "DELETE FROM entity_relation WHERE entity_type = ?1 AND entity_id = ?2 AND relation = ?3",
            params![entity.entity_type, entity.id, relation.name],
        )?;
        tx.execute(
            r#"
            INSERT INTO entity_relation (
                entity_type, entity_id, relation, target_type, target_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                entity.entity_type,
                entity.id,
                relation.name,
                target.entity_type,
                target.id,
                Utc::now().to_rfc3339(),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }
}
