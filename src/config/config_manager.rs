// ==========================================
// 批量导入引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、写入；实体类型注册表
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config_trait::{EntityTypeRegistry, ImportConfigReader};
use crate::db::open_sqlite_connection;
use crate::domain::entity::EntityTypeDef;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> RepositoryResult<String> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 注册（或覆盖）实体类型定义
    ///
    /// 校验：主键非空；relation_specs 中未声明的关联仅告警（运行时会被忽略）
    pub fn register_entity_type(&self, def: &EntityTypeDef) -> RepositoryResult<()> {
        if def.name.trim().is_empty() {
            return Err(RepositoryError::ValidationError("实体类型名为空".to_string()));
        }
        if def.primary_key.trim().is_empty() {
            return Err(RepositoryError::ValidationError(format!(
                "实体类型 {} 未指定主键",
                def.name
            )));
        }
        for name in def.relation_specs.keys() {
            if def.declared_relation(name).is_none() {
                tracing::warn!(
                    entity_type = %def.name,
                    relation = %name,
                    "关联配置未在实体类型中声明，导入时将被忽略"
                );
            }
        }

        let value = serde_json::to_string(def)?;
        self.set_global_config_value(&entity_type_key(&def.name), &value)
    }

    /// 列出已注册的实体类型名
    pub fn list_entity_types(&self) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT key FROM config_kv WHERE scope_id = 'global' AND key LIKE 'entity_type/%' ORDER BY key",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut names = Vec::new();
        for row in rows {
            let key = row?;
            if let Some(name) = key.strip_prefix(ENTITY_TYPE_PREFIX) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

const ENTITY_TYPE_PREFIX: &str = "entity_type/";

fn entity_type_key(name: &str) -> String {
    format!("{}{}", ENTITY_TYPE_PREFIX, name.trim())
}

/// 默认暂存根目录（<数据目录>/record-import/containers）
pub fn default_storage_root() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("record-import")
        .join("containers")
        .to_string_lossy()
        .to_string()
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_accepted_content_type(&self) -> RepositoryResult<String> {
        self.get_config_or_default(config_keys::ACCEPTED_CONTENT_TYPE, "text/csv")
    }

    async fn get_row_buffer_size(&self) -> RepositoryResult<usize> {
        let value = self.get_config_or_default(config_keys::ROW_BUFFER_SIZE, "64")?;
        // 0 会导致 mpsc::channel panic
        Ok(value.parse::<usize>().ok().filter(|v| *v > 0).unwrap_or(64))
    }

    async fn get_cleanup_container_after_run(&self) -> RepositoryResult<bool> {
        let value = self.get_config_or_default(config_keys::CLEANUP_CONTAINER_AFTER_RUN, "false")?;
        Ok(matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes"
        ))
    }

    async fn get_storage_root(&self) -> RepositoryResult<String> {
        Ok(self
            .get_config_value(config_keys::STORAGE_ROOT)?
            .unwrap_or_else(default_storage_root))
    }

    async fn get_job_record_type(&self) -> RepositoryResult<String> {
        self.get_config_or_default(config_keys::JOB_RECORD_TYPE, DEFAULT_JOB_RECORD_TYPE)
    }

    async fn get_container_type(&self) -> RepositoryResult<String> {
        self.get_config_or_default(config_keys::CONTAINER_TYPE, DEFAULT_CONTAINER_TYPE)
    }
}

// ==========================================
// EntityTypeRegistry Trait 实现
// ==========================================
#[async_trait]
impl EntityTypeRegistry for ConfigManager {
    async fn get_entity_type(&self, name: &str) -> RepositoryResult<Option<EntityTypeDef>> {
        let raw = match self.get_config_value(&entity_type_key(name))? {
            Some(v) => v,
            None => return Ok(None),
        };

        let def: EntityTypeDef = serde_json::from_str(&raw)?;
        Ok(Some(def))
    }
}

/// 任务记录类型名默认值
pub const DEFAULT_JOB_RECORD_TYPE: &str = "import_job";

/// 暂存容器类型名默认值
pub const DEFAULT_CONTAINER_TYPE: &str = "import_container";

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 上传
    pub const ACCEPTED_CONTENT_TYPE: &str = "import.accepted_content_type";
    pub const STORAGE_ROOT: &str = "import.storage_root";
    pub const CLEANUP_CONTAINER_AFTER_RUN: &str = "import.cleanup_container_after_run";

    // 流式读取
    pub const ROW_BUFFER_SIZE: &str = "import.row_buffer_size";

    // 协作方类型名
    pub const JOB_RECORD_TYPE: &str = "import.job_record_type";
    pub const CONTAINER_TYPE: &str = "import.container_type";
}
