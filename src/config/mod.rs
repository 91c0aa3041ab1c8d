// ==========================================
// 批量导入引擎 - 配置层
// ==========================================
// 职责: 导入参数与实体类型注册表
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod import_config_trait;

// 重导出核心配置管理器
pub use config_manager::{
    config_keys, default_storage_root, ConfigManager, DEFAULT_CONTAINER_TYPE,
    DEFAULT_JOB_RECORD_TYPE,
};
pub use import_config_trait::{EntityTypeRegistry, ImportConfigReader};
