// ==========================================
// 批量导入引擎 - 核心库
// ==========================================
// 技术栈: Rust + Tokio + SQLite
// 定位: 分隔文件批量导入（流式读取、Upsert、关联解析、任务审计）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 导入引擎
pub mod importer;

// 配置层 - 导入参数与实体类型注册
pub mod config;

// 暂存层 - 上传文件落地
pub mod storage;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 对外接口
pub mod api;

// 应用层 - 实例组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{
    AuditEntry, Entity, EntityTypeDef, ImportJob, JobStatus, RelationKind, RunReport,
};

// 导入引擎
pub use importer::{ImportError, IngestionLauncher, RecordImporter, RunParams};

// API
pub use api::{ApiError, ImportApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "批量导入引擎";
