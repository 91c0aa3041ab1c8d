// ==========================================
// 批量导入引擎 - API 层
// ==========================================
// 职责: 提供对外操作接口，供命令行与宿主程序调用
// ==========================================

pub mod error;
pub mod import_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use import_api::{
    ImportApi, StagingCallback, StagingResult, StartImportRequest, StartedImport,
};
