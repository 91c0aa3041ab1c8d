// ==========================================
// 批量导入引擎 - 上传暂存层
// ==========================================
// 职责: 接收上传文件并落地到命名容器，供 worker 按坐标读取
// ==========================================

pub mod staging;

pub use staging::{
    staged_path, LocalStagingStorage, StagedFile, StagingError, StagingStorage, UploadFile,
};
