// ==========================================
// 批量导入引擎 - 应用状态
// ==========================================
// 职责: 组装共享连接、配置、仓储与 API 实例
// ==========================================

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::api::ImportApi;
use crate::config::{ConfigManager, ImportConfigReader};
use crate::db::{init_schema, open_sqlite_connection};
use crate::importer::{
    fault_channel, FaultReceiver, IngestionLauncher, ProcessExecutor, TaskExecutor,
    WorkerExecutor,
};
use crate::repository::{ImportJobRepository, SqliteEntityStore, SqliteImportJobRepository};
use crate::storage::LocalStagingStorage;

/// worker 执行方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorKind {
    /// 进程内独立 tokio 任务
    Task,
    /// 子进程: program 需实现 `worker` 协议（stdin 读 payload，stdout 末行输出 RunReport）
    Process { program: PathBuf, args: Vec<String> },
}

impl ExecutorKind {
    /// 以 `<program> worker` 运行的子进程
    pub fn process(program: impl Into<PathBuf>) -> Self {
        ExecutorKind::Process {
            program: program.into(),
            args: vec!["worker".to_string()],
        }
    }

    /// 以当前可执行文件的 `worker` 子命令运行
    ///
    /// 仅当宿主就是 record-import 可执行文件时可用；嵌入其他程序时改用 `process`
    pub fn current_exe() -> Result<Self, String> {
        let program = std::env::current_exe()
            .map_err(|e| format!("无法定位当前可执行文件: {}", e))?;
        Ok(Self::process(program))
    }
}

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 配置管理器（实体类型注册、导入参数）
    pub config: Arc<ConfigManager>,

    /// 宿主实体存储
    pub entity_store: Arc<SqliteEntityStore>,

    /// 导入API
    pub import_api: Arc<ImportApi>,

    /// worker 致命故障通道（由调用方取走并消费）
    pub fault_rx: Option<FaultReceiver>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - executor: worker 执行方式
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    pub async fn new(db_path: String, executor: ExecutorKind) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        // 创建数据库连接（共享连接）
        let conn = open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        init_schema(&conn).map_err(|e| format!("数据库初始化失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository与配置
        // ==========================================
        let config = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let entity_store = Arc::new(SqliteEntityStore::from_connection(conn.clone()));
        let job_repo: Arc<dyn ImportJobRepository> =
            Arc::new(SqliteImportJobRepository::from_connection(conn));

        let storage_root = config
            .get_storage_root()
            .await
            .map_err(|e| format!("无法读取暂存根目录: {}", e))?;
        std::fs::create_dir_all(&storage_root)
            .map_err(|e| format!("无法创建暂存根目录 {}: {}", storage_root, e))?;

        // ==========================================
        // 初始化 worker 执行方式
        // ==========================================
        let (fault_tx, fault_rx) = fault_channel();
        let executor: Arc<dyn WorkerExecutor> = match executor {
            ExecutorKind::Task => Arc::new(TaskExecutor::new(Some(fault_tx))),
            ExecutorKind::Process { program, args } => {
                tracing::info!("worker 子进程: {}", program.display());
                Arc::new(ProcessExecutor::new(program, args, Some(fault_tx)))
            }
        };

        // ==========================================
        // 创建API实例
        // ==========================================
        let launcher = IngestionLauncher::new(
            config.clone(),
            Arc::new(LocalStagingStorage::new(storage_root)),
            job_repo.clone(),
            executor,
            db_path.clone(),
        );
        let import_api = Arc::new(ImportApi::new(launcher, job_repo));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            config,
            entity_store,
            import_api,
            fault_rx: Some(fault_rx),
        })
    }
}

/// 获取默认数据库路径
///
/// 优先使用环境变量 RECORD_IMPORT_DB_PATH，否则为 <数据目录>/record-import/record_import.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("RECORD_IMPORT_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./record_import.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("record-import");
        // 目录创建失败时仍返回该路径，由打开数据库时报告错误
        std::fs::create_dir_all(&dir).ok();
        path = dir.join("record_import.db");
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, StartImportRequest};
    use crate::config::config_keys;
    use crate::domain::EntityTypeDef;
    use tempfile::TempDir;

    #[test]
    fn test_process_kind_runs_worker_subcommand() {
        let kind = ExecutorKind::process("/opt/host/bin/record-import");
        assert_eq!(
            kind,
            ExecutorKind::Process {
                program: PathBuf::from("/opt/host/bin/record-import"),
                args: vec!["worker".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn test_process_kind_uses_given_program() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("state.db").to_string_lossy().to_string();
        {
            let conn = open_sqlite_connection(&db_path).unwrap();
            init_schema(&conn).unwrap();
            let config = ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap();
            config
                .set_global_config_value(
                    config_keys::STORAGE_ROOT,
                    &dir.path().join("containers").to_string_lossy(),
                )
                .unwrap();
            config
                .register_entity_type(&EntityTypeDef {
                    name: "Pet".to_string(),
                    primary_key: "id".to_string(),
                    field_mapping: Default::default(),
                    relation_specs: Default::default(),
                    relations: Vec::new(),
                })
                .unwrap();
        }

        let missing = dir.path().join("no-such-worker");
        let state = AppState::new(db_path, ExecutorKind::process(&missing))
            .await
            .unwrap();

        // 指定程序不存在: 派发失败且不留下任务
        let result = state
            .import_api
            .start_import(
                StartImportRequest {
                    target_type: "Pet".to_string(),
                    file_name: "pets.csv".to_string(),
                    content_type: "text/csv".to_string(),
                    bytes: b"id\n1\n".to_vec(),
                },
                None,
            )
            .await;
        assert!(matches!(result, Err(ApiError::ImportError(_))));
        assert!(state.import_api.list_recent_jobs(5).await.unwrap().is_empty());
    }
}
