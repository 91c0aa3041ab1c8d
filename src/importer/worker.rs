// ==========================================
// 批量导入引擎 - 隔离 Worker
// ==========================================
// 职责: 以可序列化参数启动一次导入运行
// 红线: 调用方与 worker 之间只传递 RunParams 的 JSON，不共享连接/句柄
// 执行方式:
// - TaskExecutor: 独立 tokio 任务，自行打开数据库连接
// - ProcessExecutor: 子进程 `record-import worker`，payload 经 stdin 传入
// 故障: 致命错误经 WorkerFault 通道上报，与行级错误分离
// ==========================================

use crate::config::{ConfigManager, EntityTypeRegistry, ImportConfigReader};
use crate::db::open_sqlite_connection;
use crate::domain::import_job::RunReport;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::FieldMapper;
use crate::importer::importer_trait::WorkerExecutor;
use crate::importer::record_importer::RecordImporter;
use crate::repository::entity_store_impl::SqliteEntityStore;
use crate::repository::import_job_repo_impl::SqliteImportJobRepository;
use crate::storage::{staged_path, LocalStagingStorage, StagingStorage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

// ==========================================
// RunParams - 运行参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParams {
    pub target_type: String,     // 目标实体类型名
    pub job_id: String,          // 任务 ID
    pub storage_root: String,    // 暂存根目录
    pub container: String,       // 容器名
    pub file_name: String,       // 文件名
    pub job_record_type: String, // 任务记录类型名
    pub container_type: String,  // 容器记录类型名
    pub db_path: String,         // 数据库文件路径
}

impl RunParams {
    pub fn to_payload(&self) -> ImportResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_payload(payload: &str) -> ImportResult<Self> {
        Ok(serde_json::from_str(payload.trim())?)
    }

    pub fn file_path(&self) -> PathBuf {
        staged_path(&self.storage_root, &self.container, &self.file_name)
    }
}

// ==========================================
// WorkerFault - 致命故障
// ==========================================
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("worker 故障 (job_id={job_id}): {message}")]
pub struct WorkerFault {
    pub job_id: String,
    pub message: String,
}

impl WorkerFault {
    pub fn new(job_id: &str, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.to_string(),
            message: message.into(),
        }
    }
}

/// 故障通道容量；接收端未消费时超出部分只记日志
pub const FAULT_CHANNEL_CAPACITY: usize = 64;

/// 故障上报通道
pub type FaultSender = mpsc::Sender<WorkerFault>;
pub type FaultReceiver = mpsc::Receiver<WorkerFault>;

pub fn fault_channel() -> (FaultSender, FaultReceiver) {
    mpsc::channel(FAULT_CHANNEL_CAPACITY)
}

fn report_fault(fault_tx: &Option<FaultSender>, fault: &WorkerFault) {
    error!(job_id = %fault.job_id, message = %fault.message, "worker 致命故障");
    if let Some(tx) = fault_tx {
        if let Err(e) = tx.try_send(fault.clone()) {
            warn!(job_id = %fault.job_id, error = %e, "故障未投递到通道");
        }
    }
}

// ==========================================
// WorkerHandle
// ==========================================
pub struct WorkerHandle {
    job_id: String,
    handle: JoinHandle<Result<RunReport, WorkerFault>>,
}

impl WorkerHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// 等待 worker 结束
    pub async fn wait(self) -> Result<RunReport, WorkerFault> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(WorkerFault::new(&self.job_id, format!("worker 异常退出: {}", e))),
        }
    }
}

// ==========================================
// run_worker - worker 入口
// ==========================================

/// 按 payload 执行一次导入运行
///
/// 所有依赖（数据库连接、配置、实体类型）均由 payload 重新推导
pub async fn run_worker(payload: &str) -> ImportResult<RunReport> {
    let params = RunParams::from_payload(payload)?;
    let job_id = params.job_id.as_str();
    info!(job_id = %job_id, target_type = %params.target_type, "worker 启动");

    let conn = open_sqlite_connection(&params.db_path)
        .map_err(|e| ImportError::fatal(job_id, format!("数据库打开失败: {}", e)))?;
    let conn = Arc::new(Mutex::new(conn));

    let config = ConfigManager::from_connection(conn.clone())
        .map_err(|e| ImportError::fatal(job_id, e.to_string()))?;

    verify_collaborators(&config, &params).await?;

    let entity_type = config
        .get_entity_type(&params.target_type)
        .await
        .map_err(|e| ImportError::fatal(job_id, e.to_string()))?
        .ok_or_else(|| {
            ImportError::fatal(job_id, format!("实体类型未注册: {}", params.target_type))
        })?;

    let row_buffer_size = config
        .get_row_buffer_size()
        .await
        .map_err(|e| ImportError::fatal(job_id, e.to_string()))?;
    let cleanup = config
        .get_cleanup_container_after_run()
        .await
        .map_err(|e| ImportError::fatal(job_id, e.to_string()))?;

    let importer = RecordImporter::new(
        Arc::new(SqliteEntityStore::from_connection(conn.clone())),
        Arc::new(SqliteImportJobRepository::from_connection(conn)),
        Arc::new(FieldMapper),
        row_buffer_size,
    );

    let report = importer
        .run(job_id, &entity_type, &params.file_path())
        .await?;

    if cleanup {
        let storage = LocalStagingStorage::new(params.storage_root.clone());
        if let Err(e) = storage.destroy_container(&params.container).await {
            warn!(job_id = %job_id, container = %params.container, error = %e, "暂存容器清理失败");
        }
    }

    Ok(report)
}

/// 协作方类型名必须与当前配置一致
async fn verify_collaborators(config: &ConfigManager, params: &RunParams) -> ImportResult<()> {
    let job_id = params.job_id.as_str();

    let job_record_type = config
        .get_job_record_type()
        .await
        .map_err(|e| ImportError::fatal(job_id, e.to_string()))?;
    if job_record_type != params.job_record_type {
        return Err(ImportError::fatal(
            job_id,
            format!(
                "任务记录类型不一致: 配置={}, 参数={}",
                job_record_type, params.job_record_type
            ),
        ));
    }

    let container_type = config
        .get_container_type()
        .await
        .map_err(|e| ImportError::fatal(job_id, e.to_string()))?;
    if container_type != params.container_type {
        return Err(ImportError::fatal(
            job_id,
            format!(
                "容器记录类型不一致: 配置={}, 参数={}",
                container_type, params.container_type
            ),
        ));
    }

    Ok(())
}

/// worker 内的任何错误都视为致命：payload 无法解析时 job_id 取调用方给出的值
fn to_fault(job_id: &str, err: ImportError) -> WorkerFault {
    match err {
        ImportError::Fatal { job_id, message } => WorkerFault { job_id, message },
        other => WorkerFault::new(job_id, other.to_string()),
    }
}

// ==========================================
// TaskExecutor - 独立 tokio 任务
// ==========================================
#[derive(Default)]
pub struct TaskExecutor {
    fault_tx: Option<FaultSender>,
}

impl TaskExecutor {
    pub fn new(fault_tx: Option<FaultSender>) -> Self {
        Self { fault_tx }
    }
}

#[async_trait]
impl WorkerExecutor for TaskExecutor {
    async fn dispatch(&self, job_id: &str, payload: String) -> ImportResult<WorkerHandle> {
        let fault_tx = self.fault_tx.clone();
        let task_job_id = job_id.to_string();

        let handle = tokio::spawn(async move {
            match run_worker(&payload).await {
                Ok(report) => Ok(report),
                Err(e) => {
                    let fault = to_fault(&task_job_id, e);
                    report_fault(&fault_tx, &fault);
                    Err(fault)
                }
            }
        });

        Ok(WorkerHandle {
            job_id: job_id.to_string(),
            handle,
        })
    }
}

// ==========================================
// ProcessExecutor - 子进程
// ==========================================
// 协议: stdin 写入 payload；成功时 stdout 最后一行为 RunReport JSON；
//       非零退出码即致命故障
pub struct ProcessExecutor {
    program: PathBuf,
    args: Vec<String>,
    fault_tx: Option<FaultSender>,
}

impl ProcessExecutor {
    pub fn new(program: PathBuf, args: Vec<String>, fault_tx: Option<FaultSender>) -> Self {
        Self {
            program,
            args,
            fault_tx,
        }
    }
}

#[async_trait]
impl WorkerExecutor for ProcessExecutor {
    async fn dispatch(&self, job_id: &str, payload: String) -> ImportResult<WorkerHandle> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| ImportError::WorkerSpawn(e.to_string()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ImportError::WorkerSpawn("子进程 stdin 不可用".to_string()))?;
        stdin
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| ImportError::WorkerSpawn(e.to_string()))?;
        drop(stdin);

        info!(job_id = %job_id, pid = ?child.id(), "worker 子进程已启动");

        let fault_tx = self.fault_tx.clone();
        let task_job_id = job_id.to_string();
        let handle = tokio::spawn(async move {
            let result = match child.wait_with_output().await {
                Ok(output) if output.status.success() => {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    parse_report(&task_job_id, &stdout)
                }
                Ok(output) => Err(WorkerFault::new(
                    &task_job_id,
                    format!("worker 子进程退出: {}", output.status),
                )),
                Err(e) => Err(WorkerFault::new(
                    &task_job_id,
                    format!("等待 worker 子进程失败: {}", e),
                )),
            };

            if let Err(fault) = &result {
                report_fault(&fault_tx, fault);
            }
            result
        });

        Ok(WorkerHandle {
            job_id: job_id.to_string(),
            handle,
        })
    }
}

fn parse_report(job_id: &str, stdout: &str) -> Result<RunReport, WorkerFault> {
    let line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| WorkerFault::new(job_id, "worker 未输出运行汇总"))?;
    serde_json::from_str(line)
        .map_err(|e| WorkerFault::new(job_id, format!("运行汇总解析失败: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RunParams {
        RunParams {
            target_type: "Pet".to_string(),
            job_id: "job-1".to_string(),
            storage_root: "/data/containers".to_string(),
            container: "c1".to_string(),
            file_name: "pets.csv".to_string(),
            job_record_type: "import_job".to_string(),
            container_type: "import_container".to_string(),
            db_path: "/data/record_import.db".to_string(),
        }
    }

    #[test]
    fn test_payload_is_plain_json() {
        let payload = params().to_payload().unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["container"], "c1");

        let decoded = RunParams::from_payload(&format!("{}\n", payload)).unwrap();
        assert_eq!(decoded, params());
        assert_eq!(
            decoded.file_path(),
            PathBuf::from("/data/containers/c1/pets.csv")
        );
    }

    #[test]
    fn test_invalid_payload() {
        assert!(matches!(
            RunParams::from_payload("{\"job_id\": 1}"),
            Err(ImportError::InvalidRunParams(_))
        ));
    }

    #[test]
    fn test_parse_report_uses_last_line() {
        let report = RunReport {
            job_id: "job-1".to_string(),
            rows_read: 3,
            created: 2,
            ..Default::default()
        };
        let stdout = format!("noise\n{}\n\n", serde_json::to_string(&report).unwrap());
        assert_eq!(parse_report("job-1", &stdout).unwrap(), report);
        assert!(parse_report("job-1", "").is_err());
    }

    #[tokio::test]
    async fn test_task_executor_reports_fault() {
        let (tx, mut rx) = fault_channel();
        let executor = TaskExecutor::new(Some(tx));

        let handle = executor
            .dispatch("job-x", "not json".to_string())
            .await
            .unwrap();
        let fault = handle.wait().await.unwrap_err();

        assert_eq!(fault.job_id, "job-x");
        assert_eq!(rx.recv().await, Some(fault));
    }

    #[tokio::test]
    async fn test_fault_channel_is_bounded() {
        let (tx, mut rx) = fault_channel();
        let fault_tx = Some(tx);

        for i in 0..FAULT_CHANNEL_CAPACITY + 5 {
            report_fault(&fault_tx, &WorkerFault::new(&format!("job-{}", i), "boom"));
        }

        // 超出容量的故障被丢弃，不阻塞上报方
        let mut received = Vec::new();
        while let Ok(fault) = rx.try_recv() {
            received.push(fault.job_id);
        }
        assert_eq!(received.len(), FAULT_CHANNEL_CAPACITY);
        assert_eq!(received[0], "job-0");

        // 接收端关闭后上报同样不报错
        rx.close();
        report_fault(&fault_tx, &WorkerFault::new("job-late", "boom"));
        assert!(rx.try_recv().is_err());
    }
}
