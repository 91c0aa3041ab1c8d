// ==========================================
// 批量导入引擎 - 命令行入口
// ==========================================
// 子命令:
// - init-db       初始化数据库
// - register-type 注册实体类型（JSON 文件）
// - types         列出已注册的实体类型
// - import        开始导入（可选等待完成）
// - worker        隔离 worker（stdin 读取运行参数，stdout 输出运行汇总）
// - job           查询任务记录
// - jobs          列出最近的任务记录
// ==========================================

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use record_import::api::StartImportRequest;
use record_import::app::{get_default_db_path, AppState, ExecutorKind};
use record_import::config::ConfigManager;
use record_import::db::{init_schema, open_sqlite_connection};
use record_import::domain::EntityTypeDef;
use record_import::importer::run_worker;
use record_import::logging;
use std::io::Write;
use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;

#[derive(Parser)]
#[command(name = "record-import")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "批量导入引擎 - 分隔文件流式导入、Upsert 与关联解析")]
#[command(long_about = None)]
struct Cli {
    /// 数据库文件路径
    #[arg(long, global = true, env = "RECORD_IMPORT_DB_PATH")]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 初始化数据库
    InitDb,
    /// 注册实体类型（JSON 定义文件）
    RegisterType {
        /// 实体类型定义文件
        file: PathBuf,
    },
    /// 列出已注册的实体类型
    Types,
    /// 开始导入
    Import {
        /// 目标实体类型名
        #[arg(long = "type")]
        target_type: String,
        /// 源文件
        #[arg(long)]
        file: PathBuf,
        /// 声明的内容类型
        #[arg(long, default_value = "text/csv")]
        content_type: String,
        /// 等待处理完成并输出运行汇总
        #[arg(long)]
        wait: bool,
        /// 在当前进程内运行 worker（默认使用子进程）
        #[arg(long)]
        in_process: bool,
    },
    /// 隔离 worker（内部使用）
    Worker,
    /// 查询任务记录
    Job {
        /// 任务 ID
        job_id: String,
    },
    /// 列出最近的任务记录
    Jobs {
        /// 返回条数
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

// worker 致命故障退出码
const EXIT_WORKER_FAULT: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Worker) {
        logging::init_json();
        process::exit(worker_main().await);
    }

    logging::init();
    if let Err(e) = run(cli).await {
        tracing::error!("{:#}", e);
        eprintln!("错误: {:#}", e);
        process::exit(1);
    }
}

async fn worker_main() -> i32 {
    let mut payload = String::new();
    if let Err(e) = tokio::io::stdin().read_to_string(&mut payload).await {
        tracing::error!(error = %e, "读取运行参数失败");
        return EXIT_WORKER_FAULT;
    }

    match run_worker(&payload).await {
        Ok(report) => match serde_json::to_string(&report) {
            Ok(json) => {
                // 启动方未等待时 stdout 可能已关闭，任务记录已落库
                if let Err(e) = writeln!(std::io::stdout(), "{}", json) {
                    tracing::debug!(error = %e, "运行汇总未能输出");
                }
                0
            }
            Err(e) => {
                tracing::error!(error = %e, "运行汇总序列化失败");
                EXIT_WORKER_FAULT
            }
        },
        Err(e) => {
            tracing::error!(error = %e, fatal = e.is_fatal(), "worker 失败");
            EXIT_WORKER_FAULT
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let db_path = cli.db.unwrap_or_else(get_default_db_path);

    match cli.command {
        Commands::InitDb => {
            let conn = open_sqlite_connection(&db_path).context("无法打开数据库")?;
            init_schema(&conn).context("数据库初始化失败")?;
            println!("数据库已初始化: {}", db_path);
        }
        Commands::RegisterType { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("无法读取 {}", file.display()))?;
            let def: EntityTypeDef = serde_json::from_str(&json).context("实体类型定义无效")?;

            let conn = open_sqlite_connection(&db_path).context("无法打开数据库")?;
            init_schema(&conn).context("数据库初始化失败")?;
            let config = ConfigManager::from_connection(Arc::new(Mutex::new(conn)))?;
            config.register_entity_type(&def)?;
            println!("实体类型已注册: {}", def.name);
        }
        Commands::Types => {
            let state = AppState::new(db_path, ExecutorKind::Task)
                .await
                .map_err(anyhow::Error::msg)?;
            for name in state.config.list_entity_types()? {
                println!("{}", name);
            }
        }
        Commands::Import {
            target_type,
            file,
            content_type,
            wait,
            in_process,
        } => {
            let executor = if in_process {
                ExecutorKind::Task
            } else {
                ExecutorKind::current_exe().map_err(anyhow::Error::msg)?
            };
            let state = AppState::new(db_path, executor)
                .await
                .map_err(anyhow::Error::msg)?;

            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .context("源文件路径缺少文件名")?;
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("无法读取 {}", file.display()))?;

            let started = state
                .import_api
                .start_import(
                    StartImportRequest {
                        target_type,
                        file_name,
                        content_type,
                        bytes,
                    },
                    None,
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&started.staging)?);

            if wait {
                match started.worker.wait().await {
                    Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                    Err(fault) => bail!("导入失败: {}", fault),
                }
            }
        }
        Commands::Worker => bail!("worker 子命令需单独运行"),
        Commands::Job { job_id } => {
            let state = AppState::new(db_path, ExecutorKind::Task)
                .await
                .map_err(anyhow::Error::msg)?;
            let job = state.import_api.get_job(&job_id).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Commands::Jobs { limit } => {
            let state = AppState::new(db_path, ExecutorKind::Task)
                .await
                .map_err(anyhow::Error::msg)?;
            for job in state.import_api.list_recent_jobs(limit).await? {
                println!(
                    "{}\t{}\t{}\t{}\twarnings={}\terrors={}",
                    job.job_id,
                    job.target_type,
                    job.status,
                    job.created_at.to_rfc3339(),
                    job.warnings.len(),
                    job.errors.len()
                );
            }
        }
    }

    Ok(())
}
