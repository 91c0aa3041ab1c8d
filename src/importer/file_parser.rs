// ==========================================
// 批量导入引擎 - 流式 CSV 读取
// ==========================================
// 职责: 按文件顺序逐行产出原始行，不整体载入内存
// 实现: 阻塞线程读取 CSV，经有界 mpsc 通道交给异步管道
// 规则:
// - 表头去首尾空白；值去首尾空白
// - 完全空白的行跳过
// - 单条记录解码失败 → 行级错误（继续读取）
// - 底层 IO 失败 → 停止读取，finish() 返回错误
// ==========================================

use crate::domain::import_job::RawRow;
use crate::importer::error::{ImportError, ImportResult};
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::path::Path;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// 一条数据行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    pub row_number: usize, // 数据行号（从 1 开始，不含表头）
    pub row: RawRow,
}

/// 单条记录解码失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowReadError {
    pub row_number: usize,
    pub message: String,
}

pub type SourceItem = Result<SourceRow, RowReadError>;

// ==========================================
// CsvRowStream
// ==========================================
pub struct CsvRowStream {
    headers: Vec<String>,
    rx: mpsc::Receiver<SourceItem>,
    reader: JoinHandle<ImportResult<()>>,
}

impl CsvRowStream {
    /// 打开文件并读取表头，随后在后台开始读取数据行
    ///
    /// # 参数
    /// - path: 文件路径
    /// - buffer: 通道容量（读取端最多领先管道 buffer 行）
    pub async fn open(path: &Path, buffer: usize) -> ImportResult<Self> {
        let path = path.to_path_buf();
        let (reader, headers) = tokio::task::spawn_blocking(move || open_reader(&path))
            .await
            .map_err(|e| ImportError::InternalError(format!("CSV 读取任务异常: {}", e)))??;

        let (tx, rx) = mpsc::channel(buffer.max(1));
        let task_headers = headers.clone();
        let reader = tokio::task::spawn_blocking(move || read_rows(reader, &task_headers, tx));

        Ok(Self {
            headers,
            rx,
            reader,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// 下一行；None 表示流结束
    pub async fn next(&mut self) -> Option<SourceItem> {
        self.rx.recv().await
    }

    /// 等待读取端退出，返回其结果（IO 失败在此暴露）
    pub async fn finish(self) -> ImportResult<()> {
        drop(self.rx);
        self.reader
            .await
            .map_err(|e| ImportError::InternalError(format!("CSV 读取任务异常: {}", e)))?
    }
}

fn open_reader(path: &Path) -> ImportResult<(csv::Reader<File>, Vec<String>)> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }

    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true) // 允许行长度不一致
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    Ok((reader, headers))
}

fn to_raw_row(headers: &[String], record: &StringRecord) -> RawRow {
    let mut row = RawRow::new();
    for (col_idx, value) in record.iter().enumerate() {
        if let Some(header) = headers.get(col_idx) {
            row.insert(header.clone(), value.trim().to_string());
        }
    }
    row
}

fn read_rows(
    mut reader: csv::Reader<File>,
    headers: &[String],
    tx: mpsc::Sender<SourceItem>,
) -> ImportResult<()> {
    let mut record = StringRecord::new();
    let mut row_number = 0usize;

    loop {
        let item = match reader.read_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {
                row_number += 1;
                let row = to_raw_row(headers, &record);
                // 跳过完全空白的行
                if row.values().all(|v| v.is_empty()) {
                    continue;
                }
                Ok(SourceRow { row_number, row })
            }
            Err(err) if err.is_io_error() => {
                tracing::error!(row_number = row_number + 1, error = %err, "CSV 读取中断");
                return Err(ImportError::FileReadError(err.to_string()));
            }
            Err(err) => {
                row_number += 1;
                tracing::debug!(row_number, error = %err, "CSV 记录解码失败");
                Err(RowReadError {
                    row_number,
                    message: format!("CSV 解析失败: {}", err),
                })
            }
        };

        if tx.blocking_send(item).is_err() {
            // 接收端已关闭
            break;
        }
    }

    Ok(())
}
