//! 审计日志服务 - 业务能力层
//!
//! 只负责"追加写审计文件"能力，不关心流程

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::debug;

use crate::error::FileError;
use crate::models::invoice::UNKNOWN;
use crate::models::InvoiceFields;

/// 已作废发票日志文件名
pub const CANCELLED_LOG: &str = "notas_canceladas.log";
/// 处理错误日志文件名
pub const ERROR_LOG: &str = "erros_processamento.log";

/// 审计日志
///
/// 职责：
/// - 作废发票写入 `notas_canceladas.log`
/// - 行 / 月份处理错误写入 `erros_processamento.log`
/// - 每行格式 `YYYY-mm-dd HH:MM:SS - 消息`
///
/// 每次运行构建一次，显式传给需要它的组件。
#[derive(Debug, Clone)]
pub struct AuditLog {
    cancelled_path: PathBuf,
    error_path: PathBuf,
}

impl AuditLog {
    /// 在日志目录下创建（目录不存在时自动创建）
    pub fn open(log_dir: impl AsRef<Path>) -> Result<Self, FileError> {
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir).map_err(|source| FileError::CreateDirFailed {
            path: log_dir.to_path_buf(),
            source,
        })?;
        Ok(Self::with_paths(
            log_dir.join(CANCELLED_LOG),
            log_dir.join(ERROR_LOG),
        ))
    }

    /// 使用自定义文件路径创建
    pub fn with_paths(cancelled_path: impl Into<PathBuf>, error_path: impl Into<PathBuf>) -> Self {
        Self {
            cancelled_path: cancelled_path.into(),
            error_path: error_path.into(),
        }
    }

    pub fn cancelled_path(&self) -> &Path {
        &self.cancelled_path
    }

    pub fn error_path(&self) -> &Path {
        &self.error_path
    }

    /// 记录一张作废发票
    pub fn record_cancelled(&self, month: &str, fields: &InvoiceFields) -> Result<(), FileError> {
        let msg = format!(
            "Nota cancelada - Mes: {} | Numero: {} | Data: {} | Valor: {}",
            month, fields.number, fields.date, fields.value
        );
        append_line(&self.cancelled_path, &msg)
    }

    /// 记录单行处理失败，标识不完整时以 `unknown` 代替
    pub fn record_row_error(
        &self,
        month: &str,
        fields: Option<&InvoiceFields>,
        cause: &str,
    ) -> Result<(), FileError> {
        let (number, date, value) = match fields {
            Some(f) => (f.number.as_str(), f.date.as_str(), f.value.as_str()),
            None => (UNKNOWN, UNKNOWN, UNKNOWN),
        };
        let msg = format!(
            "Erro ao processar nota - Mes: {} | Numero: {} | Data: {} | Valor: {} | Erro: {}",
            month, number, date, value, cause
        );
        append_line(&self.error_path, &msg)
    }

    /// 记录任意错误信息（月份 / 页面级别）
    pub fn record_error(&self, message: &str) -> Result<(), FileError> {
        append_line(&self.error_path, message)
    }
}

fn append_line(path: &Path, message: &str) -> Result<(), FileError> {
    debug!("写入审计日志 {}: {}", path.display(), message);

    let wrap = |source| FileError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(wrap)?;

    let line = format!(
        "{} - {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        message
    );
    file.write_all(line.as_bytes()).map_err(wrap)
}
