//! 发票行处理流程 - 流程层
//!
//! 核心职责：定义"一行发票"的完整处理流程
//!
//! 流程顺序：
//! 1. 作废 → 写入作废日志，结束
//! 2. 提取字段 → 触发打印保存 → 等待 → 归档
//! 3. 任何一步出错 → 写入错误日志（兜底），继续下一行

use std::path::PathBuf;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::AppResult;
use crate::models::invoice::UNKNOWN;
use crate::models::InvoiceFields;
use crate::portal::InvoiceRow;
use crate::services::{AuditLog, DownloadReconciler, ReconcileOutcome};
use crate::workflow::row_ctx::RowCtx;

/// 单行处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// 已归档
    Filed(PathBuf),
    /// 目标文件已存在，下载被丢弃
    Duplicate(PathBuf),
    /// 触发后没有出现下载文件
    NoFile,
    /// 作废发票，只记录审计日志
    Cancelled(InvoiceFields),
    /// 处理失败（已记录到错误日志）
    Failed(String),
}

/// 发票行处理流程
///
/// - 编排单行的完整处理流程
/// - 错误在行内消化，绝不向上传播
/// - 不持有任何资源（page）
pub struct RowProcessor {
    reconciler: DownloadReconciler,
    audit: AuditLog,
    download_settle: Duration,
}

impl RowProcessor {
    /// 创建新的行处理流程
    pub fn new(reconciler: DownloadReconciler, audit: AuditLog, download_settle: Duration) -> Self {
        Self {
            reconciler,
            audit,
            download_settle,
        }
    }

    pub async fn process(&self, row: &InvoiceRow<'_>, ctx: &RowCtx) -> RowOutcome {
        let mut known: Option<InvoiceFields> = None;

        match self.run(row, ctx, &mut known).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let number = known.as_ref().map_or(UNKNOWN, |f| f.number.as_str());
                error!("{} ✗ 处理发票 {} 失败: {}", ctx, number, e);

                let cause = e.to_string();
                if let Err(write_err) =
                    self.audit
                        .record_row_error(ctx.month_label(), known.as_ref(), &cause)
                {
                    warn!("{} ⚠️ 写入错误日志失败: {}", ctx, write_err);
                }
                RowOutcome::Failed(cause)
            }
        }
    }

    async fn run(
        &self,
        row: &InvoiceRow<'_>,
        ctx: &RowCtx,
        known: &mut Option<InvoiceFields>,
    ) -> AppResult<RowOutcome> {
        if row.is_cancelled().await? {
            let fields = row.audit_fields().await?;
            *known = Some(fields.clone());
            info!("{} 🚫 作废发票，跳过下载: {}", ctx, fields);
            self.audit.record_cancelled(ctx.month_label(), &fields)?;
            return Ok(RowOutcome::Cancelled(fields));
        }

        let fields = row.fields().await?;
        *known = Some(fields.clone());
        info!("{} 📄 {}", ctx, fields);

        row.trigger_download().await?;
        sleep(self.download_settle).await;

        let outcome = match self.reconciler.reconcile(ctx.month_label(), &fields)? {
            ReconcileOutcome::Filed(path) => RowOutcome::Filed(path),
            ReconcileOutcome::Duplicate(path) => RowOutcome::Duplicate(path),
            ReconcileOutcome::NoOp => {
                info!("{} 📭 未找到发票 {} 的下载文件", ctx, fields.number);
                RowOutcome::NoFile
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Month;
    use crate::testing::ScriptedDialect;
    use std::fs;
    use tempfile::TempDir;

    fn processor(dir: &TempDir) -> RowProcessor {
        RowProcessor::new(
            DownloadReconciler::new(dir.path().join("notas_fiscais")),
            AuditLog::open(dir.path().join("logs")).unwrap(),
            Duration::ZERO,
        )
    }

    fn ctx() -> RowCtx {
        RowCtx::new(Month::Junho, 1, 1, 1)
    }

    #[tokio::test]
    async fn test_active_row_is_filed() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("notas_fiscais");
        fs::create_dir_all(&root).unwrap();
        let dialect = ScriptedDialect::new(&root).page(vec![ScriptedDialect::active(
            "123",
            "01/06/2025",
            "1.500,00",
        )]);

        let handles = dialect.page_handles(0);
        let row = InvoiceRow::new(&dialect, handles[0].clone());
        let outcome = processor(&dir).process(&row, &ctx()).await;

        assert_eq!(
            outcome,
            RowOutcome::Filed(root.join("Junho").join("01_06_2025_123_1500_00.pdf"))
        );
        assert_eq!(dialect.downloads(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_row_never_downloads() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("notas_fiscais");
        let dialect = ScriptedDialect::new(&root).page(vec![ScriptedDialect::cancelled(
            "77",
            "02/06/2025",
            "10,00",
        )]);

        let handles = dialect.page_handles(0);
        let row = InvoiceRow::new(&dialect, handles[0].clone());
        let outcome = processor(&dir).process(&row, &ctx()).await;

        assert!(matches!(outcome, RowOutcome::Cancelled(ref f) if f.number == "77"));
        assert_eq!(dialect.downloads(), 0);
        let log = fs::read_to_string(dir.path().join("logs/notas_canceladas.log")).unwrap();
        assert_eq!(log.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_extraction_failure_is_logged_as_unknown() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("notas_fiscais");
        let dialect = ScriptedDialect::new(&root).page(vec![ScriptedDialect::broken()]);

        let handles = dialect.page_handles(0);
        let row = InvoiceRow::new(&dialect, handles[0].clone());
        let outcome = processor(&dir).process(&row, &ctx()).await;

        assert!(matches!(outcome, RowOutcome::Failed(_)));
        let log = fs::read_to_string(dir.path().join("logs/erros_processamento.log")).unwrap();
        assert!(log.contains("Numero: unknown"));
        assert!(log.contains("Data: unknown"));
    }

    #[tokio::test]
    async fn test_download_failure_logs_extracted_fields() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("notas_fiscais");
        let dialect = ScriptedDialect::new(&root)
            .failing_downloads()
            .page(vec![ScriptedDialect::active("123", "01/06/2025", "1.500,00")]);

        let handles = dialect.page_handles(0);
        let row = InvoiceRow::new(&dialect, handles[0].clone());
        let outcome = processor(&dir).process(&row, &ctx()).await;

        assert!(matches!(outcome, RowOutcome::Failed(_)));
        let log = fs::read_to_string(dir.path().join("logs/erros_processamento.log")).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert!(log.contains("Mes: Junho"));
        assert!(log.contains("Numero: 123"));
        assert!(log.contains("01/06/2025"));
        assert!(log.contains("1500_00"));
        assert!(!root.join("Junho").exists());
    }

    #[tokio::test]
    async fn test_missing_download_is_no_file() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("notas_fiscais");
        let dialect = ScriptedDialect::new(&root)
            .without_files()
            .page(vec![ScriptedDialect::active("5", "03/06/2025", "2,00")]);

        let handles = dialect.page_handles(0);
        let row = InvoiceRow::new(&dialect, handles[0].clone());
        let outcome = processor(&dir).process(&row, &ctx()).await;

        assert_eq!(outcome, RowOutcome::NoFile);
    }
}
