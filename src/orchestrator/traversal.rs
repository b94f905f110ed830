//! 月份 / 页面遍历 - 编排层
//!
//! ## 职责
//!
//! 1. **遍历月份**：按调用方给定的顺序处理每个月份
//! 2. **遍历页面**：处理当前页所有行，然后尝试翻页
//! 3. **错误隔离**：一个月份失败不影响下一个月份
//! 4. **统计输出**：按结果类型计数

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::AppResult;
use crate::models::Month;
use crate::portal::{InvoiceRow, PortalDialect};
use crate::services::AuditLog;
use crate::workflow::{RowCtx, RowOutcome, RowProcessor};

/// 每个月份最多处理的页数
pub const DEFAULT_MAX_PAGES: usize = 500;

/// 遍历统计
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TraversalStats {
    pub months_completed: usize,
    pub months_failed: usize,
    pub pages_visited: usize,
    pub filed: usize,
    pub duplicates: usize,
    pub no_file: usize,
    pub cancelled: usize,
    pub failed: usize,
}

impl TraversalStats {
    fn record(&mut self, outcome: &RowOutcome) {
        match outcome {
            RowOutcome::Filed(_) => self.filed += 1,
            RowOutcome::Duplicate(_) => self.duplicates += 1,
            RowOutcome::NoFile => self.no_file += 1,
            RowOutcome::Cancelled(_) => self.cancelled += 1,
            RowOutcome::Failed(_) => self.failed += 1,
        }
    }

    /// 处理过的行数
    pub fn rows(&self) -> usize {
        self.filed + self.duplicates + self.no_file + self.cancelled + self.failed
    }
}

/// 月份 / 页面遍历引擎
pub struct TraversalEngine<'a> {
    dialect: &'a dyn PortalDialect,
    processor: &'a RowProcessor,
    audit: &'a AuditLog,
    max_pages: usize,
}

impl<'a> TraversalEngine<'a> {
    pub fn new(
        dialect: &'a dyn PortalDialect,
        processor: &'a RowProcessor,
        audit: &'a AuditLog,
    ) -> Self {
        Self {
            dialect,
            processor,
            audit,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// 依次处理所有月份
    pub async fn run(&self, months: &[Month]) -> TraversalStats {
        let mut stats = TraversalStats::default();

        for (index, month) in months.iter().copied().enumerate() {
            log_month_start(month, index + 1, months.len());

            match self.traverse_month(month, &mut stats).await {
                Ok(pages) => {
                    stats.months_completed += 1;
                    info!("[月份 {}] ✅ 月份处理完成，共 {} 页\n", month, pages);
                }
                Err(e) => {
                    stats.months_failed += 1;
                    error!("[月份 {}] ✗ 月份处理失败: {}", month, e);
                    let message = format!("Erro ao processar mes {}: {}", month.label(), e);
                    if let Err(write_err) = self.audit.record_error(&message) {
                        warn!("[月份 {}] ⚠️ 写入错误日志失败: {}", month, write_err);
                    }
                }
            }
        }

        stats
    }

    /// 处理单个月份的所有页面，返回处理的页数
    async fn traverse_month(&self, month: Month, stats: &mut TraversalStats) -> AppResult<usize> {
        self.dialect.search_month(month).await?;

        let mut page = 1;
        loop {
            let handles = self.dialect.row_handles().await?;
            stats.pages_visited += 1;

            if handles.is_empty() {
                info!("[月份 {}] 第 {} 页没有发票", month, page);
                break;
            }

            let total = handles.len();
            info!("[月份 {}] 📑 第 {} 页: {} 张发票", month, page, total);

            for handle in handles {
                let ctx = RowCtx::new(month, page, handle.position + 1, total);
                let row = InvoiceRow::new(self.dialect, handle);
                let outcome = self.processor.process(&row, &ctx).await;
                stats.record(&outcome);
            }

            if page >= self.max_pages {
                warn!(
                    "[月份 {}] ⚠️ 已达到每月最大页数 {}，停止翻页",
                    month, self.max_pages
                );
                break;
            }

            if !self.dialect.advance_page().await {
                info!("[月份 {}] 已到最后一页", month);
                break;
            }
            page += 1;
        }

        Ok(page)
    }
}

// ========== 日志辅助函数 ==========

fn log_month_start(month: Month, index: usize, total: usize) {
    info!("\n{}", "─".repeat(40));
    info!("[月份 {}] 开始处理 ({}/{})", month, index, total);
}
