//! 发票行处理上下文
//!
//! 封装"我正在处理哪个月份第几页的第几行"这一信息

use std::fmt::Display;

use crate::models::Month;

/// 发票行处理上下文
#[derive(Debug, Clone, Copy)]
pub struct RowCtx {
    /// 月份
    pub month: Month,

    /// 页码（从1开始）
    pub page: usize,

    /// 行在当前页中的索引（从1开始）
    pub row_index: usize,

    /// 当前页的总行数（仅用于日志显示）
    pub total_rows: usize,
}

impl RowCtx {
    /// 创建新的行上下文
    pub fn new(month: Month, page: usize, row_index: usize, total_rows: usize) -> Self {
        Self {
            month,
            page,
            row_index,
            total_rows,
        }
    }

    /// 月份文件夹名
    pub fn month_label(&self) -> &'static str {
        self.month.label()
    }
}

impl Display for RowCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[月份 {} 第{}页 {}/{}]",
            self.month.label(),
            self.page,
            self.row_index,
            self.total_rows
        )
    }
}
