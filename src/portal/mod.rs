//! 门户方言层（Portal）
//!
//! 门户存在两种结构完全不同的结果表格，每种是一个独立的策略，由配置选择：
//! - `DataTablesDialect`：frameset 门户，jQuery DataTables 表格
//! - `AngularDialect`：Angular 单页门户，点击行后显示详情
//!
//! 方言只负责"在页面上找到东西"，不关心文件归档和错误隔离。

pub mod angular;
pub mod datatables;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, ConfigError};
use crate::infrastructure::{BrowserSurface, Locator};
use crate::models::{InvoiceFields, Month};

pub use angular::AngularDialect;
pub use datatables::DataTablesDialect;

/// 当前页中一行发票的句柄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowHandle {
    /// 在当前页中的位置（从 0 开始）
    pub position: usize,
    /// 指向该行的定位器
    pub locator: Locator,
}

/// 门户方言
#[async_trait]
pub trait PortalDialect: Send + Sync {
    /// 方言名称（用于日志）
    fn name(&self) -> &'static str;

    /// 登录后进入发票查询视图
    async fn enter_search_view(&self) -> AppResult<()>;

    /// 选择月份并提交查询
    async fn search_month(&self, month: Month) -> AppResult<()>;

    /// 列出当前页的所有发票行
    async fn row_handles(&self) -> AppResult<Vec<RowHandle>>;

    /// 该行是否已作废
    async fn is_cancelled(&self, row: &RowHandle) -> AppResult<bool>;

    /// 提取该行的发票字段
    async fn fields(&self, row: &RowHandle) -> AppResult<InvoiceFields>;

    /// 提取作废行用于审计的字段
    async fn audit_fields(&self, row: &RowHandle) -> AppResult<InvoiceFields> {
        self.fields(row).await
    }

    /// 触发该行的打印保存
    async fn trigger_download(&self, row: &RowHandle) -> AppResult<()>;

    /// 翻到下一页
    ///
    /// 下一页按钮不存在、已禁用或点击失败时返回 false。
    async fn advance_page(&self) -> bool;
}

/// 发票行视图
///
/// 只在处理当前行期间存在，字段按需提取。
pub struct InvoiceRow<'d> {
    dialect: &'d dyn PortalDialect,
    handle: RowHandle,
}

impl<'d> InvoiceRow<'d> {
    pub fn new(dialect: &'d dyn PortalDialect, handle: RowHandle) -> Self {
        Self { dialect, handle }
    }

    pub fn position(&self) -> usize {
        self.handle.position
    }

    pub fn handle(&self) -> &RowHandle {
        &self.handle
    }

    pub async fn is_cancelled(&self) -> AppResult<bool> {
        self.dialect.is_cancelled(&self.handle).await
    }

    pub async fn fields(&self) -> AppResult<InvoiceFields> {
        self.dialect.fields(&self.handle).await
    }

    pub async fn audit_fields(&self) -> AppResult<InvoiceFields> {
        self.dialect.audit_fields(&self.handle).await
    }

    pub async fn trigger_download(&self) -> AppResult<()> {
        self.dialect.trigger_download(&self.handle).await
    }
}

/// 方言类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    DataTables,
    Angular,
}

impl FromStr for DialectKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "datatables" => Ok(DialectKind::DataTables),
            "angular" => Ok(DialectKind::Angular),
            other => Err(ConfigError::Invalid {
                key: "dialect".to_string(),
                value: other.to_string(),
                expected: "datatables | angular".to_string(),
            }),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialectKind::DataTables => f.write_str("datatables"),
            DialectKind::Angular => f.write_str("angular"),
        }
    }
}

/// 门户操作中的等待时间
#[derive(Debug, Clone, Copy)]
pub struct PortalTimings {
    /// 一般元素（框架、菜单、月份）
    pub element_timeout: Duration,
    /// 结果表格
    pub table_timeout: Duration,
    /// 表格内部结构、弹窗按钮
    pub inner_timeout: Duration,
    /// 菜单展开、月份查询、翻页后的等待
    pub settle: Duration,
    /// 确认打印后、点击行后的等待
    pub short_settle: Duration,
}

impl Default for PortalTimings {
    fn default() -> Self {
        Self {
            element_timeout: Duration::from_secs(10),
            table_timeout: Duration::from_secs(10),
            inner_timeout: Duration::from_secs(5),
            settle: Duration::from_secs(2),
            short_settle: Duration::from_secs(1),
        }
    }
}

/// 根据配置创建方言
pub fn build_dialect(
    kind: DialectKind,
    surface: Arc<dyn BrowserSurface>,
    timings: PortalTimings,
) -> Box<dyn PortalDialect> {
    match kind {
        DialectKind::DataTables => Box::new(DataTablesDialect::new(surface, timings)),
        DialectKind::Angular => Box::new(AngularDialect::new(surface, timings)),
    }
}

#[cfg(test)]
pub(crate) fn instant_timings() -> PortalTimings {
    PortalTimings {
        element_timeout: Duration::from_millis(10),
        table_timeout: Duration::from_millis(10),
        inner_timeout: Duration::from_millis(10),
        settle: Duration::ZERO,
        short_settle: Duration::ZERO,
    }
}
