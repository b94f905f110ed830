//! Angular 方言（单页门户）
//!
//! 行本身只显示发票号和状态，其余字段在点击行后出现的详情面板里，
//! 详情面板的每一项文本形如 `Número: 123`。

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::{BrowserSurface, Locator};
use crate::models::{InvoiceFields, Month};
use crate::portal::{PortalDialect, PortalTimings, RowHandle};

const MONTH_TILE: &str = "div.month";
const ROWS: &str = "tr.ng-scope[ng-repeat]";
const STATUS_CELL: &str = "td:nth-child(4)";
const NUMBER_CELL: &str = "td:nth-child(1)";
const CANCELLED_MARK: &str = "Cancelada";

const DETAIL_NUMBER: &str = "div[ng-show='nfse.numero']";
const DETAIL_DATE: &str = "div[ng-show='nfse.data']";
const DETAIL_VALUE: &str = "div[ng-show='nfse.valor']";
const CURRENCY_PREFIX: &str = "R$";

const PRINT_BUTTON: &str = "button[ng-click*='imprimir']";
const NEXT_PAGE: &str = "button[ng-click='selectPage(page + 1, $event)']";

/// Angular 方言
pub struct AngularDialect {
    surface: Arc<dyn BrowserSurface>,
    timings: PortalTimings,
}

impl AngularDialect {
    pub fn new(surface: Arc<dyn BrowserSurface>, timings: PortalTimings) -> Self {
        Self { surface, timings }
    }

    /// 读取详情面板中一项的内容
    async fn detail(&self, selector: &str) -> AppResult<String> {
        let locator = Locator::css(selector);
        self.surface
            .wait_present(&locator, self.timings.element_timeout)
            .await?;
        let text = self.surface.text(&locator).await?;
        detail_content(&text)
            .ok_or_else(|| AppError::extraction(format!("详情格式异常 ({}): {}", selector, text)))
    }
}

/// 解析 `标签: 内容` 形式的文本
pub fn detail_content(text: &str) -> Option<String> {
    let re = Regex::new(r"^[^:]*:\s*(.+)$").ok()?;
    let caps = re.captures(text.trim())?;
    let content = caps.get(1)?.as_str().trim();
    (!content.is_empty()).then(|| content.to_string())
}

#[async_trait]
impl PortalDialect for AngularDialect {
    fn name(&self) -> &'static str {
        "angular"
    }

    async fn enter_search_view(&self) -> AppResult<()> {
        info!("🧭 登录后已在查询页面");
        self.surface.leave_frames().await
    }

    async fn search_month(&self, month: Month) -> AppResult<()> {
        let tile = Locator::containing(MONTH_TILE, month.label());
        self.surface
            .wait_clickable(&tile, self.timings.element_timeout)
            .await?;
        self.surface.click(&tile).await?;
        sleep(self.timings.settle).await;
        Ok(())
    }

    async fn row_handles(&self) -> AppResult<Vec<RowHandle>> {
        match self
            .surface
            .wait_present(&Locator::css(ROWS), self.timings.table_timeout)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_timeout() => {
                debug!("当前页没有发票行");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        }

        let total = self.surface.count(&Locator::css(ROWS)).await?;
        Ok((0..total)
            .map(|position| RowHandle {
                position,
                locator: Locator::css_nth(ROWS, position),
            })
            .collect())
    }

    async fn is_cancelled(&self, row: &RowHandle) -> AppResult<bool> {
        let status = self.surface.text(&row.locator.child(STATUS_CELL)).await?;
        Ok(status.contains(CANCELLED_MARK))
    }

    /// 点击行打开详情后从详情面板读取
    async fn fields(&self, row: &RowHandle) -> AppResult<InvoiceFields> {
        self.surface.click(&row.locator).await?;
        sleep(self.timings.short_settle).await;

        let number = self.detail(DETAIL_NUMBER).await?;
        let value = self.detail(DETAIL_VALUE).await?;
        let date = self.detail(DETAIL_DATE).await?;
        let value = value.trim_start_matches(CURRENCY_PREFIX).trim();
        InvoiceFields::from_cells(&number, &date, value)
    }

    /// 作废行不打开详情，只记录发票号
    async fn audit_fields(&self, row: &RowHandle) -> AppResult<InvoiceFields> {
        let number = self.surface.text(&row.locator.child(NUMBER_CELL)).await?;
        Ok(InvoiceFields::number_only(number.trim()))
    }

    async fn trigger_download(&self, _row: &RowHandle) -> AppResult<()> {
        let print = Locator::css(PRINT_BUTTON);
        self.surface
            .wait_clickable(&print, self.timings.inner_timeout)
            .await?;
        self.surface.click(&print).await
    }

    async fn advance_page(&self) -> bool {
        let next = Locator::css(NEXT_PAGE);
        match self.surface.is_present(&next).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("没有下一页按钮");
                return false;
            }
            Err(e) => {
                warn!("⚠️ 查找下一页按钮失败: {}", e);
                return false;
            }
        }

        match self.surface.attribute(&next, "class").await {
            Ok(Some(class)) if class.contains("disabled") => {
                debug!("已到最后一页");
                return false;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("⚠️ 读取下一页按钮状态失败: {}", e);
                return false;
            }
        }

        if let Err(e) = self.surface.click(&next).await {
            warn!("⚠️ 点击下一页失败: {}", e);
            return false;
        }
        sleep(self.timings.settle).await;
        true
    }
}
