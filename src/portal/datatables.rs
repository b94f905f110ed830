//! DataTables 方言（frameset 门户）

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::{BrowserSurface, Locator};
use crate::models::{InvoiceFields, Month};
use crate::portal::{PortalDialect, PortalTimings, RowHandle};

const MENU_FRAME: &str = "#fraMenu";
const MENU_ENTRY: &str = "#td1_div5 > b > span";
const MAIN_FRAME: &str = "#fraMain";
const MENU_IFRAME: &str = "#iFrameMenu";
const SEARCH_LINK: &str = "Pesquisar NFS-e Recebidas (IFRAME)";
const SEARCH_FRAME: &str = "#ctl00_ContentPlaceHolder1_frmObras";

const MONTH_SELECT: &str = "#Mes";
const SEARCH_BUTTON: &str = "#btnPesquisar";

const TABLE: &str = "#tblNfse";
const PRINT_BUTTON: &str = "td.action-column button[data-action='imprimir']";
const MODAL_CONFIRM: &str = ".modal-footer button.btn-success";
const MODAL_CLOSE: &str = ".modal-footer button.btn-secondary";
const NEXT_PAGE: &str = "li.paginate_button.page-item.next";

/// 单元格位置
const NUMBER_CELL: usize = 1;
const DATE_CELL: usize = 4;
const VALUE_CELL: usize = 5;
const MIN_CELLS: usize = 6;

/// DataTables 方言
pub struct DataTablesDialect {
    surface: Arc<dyn BrowserSurface>,
    timings: PortalTimings,
}

impl DataTablesDialect {
    pub fn new(surface: Arc<dyn BrowserSurface>, timings: PortalTimings) -> Self {
        Self { surface, timings }
    }

    fn body() -> Locator {
        Locator::css(TABLE).child("tbody")
    }

    fn cell(row: &RowHandle, index: usize) -> Locator {
        row.locator.child_nth("td", index)
    }

    async fn cell_text(&self, row: &RowHandle, index: usize) -> AppResult<String> {
        let text = self.surface.text(&Self::cell(row, index)).await?;
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl PortalDialect for DataTablesDialect {
    fn name(&self) -> &'static str {
        "datatables"
    }

    async fn enter_search_view(&self) -> AppResult<()> {
        let s = &self.surface;
        let timeout = self.timings.element_timeout;
        info!("🧭 进入发票查询页面");

        s.leave_frames().await?;
        s.enter_frame(&Locator::css(MENU_FRAME), timeout).await?;
        let entry = Locator::css(MENU_ENTRY);
        s.wait_clickable(&entry, timeout).await?;
        s.click(&entry).await?;
        sleep(self.timings.settle).await;

        s.leave_frames().await?;
        s.enter_frame(&Locator::css(MAIN_FRAME), timeout).await?;
        s.enter_frame(&Locator::css(MENU_IFRAME), timeout).await?;
        let link = Locator::link_text(SEARCH_LINK);
        s.wait_clickable(&link, timeout).await?;
        s.click(&link).await?;

        s.leave_frames().await?;
        s.enter_frame(&Locator::css(MAIN_FRAME), timeout).await?;
        s.enter_frame(&Locator::css(SEARCH_FRAME), timeout).await?;
        debug!("已进入查询框架: {}", SEARCH_FRAME);
        Ok(())
    }

    async fn search_month(&self, month: Month) -> AppResult<()> {
        let select = Locator::css(MONTH_SELECT);
        self.surface
            .wait_present(&select, self.timings.element_timeout)
            .await?;
        self.surface.select_by_text(&select, month.label()).await?;

        let button = Locator::css(SEARCH_BUTTON);
        self.surface
            .wait_clickable(&button, self.timings.element_timeout)
            .await?;
        self.surface.click(&button).await?;
        sleep(self.timings.settle).await;
        Ok(())
    }

    async fn row_handles(&self) -> AppResult<Vec<RowHandle>> {
        let table = Locator::css(TABLE);
        self.surface
            .wait_present(&table, self.timings.table_timeout)
            .await?;
        let body = Self::body();
        self.surface
            .wait_present(&body, self.timings.inner_timeout)
            .await?;

        let total = self.surface.count(&body.child("tr")).await?;
        Ok((0..total)
            .map(|position| RowHandle {
                position,
                locator: body.child_nth("tr", position),
            })
            .collect())
    }

    async fn is_cancelled(&self, row: &RowHandle) -> AppResult<bool> {
        let class = self.surface.attribute(&row.locator, "class").await?;
        Ok(class.map_or(false, |c| c.contains("canceled")))
    }

    async fn fields(&self, row: &RowHandle) -> AppResult<InvoiceFields> {
        let cells = self.surface.count(&row.locator.child("td")).await?;
        if cells < MIN_CELLS {
            return Err(AppError::extraction(format!(
                "行只有 {} 列，至少需要 {} 列",
                cells, MIN_CELLS
            )));
        }

        let number = self.cell_text(row, NUMBER_CELL).await?;
        let date = self.cell_text(row, DATE_CELL).await?;
        let value = self.cell_text(row, VALUE_CELL).await?;
        InvoiceFields::from_cells(&number, &date, &value)
    }

    async fn trigger_download(&self, row: &RowHandle) -> AppResult<()> {
        let s = &self.surface;
        let timeout = self.timings.inner_timeout;

        s.click(&row.locator.child(PRINT_BUTTON)).await?;

        let confirm = Locator::css(MODAL_CONFIRM);
        s.wait_clickable(&confirm, timeout).await?;
        s.click(&confirm).await?;
        sleep(self.timings.short_settle).await;

        let close = Locator::css(MODAL_CLOSE);
        s.wait_clickable(&close, timeout).await?;
        s.click(&close).await?;
        Ok(())
    }

    async fn advance_page(&self) -> bool {
        let next = Locator::css(NEXT_PAGE);
        if let Err(e) = self
            .surface
            .wait_clickable(&next, self.timings.table_timeout)
            .await
        {
            debug!("下一页按钮不可用: {}", e);
            return false;
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
