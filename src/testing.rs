//! 单元测试用的脚本化实现

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, AppResult, BrowserError, CaptchaError};
use crate::infrastructure::{BrowserSurface, Locator};
use crate::models::{InvoiceFields, Month};
use crate::portal::{PortalDialect, RowHandle};
use crate::services::CaptchaOracle;

/// 脚本化的浏览器操作面
///
/// 元素以定位器的显示文本为键；除非标记为缺失，所有元素都存在。
/// 文本按序列返回，最后一个值保持不变。
#[derive(Default)]
pub struct ScriptedSurface {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    missing: HashSet<String>,
    texts: HashMap<String, VecDeque<String>>,
    attributes: HashMap<(String, String), String>,
    counts: HashMap<String, usize>,
    actions: Vec<String>,
}

impl ScriptedSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(self, key: &str, values: &[&str]) -> Self {
        self.state.lock().unwrap().texts.insert(
            key.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    pub fn with_attribute(self, key: &str, name: &str, value: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .attributes
            .insert((key.to_string(), name.to_string()), value.to_string());
        self
    }

    pub fn with_count(self, key: &str, count: usize) -> Self {
        self.state.lock().unwrap().counts.insert(key.to_string(), count);
        self
    }

    pub fn with_missing(self, key: &str) -> Self {
        self.state.lock().unwrap().missing.insert(key.to_string());
        self
    }

    pub fn actions(&self) -> Vec<String> {
        self.state.lock().unwrap().actions.clone()
    }

    /// 以 `prefix` 开头的操作次数
    pub fn count_actions(&self, prefix: &str) -> usize {
        self.actions()
            .iter()
            .filter(|a| a.starts_with(prefix))
            .count()
    }

    fn record(&self, action: String) {
        self.state.lock().unwrap().actions.push(action);
    }

    fn check(&self, locator: &Locator) -> AppResult<String> {
        let key = locator.to_string();
        let state = self.state.lock().unwrap();
        if state.missing.contains(&key) {
            return Err(AppError::element_not_found(&key));
        }
        Ok(key)
    }
}

#[async_trait]
impl BrowserSurface for ScriptedSurface {
    async fn goto(&self, url: &str) -> AppResult<()> {
        self.record(format!("goto {}", url));
        Ok(())
    }

    async fn is_present(&self, locator: &Locator) -> AppResult<bool> {
        let key = locator.to_string();
        Ok(!self.state.lock().unwrap().missing.contains(&key))
    }

    async fn is_clickable(&self, locator: &Locator) -> AppResult<bool> {
        self.is_present(locator).await
    }

    async fn type_text(&self, locator: &Locator, text: &str) -> AppResult<()> {
        let key = self.check(locator)?;
        self.record(format!("type {} {}", key, text));
        Ok(())
    }

    async fn clear(&self, locator: &Locator) -> AppResult<()> {
        let key = self.check(locator)?;
        self.record(format!("clear {}", key));
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> AppResult<()> {
        let key = self.check(locator)?;
        self.record(format!("click {}", key));
        Ok(())
    }

    async fn select_by_text(&self, locator: &Locator, text: &str) -> AppResult<()> {
        let key = self.check(locator)?;
        self.record(format!("select {} {}", key, text));
        Ok(())
    }

    async fn text(&self, locator: &Locator) -> AppResult<String> {
        let key = self.check(locator)?;
        let mut state = self.state.lock().unwrap();
        let text = match state.texts.get_mut(&key) {
            Some(values) if values.len() > 1 => values.pop_front().unwrap_or_default(),
            Some(values) => values.front().cloned().unwrap_or_default(),
            None => String::new(),
        };
        Ok(text)
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> AppResult<Option<String>> {
        let key = self.check(locator)?;
        let state = self.state.lock().unwrap();
        Ok(state.attributes.get(&(key, name.to_string())).cloned())
    }

    async fn count(&self, locator: &Locator) -> AppResult<usize> {
        let key = locator.to_string();
        Ok(self.state.lock().unwrap().counts.get(&key).copied().unwrap_or(0))
    }

    async fn enter_frame(&self, locator: &Locator, timeout: Duration) -> AppResult<()> {
        let key = locator.to_string();
        if self.state.lock().unwrap().missing.contains(&key) {
            return Err(BrowserError::NavigationTimeout {
                locator: key,
                timeout,
            }
            .into());
        }
        self.record(format!("frame {}", key));
        Ok(())
    }

    async fn leave_frames(&self) -> AppResult<()> {
        self.record("top".to_string());
        Ok(())
    }

    async fn screenshot(&self, locator: &Locator) -> AppResult<Vec<u8>> {
        let key = self.check(locator)?;
        self.record(format!("screenshot {}", key));
        Ok(vec![0x89, b'P', b'N', b'G'])
    }
}

/// 按顺序返回预设结果的验证码识别器
#[derive(Default)]
pub struct ScriptedOracle {
    answers: Mutex<VecDeque<Result<String, CaptchaError>>>,
    calls: Mutex<usize>,
}

impl ScriptedOracle {
    pub fn new(answers: Vec<Result<String, CaptchaError>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl CaptchaOracle for ScriptedOracle {
    async fn solve(&self, _image: &[u8]) -> Result<String, CaptchaError> {
        *self.calls.lock().unwrap() += 1;
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("abc12".to_string()))
    }
}

/// 脚本化的发票行
#[derive(Debug, Clone)]
pub struct ScriptedRow {
    cancelled: bool,
    cells: Option<(String, String, String)>,
}

/// 脚本化的门户方言
///
/// 每个月份拥有相同的页面（除非单独指定），触发下载时在下载根目录写入一个 PDF。
pub struct ScriptedDialect {
    root: PathBuf,
    write_files: bool,
    failing_downloads: bool,
    pages: Vec<Vec<ScriptedRow>>,
    month_pages: HashMap<Month, Vec<Vec<ScriptedRow>>>,
    failing_months: HashSet<Month>,
    state: Mutex<DialectState>,
}

#[derive(Default)]
struct DialectState {
    month: Option<Month>,
    page: usize,
    downloads: usize,
    visited: Vec<(Month, usize)>,
}

impl ScriptedDialect {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            write_files: true,
            failing_downloads: false,
            pages: Vec::new(),
            month_pages: HashMap::new(),
            failing_months: HashSet::new(),
            state: Mutex::new(DialectState::default()),
        }
    }

    pub fn active(number: &str, date: &str, value: &str) -> ScriptedRow {
        ScriptedRow {
            cancelled: false,
            cells: Some((number.to_string(), date.to_string(), value.to_string())),
        }
    }

    pub fn cancelled(number: &str, date: &str, value: &str) -> ScriptedRow {
        ScriptedRow {
            cancelled: true,
            ..Self::active(number, date, value)
        }
    }

    /// 无法提取字段的行
    pub fn broken() -> ScriptedRow {
        ScriptedRow {
            cancelled: false,
            cells: None,
        }
    }

    pub fn page(mut self, rows: Vec<ScriptedRow>) -> Self {
        self.pages.push(rows);
        self
    }

    pub fn month_pages(mut self, month: Month, pages: Vec<Vec<ScriptedRow>>) -> Self {
        self.month_pages.insert(month, pages);
        self
    }

    /// 查询该月份时报错
    pub fn failing_month(mut self, month: Month) -> Self {
        self.failing_months.insert(month);
        self
    }

    /// 触发下载时不产生文件
    pub fn without_files(mut self) -> Self {
        self.write_files = false;
        self
    }

    /// 触发下载时报错（字段已提取）
    pub fn failing_downloads(mut self) -> Self {
        self.failing_downloads = true;
        self
    }

    pub fn page_handles(&self, page: usize) -> Vec<RowHandle> {
        let count = self.pages.get(page).map_or(0, Vec::len);
        handles(count)
    }

    pub fn downloads(&self) -> usize {
        self.state.lock().unwrap().downloads
    }

    /// 按顺序列出访问过的 (月份, 页码)
    pub fn visited(&self) -> Vec<(Month, usize)> {
        self.state.lock().unwrap().visited.clone()
    }

    fn pages_of(&self, month: Option<Month>) -> &[Vec<ScriptedRow>] {
        month
            .and_then(|m| self.month_pages.get(&m))
            .unwrap_or(&self.pages)
    }

    fn current_row(&self, row: &RowHandle) -> AppResult<ScriptedRow> {
        let state = self.state.lock().unwrap();
        self.pages_of(state.month)
            .get(state.page)
            .and_then(|rows| rows.get(row.position))
            .cloned()
            .ok_or_else(|| AppError::element_not_found(&row.locator))
    }
}

fn handles(count: usize) -> Vec<RowHandle> {
    (0..count)
        .map(|position| RowHandle {
            position,
            locator: Locator::css_nth("tr", position),
        })
        .collect()
}

#[async_trait]
impl PortalDialect for ScriptedDialect {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn enter_search_view(&self) -> AppResult<()> {
        Ok(())
    }

    async fn search_month(&self, month: Month) -> AppResult<()> {
        if self.failing_months.contains(&month) {
            return Err(BrowserError::NavigationTimeout {
                locator: "#Mes".to_string(),
                timeout: Duration::from_secs(10),
            }
            .into());
        }
        let mut state = self.state.lock().unwrap();
        state.month = Some(month);
        state.page = 0;
        Ok(())
    }

    async fn row_handles(&self) -> AppResult<Vec<RowHandle>> {
        let mut state = self.state.lock().unwrap();
        let month = state.month.unwrap_or(Month::Janeiro);
        let page = state.page;
        state.visited.push((month, page + 1));
        let count = self
            .pages_of(state.month)
            .get(page)
            .map_or(0, Vec::len);
        Ok(handles(count))
    }

    async fn is_cancelled(&self, row: &RowHandle) -> AppResult<bool> {
        Ok(self.current_row(row)?.cancelled)
    }

    async fn fields(&self, row: &RowHandle) -> AppResult<InvoiceFields> {
        match self.current_row(row)?.cells {
            Some((number, date, value)) => InvoiceFields::from_cells(&number, &date, &value),
            None => Err(AppError::extraction("行只有 2 列，至少需要 6 列")),
        }
    }

    async fn trigger_download(&self, row: &RowHandle) -> AppResult<()> {
        if self.failing_downloads {
            return Err(AppError::element_not_found(&row.locator));
        }
        let n = {
            let mut state = self.state.lock().unwrap();
            state.downloads += 1;
            state.downloads
        };
        if self.write_files {
            fs::create_dir_all(&self.root).unwrap();
            fs::write(self.root.join(format!("nfse_{}.pdf", n)), b"%PDF-1.4").unwrap();
        }
        Ok(())
    }

    async fn advance_page(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        let total = self.pages_of(state.month).len();
        if state.page + 1 < total {
            state.page += 1;
            true
        } else {
            false
        }
    }
}
