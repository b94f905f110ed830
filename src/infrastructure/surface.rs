//! 浏览器操作面 - 基础设施层
//!
//! 定义核心流程所需的全部浏览器能力（定位、等待、输入、点击、切换框架、截图），
//! 具体实现见 `ChromiumSurface`。

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};

use crate::error::{AppResult, BrowserError};

/// 等待元素时的轮询间隔
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// 元素定位器
///
/// 由若干步骤组成，每一步在上一步找到的元素内继续查找，
/// 从当前框架的 document 开始求值。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Step {
    /// CSS 选择器的第 n 个匹配
    Css { selector: String, nth: usize },
    /// 文本完全相同的链接
    LinkText(String),
    /// 文本包含指定内容的元素
    Containing { selector: String, text: String },
}

impl Locator {
    /// CSS 选择器的第一个匹配
    pub fn css(selector: impl Into<String>) -> Self {
        Self::css_nth(selector, 0)
    }

    /// CSS 选择器的第 n 个匹配（从 0 开始）
    pub fn css_nth(selector: impl Into<String>, nth: usize) -> Self {
        Self {
            steps: vec![Step::Css {
                selector: selector.into(),
                nth,
            }],
        }
    }

    /// 按链接文本定位
    pub fn link_text(text: impl Into<String>) -> Self {
        Self {
            steps: vec![Step::LinkText(text.into())],
        }
    }

    /// 选择器匹配且文本包含 `text` 的第一个元素
    pub fn containing(selector: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            steps: vec![Step::Containing {
                selector: selector.into(),
                text: text.into(),
            }],
        }
    }

    /// 在当前元素内查找第一个匹配
    pub fn child(&self, selector: impl Into<String>) -> Self {
        self.child_nth(selector, 0)
    }

    /// 在当前元素内查找第 n 个匹配
    pub fn child_nth(&self, selector: impl Into<String>, nth: usize) -> Self {
        let mut steps = self.steps.clone();
        steps.push(Step::Css {
            selector: selector.into(),
            nth,
        });
        Self { steps }
    }

    /// 生成 JS 表达式：在 `root` 内求值为元素或 null
    pub fn resolve_js(&self, root: &str) -> String {
        self.steps
            .iter()
            .fold(root.to_string(), |scope, step| step.single_js(&scope))
    }

    /// 生成 JS 表达式：最后一步的匹配数量
    pub fn count_js(&self, root: &str) -> String {
        let (last, parents) = match self.steps.split_last() {
            Some(split) => split,
            None => return "0".to_string(),
        };
        let scope = parents
            .iter()
            .fold(root.to_string(), |scope, step| step.single_js(&scope));
        format!("((s) => s ? {}.length : 0)({})", last.all_js("s"), scope)
    }
}

impl Step {
    fn single_js(&self, scope: &str) -> String {
        let found = match self {
            Step::Css { selector, nth } => {
                format!("(s.querySelectorAll({})[{}] || null)", js_string(selector), nth)
            }
            _ => format!("({}[0] || null)", self.all_js("s")),
        };
        format!("((s) => s ? {} : null)({})", found, scope)
    }

    fn all_js(&self, scope: &str) -> String {
        match self {
            Step::Css { selector, .. } => {
                format!("Array.from({}.querySelectorAll({}))", scope, js_string(selector))
            }
            Step::LinkText(text) => format!(
                "Array.from({}.querySelectorAll('a')).filter(e => e.textContent.trim() === {})",
                scope,
                js_string(text)
            ),
            Step::Containing { selector, text } => format!(
                "Array.from({}.querySelectorAll({})).filter(e => e.textContent.includes({}))",
                scope,
                js_string(selector),
                js_string(text)
            ),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(" >> ")?;
            }
            match step {
                Step::Css { selector, nth: 0 } => write!(f, "{}", selector)?,
                Step::Css { selector, nth } => write!(f, "{}:nth({})", selector, nth)?,
                Step::LinkText(text) => write!(f, "link={}", text)?,
                Step::Containing { selector, text } => {
                    write!(f, "{}:has-text({})", selector, text)?
                }
            }
        }
        Ok(())
    }
}

/// 把字符串转成 JS 字面量
pub fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// 浏览器操作面
///
/// 所有等待都是带超时的轮询，超时返回 `BrowserError::NavigationTimeout`，
/// 由外层的行 / 页 / 月份边界处理。
#[async_trait]
pub trait BrowserSurface: Send + Sync {
    /// 导航到指定 URL（同时回到顶层文档）
    async fn goto(&self, url: &str) -> AppResult<()>;

    /// 元素是否存在
    async fn is_present(&self, locator: &Locator) -> AppResult<bool>;

    /// 元素是否可点击（存在、可见且未禁用）
    async fn is_clickable(&self, locator: &Locator) -> AppResult<bool>;

    /// 向输入框逐字输入文本
    async fn type_text(&self, locator: &Locator, text: &str) -> AppResult<()>;

    /// 清空输入框
    async fn clear(&self, locator: &Locator) -> AppResult<()>;

    /// 点击元素
    async fn click(&self, locator: &Locator) -> AppResult<()>;

    /// 按可见文本选择下拉框选项
    async fn select_by_text(&self, locator: &Locator, text: &str) -> AppResult<()>;

    /// 读取元素文本
    async fn text(&self, locator: &Locator) -> AppResult<String>;

    /// 读取元素属性，属性不存在时返回 None
    async fn attribute(&self, locator: &Locator, name: &str) -> AppResult<Option<String>>;

    /// 统计定位器最后一步的匹配数量
    async fn count(&self, locator: &Locator) -> AppResult<usize>;

    /// 进入嵌套框架（iframe / frame），等待其文档可访问
    async fn enter_frame(&self, locator: &Locator, timeout: Duration) -> AppResult<()>;

    /// 回到顶层文档
    async fn leave_frames(&self) -> AppResult<()>;

    /// 对元素截图，返回 PNG 数据
    async fn screenshot(&self, locator: &Locator) -> AppResult<Vec<u8>>;

    /// 等待元素出现
    async fn wait_present(&self, locator: &Locator, timeout: Duration) -> AppResult<()> {
        poll_until(locator, timeout, move || self.is_present(locator)).await
    }

    /// 等待元素可点击
    async fn wait_clickable(&self, locator: &Locator, timeout: Duration) -> AppResult<()> {
        poll_until(locator, timeout, move || self.is_clickable(locator)).await
    }
}

/// 轮询直到条件满足或超时
///
/// 至少探测一次，所以 `timeout` 为 0 时等价于立即检查。
pub async fn poll_until<F, Fut>(locator: &Locator, timeout: Duration, mut probe: F) -> AppResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<bool>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if probe().await? {
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(BrowserError::NavigationTimeout {
                locator: locator.to_string(),
                timeout,
            }
            .into());
        }
        sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
}
