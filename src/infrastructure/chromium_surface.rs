//! Chromium 操作面 - 基础设施层
//!
//! 持有唯一的 page 资源，所有元素操作都通过执行 JS 完成。
//! 当前所在的框架路径保存在本结构中，每次执行脚本时从顶层文档逐级进入，
//! 因此门户的嵌套 frame 必须与顶层同源。

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

use crate::error::{AppError, AppResult, BrowserError};
use crate::infrastructure::surface::{js_string, poll_until, BrowserSurface, Locator};

/// 模拟人工输入时每个字符之间的间隔
const KEYSTROKE_DELAY: Duration = Duration::from_millis(50);

/// 脚本统一返回结构
#[derive(Debug, Deserialize)]
struct ScriptReply {
    ok: bool,
    #[serde(default)]
    value: JsonValue,
    #[serde(default)]
    reason: Option<String>,
}

/// 元素在顶层视口中的位置
#[derive(Debug, Deserialize)]
struct ElementRect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Chromium 操作面
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 维护当前框架路径
/// - 把 `Locator` 翻译成 JS 并执行
pub struct ChromiumSurface {
    page: Page,
    frames: Mutex<Vec<Locator>>,
    keystroke_delay: Duration,
}

impl ChromiumSurface {
    /// 创建新的操作面
    pub fn new(page: Page) -> Self {
        Self {
            page,
            frames: Mutex::new(Vec::new()),
            keystroke_delay: KEYSTROKE_DELAY,
        }
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> AppResult<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 在当前框架内对定位到的元素执行 `body`
    ///
    /// `body` 中可使用 `el`（可能为 null）、`root`（当前文档）以及框架偏移 `ox` / `oy`，
    /// 并且必须 `return { ok, value, reason }`。
    async fn run_on(&self, locator: &Locator, body: &str) -> AppResult<ScriptReply> {
        let frames = self.frames.lock().await.clone();
        let script = build_script(&frames, &format!("const el = {};\n{}", locator.resolve_js("root"), body));
        debug!("执行脚本: {} ({} 层框架)", locator, frames.len());
        let reply: ScriptReply = self.eval_as(script).await?;
        Ok(reply)
    }

    /// 要求元素存在，否则返回对应错误
    async fn require(&self, locator: &Locator, body: &str) -> AppResult<JsonValue> {
        let reply = self.run_on(locator, body).await?;
        if reply.ok {
            return Ok(reply.value);
        }
        Err(reply_error(locator, reply.reason.as_deref()))
    }
}

/// 生成完整脚本：逐级进入框架后执行 `body`
fn build_script(frames: &[Locator], body: &str) -> String {
    let mut enter = String::new();
    for frame in frames {
        enter.push_str(&format!(
            r#"
            {{
                const f = {resolve};
                if (!f || !f.contentDocument) {{
                    return {{ ok: false, reason: 'frame', value: {name} }};
                }}
                const r = f.getBoundingClientRect();
                ox += r.left + f.clientLeft;
                oy += r.top + f.clientTop;
                root = f.contentDocument;
            }}"#,
            resolve = frame.resolve_js("root"),
            name = js_string(&frame.to_string()),
        ));
    }

    format!(
        r#"
        (() => {{
            let root = document;
            let ox = 0;
            let oy = 0;
            {enter}
            {body}
        }})()
        "#
    )
}

fn reply_error(locator: &Locator, reason: Option<&str>) -> AppError {
    match reason {
        Some("frame") => BrowserError::FrameUnavailable {
            frame: locator.to_string(),
        }
        .into(),
        Some("missing") => AppError::element_not_found(locator),
        Some(other) => BrowserError::UnexpectedReply {
            detail: format!("{}: {}", locator, other),
        }
        .into(),
        None => BrowserError::UnexpectedReply {
            detail: locator.to_string(),
        }
        .into(),
    }
}

const MISSING: &str = "if (!el) { return { ok: false, reason: 'missing' }; }";

#[async_trait]
impl BrowserSurface for ChromiumSurface {
    async fn goto(&self, url: &str) -> AppResult<()> {
        debug!("导航到: {}", url);
        self.frames.lock().await.clear();
        self.page.goto(url).await?;
        Ok(())
    }

    async fn is_present(&self, locator: &Locator) -> AppResult<bool> {
        let reply = self
            .run_on(locator, "return { ok: true, value: !!el };")
            .await?;
        // 框架尚未加载时视为元素不存在，交给外层等待
        Ok(reply.ok && reply.value.as_bool().unwrap_or(false))
    }

    async fn is_clickable(&self, locator: &Locator) -> AppResult<bool> {
        let reply = self
            .run_on(
                locator,
                "return { ok: true, value: !!el && !el.disabled && el.getClientRects().length > 0 };",
            )
            .await?;
        Ok(reply.ok && reply.value.as_bool().unwrap_or(false))
    }

    async fn type_text(&self, locator: &Locator, text: &str) -> AppResult<()> {
        for ch in text.chars() {
            let body = format!(
                r#"{MISSING}
                el.focus();
                el.value += {ch};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                return {{ ok: true }};"#,
                ch = js_string(&ch.to_string()),
            );
            self.require(locator, &body).await?;
            sleep(self.keystroke_delay).await;
        }
        let body = format!(
            "{MISSING}\nel.dispatchEvent(new Event('change', {{ bubbles: true }}));\nreturn {{ ok: true }};"
        );
        self.require(locator, &body).await?;
        Ok(())
    }

    async fn clear(&self, locator: &Locator) -> AppResult<()> {
        let body = format!(
            r#"{MISSING}
            el.value = '';
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return {{ ok: true }};"#
        );
        self.require(locator, &body).await?;
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> AppResult<()> {
        debug!("点击: {}", locator);
        let body = format!(
            r#"{MISSING}
            el.scrollIntoView({{ block: 'center' }});
            el.click();
            return {{ ok: true }};"#
        );
        self.require(locator, &body).await?;
        Ok(())
    }

    async fn select_by_text(&self, locator: &Locator, text: &str) -> AppResult<()> {
        let body = format!(
            r#"{MISSING}
            const opt = Array.from(el.options || []).find(o => o.text.trim() === {text});
            if (!opt) {{ return {{ ok: false, reason: 'option' }}; }}
            el.value = opt.value;
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return {{ ok: true }};"#,
            text = js_string(text),
        );
        let reply = self.run_on(locator, &body).await?;
        match (reply.ok, reply.reason.as_deref()) {
            (true, _) => Ok(()),
            (false, Some("option")) => Err(BrowserError::OptionNotFound {
                locator: locator.to_string(),
                option: text.to_string(),
            }
            .into()),
            (false, reason) => Err(reply_error(locator, reason)),
        }
    }

    async fn text(&self, locator: &Locator) -> AppResult<String> {
        let body = format!(
            "{MISSING}\nreturn {{ ok: true, value: (el.innerText ?? el.textContent ?? '') }};"
        );
        let value = self.require(locator, &body).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> AppResult<Option<String>> {
        let body = format!(
            "{MISSING}\nreturn {{ ok: true, value: el.getAttribute({}) }};",
            js_string(name)
        );
        let value = self.require(locator, &body).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn count(&self, locator: &Locator) -> AppResult<usize> {
        let frames = self.frames.lock().await.clone();
        let script = build_script(
            &frames,
            &format!("return {{ ok: true, value: {} }};", locator.count_js("root")),
        );
        let reply: ScriptReply = self.eval_as(script).await?;
        if !reply.ok {
            return Err(reply_error(locator, reply.reason.as_deref()));
        }
        Ok(reply.value.as_u64().unwrap_or(0) as usize)
    }

    async fn enter_frame(&self, locator: &Locator, timeout: Duration) -> AppResult<()> {
        poll_until(locator, timeout, move || async move {
            let reply = self
                .run_on(locator, "return { ok: true, value: !!el && !!el.contentDocument };")
                .await?;
            Ok(reply.ok && reply.value.as_bool().unwrap_or(false))
        })
        .await?;
        self.frames.lock().await.push(locator.clone());
        debug!("进入框架: {}", locator);
        Ok(())
    }

    async fn leave_frames(&self) -> AppResult<()> {
        self.frames.lock().await.clear();
        debug!("回到顶层文档");
        Ok(())
    }

    async fn screenshot(&self, locator: &Locator) -> AppResult<Vec<u8>> {
        let body = format!(
            r#"{MISSING}
            el.scrollIntoView({{ block: 'center' }});
            const r = el.getBoundingClientRect();
            return {{ ok: true, value: {{ x: r.left + ox, y: r.top + oy, width: r.width, height: r.height }} }};"#
        );
        let value = self.require(locator, &body).await?;
        let rect: ElementRect = serde_json::from_value(value)?;

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .clip(Viewport {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                scale: 1.0,
            })
            .build();
        let bytes = self.page.screenshot(params).await?;
        debug!("截图完成: {} ({} 字节)", locator, bytes.len());
        Ok(bytes)
    }
}
