use std::path::Path;

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, BrowserError};

/// 连接到已启动的浏览器并获取页面
///
/// 浏览器需由运维方预先以远程调试端口和静默打印参数启动，这里只负责连接。
///
/// # 参数
/// - `port`: 远程调试端口
/// - `target_title`: 优先复用标题包含该文本的页面
pub async fn connect_to_browser_and_page(
    port: u16,
    target_title: Option<&str>,
) -> Result<(Browser, Page)> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);
    debug!("目标标题: {:?}", target_title);

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        AppError::Browser(BrowserError::ConnectionFailed {
            port,
            source: Box::new(e),
        })
    })?;
    debug!("浏览器连接成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let pages = browser.pages().await?;
    debug!("获取到 {} 个页面", pages.len());

    if let Some(title) = target_title {
        debug!("正在查找标题包含 '{}' 的页面", title);
        for p in pages.iter() {
            if let Ok(Some(page_title)) = p.get_title().await {
                debug!("检查页面标题: {}", page_title);
                if page_title.contains(title) {
                    info!("✓ 找到目标页面: {}", page_title);
                    return Ok((browser, p.clone()));
                }
            }
        }
        debug!("未找到匹配的页面，将创建新页面");
    }

    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("创建空白页面失败: {}", e);
        e
    })?;

    Ok((browser, page))
}

/// 让浏览器把下载文件保存到指定目录
///
/// 打印为 PDF 的保存目录由浏览器启动参数决定，这里只覆盖普通下载的目录。
pub async fn route_downloads(browser: &Browser, download_root: &Path) -> Result<()> {
    let absolute = std::fs::canonicalize(download_root)
        .with_context(|| format!("无法解析下载目录: {}", download_root.display()))?;

    let params = SetDownloadBehaviorParams::builder()
        .behavior(SetDownloadBehaviorBehavior::Allow)
        .download_path(absolute.to_string_lossy().to_string())
        .build()
        .map_err(|e| anyhow::anyhow!("构建下载参数失败: {}", e))?;

    match browser.execute(params).await {
        Ok(_) => info!("📥 下载目录: {}", absolute.display()),
        Err(e) => warn!("⚠️ 设置下载目录失败（继续使用浏览器默认设置）: {}", e),
    }

    Ok(())
}
