//! 整体运行编排 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责资源管理和整体流程：
//!
//! 1. **应用初始化**：校验配置、连接浏览器、设置下载目录、创建各个服务
//! 2. **整体流程**：清理下载目录 → 打开门户 → 登录 → 进入查询页面 → 遍历月份
//! 3. **运行报告**：成功与否、下载目录中的文件、统计信息
//!
//! 登录失败或无法进入查询页面时整体失败，之后的错误都在月份 / 行内消化。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::Browser;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::browser;
use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::{BrowserSurface, ChromiumSurface};
use crate::models::{Credentials, Month};
use crate::orchestrator::traversal::{TraversalEngine, TraversalStats, DEFAULT_MAX_PAGES};
use crate::portal::{build_dialect, PortalDialect, PortalTimings};
use crate::services::{
    AuditLog, CapSolverClient, DownloadReconciler, LoginTimings, SessionController,
};
use crate::utils::logging;
use crate::workflow::RowProcessor;

/// 运行报告
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub success: bool,
    pub message: String,
    /// 运行结束时下载根目录顶层的条目
    pub files: Vec<String>,
    pub stats: TraversalStats,
}

/// 一次完整的下载流程
///
/// 不持有浏览器资源，只依赖各个能力，便于替换实现。
pub struct Harvester {
    session: SessionController,
    dialect: Box<dyn PortalDialect>,
    reconciler: DownloadReconciler,
    audit: AuditLog,
    portal_url: String,
    download_settle: Duration,
    max_pages: usize,
}

impl Harvester {
    pub fn new(
        session: SessionController,
        dialect: Box<dyn PortalDialect>,
        reconciler: DownloadReconciler,
        audit: AuditLog,
        portal_url: impl Into<String>,
    ) -> Self {
        Self {
            session,
            dialect,
            reconciler,
            audit,
            portal_url: portal_url.into(),
            download_settle: Duration::from_secs(2),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_download_settle(mut self, download_settle: Duration) -> Self {
        self.download_settle = download_settle;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// 执行完整流程并生成报告（不会返回错误）
    pub async fn run(&self, credentials: &Credentials, months: &[Month]) -> RunReport {
        let outcome = self.execute(credentials, months).await;

        let files = match self.reconciler.list_root() {
            Ok(files) => files,
            Err(e) => {
                warn!("⚠️ 无法列出下载目录: {}", e);
                Vec::new()
            }
        };

        match outcome {
            Ok(stats) => RunReport {
                success: true,
                message: "Notas fiscais baixadas com sucesso".to_string(),
                files,
                stats,
            },
            Err(e) => {
                error!("❌ 运行失败: {}", e);
                RunReport {
                    success: false,
                    message: format!("Erro ao baixar notas fiscais: {}", e),
                    files,
                    stats: TraversalStats::default(),
                }
            }
        }
    }

    async fn execute(&self, credentials: &Credentials, months: &[Month]) -> AppResult<TraversalStats> {
        self.reconciler.prepare_root()?;

        self.session.open_portal(&self.portal_url).await?;
        self.session.authenticate(credentials).await?;
        self.dialect.enter_search_view().await?;

        info!(
            "📅 开始处理 {} 个月份 (方言: {})",
            months.len(),
            self.dialect.name()
        );
        let processor = RowProcessor::new(
            self.reconciler.clone(),
            self.audit.clone(),
            self.download_settle,
        );
        let stats = TraversalEngine::new(self.dialect.as_ref(), &processor, &self.audit)
            .with_max_pages(self.max_pages)
            .run(months)
            .await;
        Ok(stats)
    }
}

/// 应用主结构
pub struct App {
    config: Config,
    _browser: Browser,
    credentials: Credentials,
    months: Vec<Month>,
    harvester: Harvester,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        let (credentials, months) = config.validate()?;
        logging::log_startup(&config, months.len());

        let audit = AuditLog::open(&config.log_dir)?;
        std::fs::create_dir_all(&config.download_root).with_context(|| {
            format!("无法创建下载目录: {}", config.download_root.display())
        })?;

        // 连接浏览器
        let (browser, page) =
            browser::connect_to_browser_and_page(config.browser_debug_port, None).await?;
        browser::route_downloads(&browser, &config.download_root).await?;

        // 创建 ChromiumSurface（持有 page）
        let surface: Arc<dyn BrowserSurface> = Arc::new(ChromiumSurface::new(page));
        let oracle = Arc::new(CapSolverClient::new(
            config.captcha_api_key.clone(),
            config.captcha_api_base.clone(),
        ));

        let session = SessionController::new(surface.clone(), oracle, config.max_login_attempts)
            .with_timings(LoginTimings {
                element_timeout: config.element_timeout(),
                ..LoginTimings::default()
            });
        let dialect = build_dialect(
            config.dialect,
            surface,
            PortalTimings {
                element_timeout: config.element_timeout(),
                ..PortalTimings::default()
            },
        );

        let harvester = Harvester::new(
            session,
            dialect,
            DownloadReconciler::new(&config.download_root),
            audit,
            config.portal_url.clone(),
        )
        .with_download_settle(config.download_settle())
        .with_max_pages(config.max_pages_per_month);

        Ok(Self {
            config,
            _browser: browser,
            credentials,
            months,
            harvester,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> RunReport {
        let report = self.harvester.run(&self.credentials, &self.months).await;
        logging::print_final_stats(&report.stats, &self.config);
        report
    }
}
