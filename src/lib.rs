//! # NFS-e Harvester
//!
//! 从市政 NFS-e 门户批量下载服务发票的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露浏览器能力
//! - `BrowserSurface` - 定位、等待、输入、点击、切换框架、截图
//! - `ChromiumSurface` - 唯一的 page owner
//!
//! ### ② 业务能力层（Services / Portal）
//! - `services/` - 描述"我能做什么"，只处理单张发票
//! - `SessionController` - 带验证码的登录能力
//! - `CapSolverClient` - 验证码识别能力
//! - `DownloadReconciler` - 下载文件归档能力
//! - `AuditLog` - 写审计日志能力
//! - `portal/` - 两种门户表格的方言
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一行发票"的完整处理流程
//! - `RowCtx` - 上下文封装（月份 + 页码 + 行号）
//! - `RowProcessor` - 流程编排（作废 → 提取 → 打印 → 归档）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/harvest` - 资源管理和整体流程
//! - `orchestrator/traversal` - 月份 / 页面遍历
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod portal;
pub mod services;
pub mod utils;
pub mod workflow;

#[cfg(test)]
mod testing;

// 重新导出常用类型
pub use browser::connect_to_browser_and_page;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{BrowserSurface, ChromiumSurface, Locator};
pub use models::{Credentials, InvoiceFields, Month};
pub use orchestrator::{App, Harvester, RunReport, TraversalEngine, TraversalStats};
pub use portal::{DialectKind, PortalDialect};
pub use services::{sanitize_filename, DownloadReconciler, ReconcileOutcome};
pub use workflow::{RowCtx, RowOutcome, RowProcessor};
