//! 日志工具模块
//!
//! 提供日志初始化和输出的辅助函数

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::orchestrator::TraversalStats;

/// 初始化日志
///
/// `RUST_LOG` 优先；未设置时默认 info，`verbose` 为 true 时为 debug。
/// 重复调用是安全的（只有第一次生效）。
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("nfse_harvester=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nfse_harvester=info"))
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .compact(),
        )
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config, months: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - NFS-e 发票下载");
    info!("🌐 门户: {}", config.portal_url);
    info!("🧩 方言: {}", config.dialect);
    info!("📅 月份数量: {}", months);
    info!("📁 下载目录: {}", config.download_root.display());
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(stats: &TraversalStats, config: &Config) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!(
        "📅 月份: 完成 {}, 失败 {}",
        stats.months_completed, stats.months_failed
    );
    info!("📑 页数: {}", stats.pages_visited);
    info!("✅ 已归档: {}", stats.filed);
    info!("♻️ 重复: {}", stats.duplicates);
    info!("📭 无文件: {}", stats.no_file);
    info!("🚫 作废: {}", stats.cancelled);
    info!("❌ 失败: {}", stats.failed);
    info!("{}", "=".repeat(60));
    info!("\n审计日志目录: {}", config.log_dir.display());
}
