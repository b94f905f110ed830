use std::path::PathBuf;

use anyhow::{Context, Result};
use nfse_harvester::utils::logging;
use nfse_harvester::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 可选参数：配置文件路径
    let config_path = std::env::args().nth(1).map(PathBuf::from);

    // 加载配置
    let config = Config::load(config_path.as_deref()).context("加载配置失败")?;

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化并运行应用
    let report = App::initialize(config).await?.run().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.success {
        std::process::exit(1);
    }
    Ok(())
}
