use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::models::{Credentials, Month};
use crate::portal::DialectKind;

/// 程序配置文件
///
/// 加载顺序：默认值 → TOML 文件（可选）→ 环境变量
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 门户登录页 URL
    pub portal_url: String,
    // --- 验证码服务配置 ---
    pub captcha_api_key: String,
    pub captcha_api_base: String,
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 下载根目录（浏览器保存 PDF 的目录）
    pub download_root: PathBuf,
    /// 审计日志目录
    pub log_dir: PathBuf,
    /// 门户方言
    pub dialect: DialectKind,
    // --- 登录凭据 ---
    pub login: String,
    pub password: String,
    /// 要处理的月份（葡萄牙语月份名，按顺序处理）
    pub months: Vec<String>,
    /// 最大登录尝试次数
    pub max_login_attempts: usize,
    /// 等待元素的超时时间（秒）
    pub element_timeout_secs: u64,
    /// 触发打印后等待文件保存的时间（毫秒）
    pub download_settle_ms: u64,
    /// 每个月份最多处理的页数
    pub max_pages_per_month: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portal_url: String::new(),
            captcha_api_key: String::new(),
            captcha_api_base: "https://api.capsolver.com".to_string(),
            browser_debug_port: 9222,
            download_root: PathBuf::from("notas_fiscais"),
            log_dir: PathBuf::from("logs"),
            dialect: DialectKind::default(),
            login: String::new(),
            password: String::new(),
            months: Vec::new(),
            max_login_attempts: 3,
            element_timeout_secs: 10,
            download_settle_ms: 2000,
            max_pages_per_month: 500,
            verbose_logging: false,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("portal_url", &self.portal_url)
            .field("captcha_api_key", &redact(&self.captcha_api_key))
            .field("captcha_api_base", &self.captcha_api_base)
            .field("browser_debug_port", &self.browser_debug_port)
            .field("download_root", &self.download_root)
            .field("log_dir", &self.log_dir)
            .field("dialect", &self.dialect)
            .field("login", &self.login)
            .field("password", &redact(&self.password))
            .field("months", &self.months)
            .field("max_login_attempts", &self.max_login_attempts)
            .field("element_timeout_secs", &self.element_timeout_secs)
            .field("download_settle_ms", &self.download_settle_ms)
            .field("max_pages_per_month", &self.max_pages_per_month)
            .field("verbose_logging", &self.verbose_logging)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "***"
    }
}

impl Config {
    /// 默认值 + 环境变量
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// 从 TOML 文件加载（文件可选），再应用环境变量
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// 解析 TOML 文件，缺失的字段使用默认值
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 用 `lookup` 提供的值覆盖配置
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("URL_CNPJ") {
            self.portal_url = v;
        }
        if let Some(v) = lookup("API_KEY") {
            self.captcha_api_key = v;
        }
        if let Some(v) = lookup("CAPTCHA_API_BASE") {
            self.captcha_api_base = v;
        }
        if let Some(v) = lookup("NFSE_LOGIN") {
            self.login = v;
        }
        if let Some(v) = lookup("NFSE_PASSWORD") {
            self.password = v;
        }
        if let Some(v) = lookup("NFSE_MONTHS") {
            self.months = v
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = lookup("DOWNLOAD_ROOT") {
            self.download_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("LOG_DIR") {
            self.log_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PORTAL_DIALECT") {
            self.dialect = v.parse()?;
        }
        if let Some(v) = lookup("BROWSER_DEBUG_PORT") {
            self.browser_debug_port = parse_value("BROWSER_DEBUG_PORT", &v, "u16")?;
        }
        if let Some(v) = lookup("MAX_LOGIN_ATTEMPTS") {
            self.max_login_attempts = parse_value("MAX_LOGIN_ATTEMPTS", &v, "usize")?;
        }
        if let Some(v) = lookup("ELEMENT_TIMEOUT_SECS") {
            self.element_timeout_secs = parse_value("ELEMENT_TIMEOUT_SECS", &v, "u64")?;
        }
        if let Some(v) = lookup("DOWNLOAD_SETTLE_MS") {
            self.download_settle_ms = parse_value("DOWNLOAD_SETTLE_MS", &v, "u64")?;
        }
        if let Some(v) = lookup("MAX_PAGES_PER_MONTH") {
            self.max_pages_per_month = parse_value("MAX_PAGES_PER_MONTH", &v, "usize")?;
        }
        if let Some(v) = lookup("VERBOSE_LOGGING") {
            self.verbose_logging = parse_value("VERBOSE_LOGGING", &v, "bool")?;
        }
        Ok(self)
    }

    /// 检查运行所需的配置，返回登录凭据和月份列表
    pub fn validate(&self) -> Result<(Credentials, Vec<Month>), ConfigError> {
        require("portal_url", &self.portal_url)?;
        require("captcha_api_key", &self.captcha_api_key)?;
        require("login", &self.login)?;
        require("password", &self.password)?;

        if self.months.is_empty() {
            return Err(ConfigError::Missing {
                key: "months".to_string(),
            });
        }
        let months = self
            .months
            .iter()
            .map(|m| m.parse::<Month>())
            .collect::<Result<Vec<_>, _>>()?;

        if self.max_login_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "max_login_attempts".to_string(),
                value: "0".to_string(),
                expected: "正整数".to_string(),
            });
        }

        Ok((Credentials::new(&self.login, &self.password), months))
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    pub fn download_settle(&self) -> Duration {
        Duration::from_millis(self.download_settle_ms)
    }
}

fn require(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing {
            key: key.to_string(),
        });
    }
    Ok(())
}

fn parse_value<T: FromStr>(key: &str, value: &str, expected: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    })
}
