use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 登录会话错误
    #[error("会话错误: {0}")]
    Session(#[from] SessionError),
    /// 验证码识别错误
    #[error("验证码错误: {0}")]
    Captcha(#[from] CaptchaError),
    /// 数据行提取错误
    #[error("数据行错误: {0}")]
    Row(#[from] RowError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {source}")]
    ConnectionFailed {
        port: u16,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 等待元素超时
    #[error("等待元素 {locator} 超时 ({timeout:?})")]
    NavigationTimeout { locator: String, timeout: Duration },
    /// 元素不存在
    #[error("元素不存在: {locator}")]
    ElementNotFound { locator: String },
    /// 下拉框中没有对应选项
    #[error("下拉框 {locator} 中没有选项: {option}")]
    OptionNotFound { locator: String, option: String },
    /// 框架不可访问
    #[error("框架不可访问: {frame}")]
    FrameUnavailable { frame: String },
    /// 执行脚本失败
    #[error("执行脚本失败: {source}")]
    ScriptExecutionFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 脚本返回了无法识别的结果
    #[error("脚本返回结果异常: {detail}")]
    UnexpectedReply { detail: String },
}

/// 登录会话错误
#[derive(Debug, Error)]
pub enum SessionError {
    /// 所有登录尝试均失败
    #[error("登录失败，已尝试 {attempts} 次: {last_cause}")]
    AuthenticationExhausted { attempts: usize, last_cause: String },
}

/// 验证码服务错误
#[derive(Debug, Error)]
pub enum CaptchaError {
    /// 网络请求失败
    #[error("验证码服务请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        source: reqwest::Error,
    },
    /// 服务返回错误
    #[error("验证码服务返回错误: {code} {description}")]
    Rejected { code: String, description: String },
    /// 识别结果为空
    #[error("验证码识别结果为空")]
    EmptySolution,
    /// 轮询超时
    #[error("验证码任务 {task_id} 在 {polls} 次轮询后仍未完成")]
    TimedOut { task_id: String, polls: usize },
}

/// 数据行错误
#[derive(Debug, Error)]
pub enum RowError {
    /// 单元格结构不符合预期
    #[error("无法提取发票数据: {reason}")]
    Extraction { reason: String },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 创建目录失败
    #[error("创建目录失败 ({}): {source}", .path.display())]
    CreateDirFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    /// 读取目录失败
    #[error("读取目录失败 ({}): {source}", .path.display())]
    ReadDirFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    /// 移动文件失败（包括复制回退）
    #[error("移动文件失败 ({} -> {}): {source}", .from.display(), .to.display())]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
    /// 删除文件失败
    #[error("删除文件失败 ({}): {source}", .path.display())]
    DeleteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({}): {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 必填项缺失
    #[error("缺少配置项: {key}")]
    Missing { key: String },
    /// 配置值解析失败
    #[error("配置项 {key} 解析失败: 值 '{value}' 无法转换为 {expected}")]
    Invalid {
        key: String,
        value: String,
        expected: String,
    },
    /// 无法识别的月份
    #[error("无法识别的月份: {token}")]
    UnknownMonth { token: String },
    /// 读取配置文件失败
    #[error("读取配置文件失败 ({}): {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({}): {source}", .path.display())]
    TomlParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Browser(BrowserError::UnexpectedReply {
            detail: err.to_string(),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建数据行提取错误
    pub fn extraction(reason: impl Into<String>) -> Self {
        AppError::Row(RowError::Extraction {
            reason: reason.into(),
        })
    }

    /// 创建元素不存在错误
    pub fn element_not_found(locator: impl ToString) -> Self {
        AppError::Browser(BrowserError::ElementNotFound {
            locator: locator.to_string(),
        })
    }

    /// 是否为等待超时
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            AppError::Browser(BrowserError::NavigationTimeout { .. })
        )
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
