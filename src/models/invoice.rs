use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// 占位标识（提取失败时用于日志）
pub const UNKNOWN: &str = "unknown";

/// 登录凭据，整个运行期间不可变
#[derive(Clone, Deserialize)]
pub struct Credentials {
    login: String,
    password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

/// 从一行发票中提取出的标识字段（已规范化）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceFields {
    /// 发票号
    pub number: String,
    /// 开票日期（单元格文本的第一个空白分隔词）
    pub date: String,
    /// 金额（去掉千分位，小数点替换为下划线）
    pub value: String,
}

impl InvoiceFields {
    /// 从单元格原始文本构建
    ///
    /// # 参数
    /// - `number_text`: 发票号单元格
    /// - `date_text`: 日期单元格，如 `01/06/2025 10:32:11`
    /// - `value_text`: 金额单元格，如 `1.500,00`
    pub fn from_cells(number_text: &str, date_text: &str, value_text: &str) -> AppResult<Self> {
        let number = number_text.trim();
        if number.is_empty() {
            return Err(AppError::extraction("发票号为空"));
        }

        let date = first_token(date_text)
            .ok_or_else(|| AppError::extraction(format!("日期单元格为空 (发票 {})", number)))?;

        let value = normalize_value(value_text);
        if value.is_empty() {
            return Err(AppError::extraction(format!("金额单元格为空 (发票 {})", number)));
        }

        Ok(Self {
            number: number.to_string(),
            date: date.to_string(),
            value,
        })
    }

    /// 只知道发票号时使用（日期、金额未知）
    pub fn number_only(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            date: UNKNOWN.to_string(),
            value: UNKNOWN.to_string(),
        }
    }

    /// 目标文件名（未清理）：`{date}_{number}_{value}.{ext}`
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}_{}_{}.{}", self.date, self.number, self.value, extension)
    }
}

impl fmt::Display for InvoiceFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "发票 {} | 日期: {} | 金额: {}",
            self.number, self.date, self.value
        )
    }
}

/// 取第一个空白分隔的词
pub fn first_token(text: &str) -> Option<&str> {
    text.split_whitespace().next()
}

/// 规范化金额文本：去掉千分位 `.`，小数点 `,` 替换为 `_`
pub fn normalize_value(text: &str) -> String {
    text.trim().replace('.', "").replace(',', "_")
}
