use std::fmt;
use std::str::FromStr;

use phf::phf_map;

use crate::error::ConfigError;

/// 月份枚举
///
/// 门户的月份下拉框使用葡萄牙语月份名，枚举值即为月份序号。
/// 月份标签只接受这 12 个名称，其他标签在配置校验时即被拒绝。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Month {
    Janeiro = 1,
    Fevereiro = 2,
    Marco = 3,
    Abril = 4,
    Maio = 5,
    Junho = 6,
    Julho = 7,
    Agosto = 8,
    Setembro = 9,
    Outubro = 10,
    Novembro = 11,
    Dezembro = 12,
}

/// 小写名称 -> 月份（含去掉重音的写法）
static MONTH_NAMES: phf::Map<&'static str, Month> = phf_map! {
    "janeiro" => Month::Janeiro,
    "fevereiro" => Month::Fevereiro,
    "março" => Month::Marco,
    "marco" => Month::Marco,
    "abril" => Month::Abril,
    "maio" => Month::Maio,
    "junho" => Month::Junho,
    "julho" => Month::Julho,
    "agosto" => Month::Agosto,
    "setembro" => Month::Setembro,
    "outubro" => Month::Outubro,
    "novembro" => Month::Novembro,
    "dezembro" => Month::Dezembro,
};

impl Month {
    /// 获取月份序号（1-12）
    pub fn number(self) -> u8 {
        self as u8
    }

    /// 获取门户下拉框中显示的标准名称
    pub fn label(self) -> &'static str {
        match self {
            Month::Janeiro => "Janeiro",
            Month::Fevereiro => "Fevereiro",
            Month::Marco => "Março",
            Month::Abril => "Abril",
            Month::Maio => "Maio",
            Month::Junho => "Junho",
            Month::Julho => "Julho",
            Month::Agosto => "Agosto",
            Month::Setembro => "Setembro",
            Month::Outubro => "Outubro",
            Month::Novembro => "Novembro",
            Month::Dezembro => "Dezembro",
        }
    }

    /// 从序号解析月份
    pub fn from_number(number: u8) -> Option<Self> {
        Self::all().into_iter().find(|m| m.number() == number)
    }

    /// 从名称解析月份（不区分大小写）
    pub fn from_name(name: &str) -> Option<Self> {
        MONTH_NAMES.get(name.trim().to_lowercase().as_str()).copied()
    }

    /// 获取所有月份
    pub fn all() -> [Month; 12] {
        [
            Month::Janeiro,
            Month::Fevereiro,
            Month::Marco,
            Month::Abril,
            Month::Maio,
            Month::Junho,
            Month::Julho,
            Month::Agosto,
            Month::Setembro,
            Month::Outubro,
            Month::Novembro,
            Month::Dezembro,
        ]
    }
}

impl FromStr for Month {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| ConfigError::UnknownMonth {
            token: s.to_string(),
        })
    }
}

impl TryFrom<String> for Month {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Month> for String {
    fn from(month: Month) -> Self {
        month.label().to_string()
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
