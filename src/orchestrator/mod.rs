//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责整体流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `harvest` - 整体运行
//! - 管理应用生命周期（初始化、运行）
//! - 管理浏览器资源（Browser、ChromiumSurface）
//! - 登录失败时整体失败
//! - 输出运行报告
//!
//! ### `traversal` - 月份 / 页面遍历
//! - 遍历月份和页面
//! - 为每一行创建 RowCtx 并交给 RowProcessor
//! - 月份级别的错误隔离
//! - 输出统计信息
//!
//! ## 层次关系
//!
//! ```text
//! harvest (登录 + 整体流程)
//!     ↓
//! traversal (处理 Vec<Month> → 页面 → 行)
//!     ↓
//! workflow::RowProcessor (处理单行发票)
//!     ↓
//! services / portal (能力层：session / captcha / reconciler / audit_log / 方言)
//!     ↓
//! infrastructure (基础设施：BrowserSurface)
//! ```

pub mod harvest;
pub mod traversal;

// 重新导出主要类型
pub use harvest::{App, Harvester, RunReport};
pub use traversal::{TraversalEngine, TraversalStats};
