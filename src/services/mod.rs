//! 业务能力层（Services）
//!
//! 每个服务只提供一种能力，不关心流程顺序

pub mod audit_log;
pub mod captcha;
pub mod reconciler;
pub mod session;

pub use audit_log::AuditLog;
pub use captcha::{clean_captcha_text, CapSolverClient, CaptchaOracle};
pub use reconciler::{sanitize_filename, DownloadReconciler, ReconcileOutcome};
pub use session::{LoginSelectors, LoginTimings, SessionController};
