//! 登录会话服务 - 业务能力层
//!
//! 负责带验证码的登录重试协议：
//! - 登录名只填写一次
//! - 每次尝试重新填写密码和验证码
//! - 达到重试上限后整体失败

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::{AppResult, SessionError};
use crate::infrastructure::{BrowserSurface, Locator};
use crate::models::Credentials;
use crate::services::captcha::{clean_captcha_text, CaptchaOracle};

/// 登录页面元素
#[derive(Debug, Clone)]
pub struct LoginSelectors {
    pub login: Locator,
    pub password: Locator,
    pub captcha_image: Locator,
    pub captcha_input: Locator,
    pub submit: Locator,
    pub error_message: Locator,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            login: Locator::css("#txtLogin"),
            password: Locator::css("#txtSenha"),
            captcha_image: Locator::css("#imgNewCaptcha"),
            captcha_input: Locator::css("#txtCodeTextBox"),
            submit: Locator::css("#btnLogar"),
            error_message: Locator::css("#lblMsg"),
        }
    }
}

/// 登录过程中的等待时间
#[derive(Debug, Clone, Copy)]
pub struct LoginTimings {
    /// 等待登录表单元素
    pub element_timeout: Duration,
    /// 提交后探测错误提示的时间
    pub error_probe: Duration,
    /// 提交后等待页面稳定
    pub submit_settle: Duration,
}

impl Default for LoginTimings {
    fn default() -> Self {
        Self {
            element_timeout: Duration::from_secs(10),
            error_probe: Duration::from_secs(2),
            submit_settle: Duration::from_secs(3),
        }
    }
}

/// 单次登录尝试的结果
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttemptOutcome {
    Accepted,
    Rejected(String),
}

/// 登录会话控制器
pub struct SessionController {
    surface: Arc<dyn BrowserSurface>,
    oracle: Arc<dyn CaptchaOracle>,
    selectors: LoginSelectors,
    timings: LoginTimings,
    max_attempts: usize,
}

impl SessionController {
    /// 创建新的会话控制器（重试上限至少为 1）
    pub fn new(
        surface: Arc<dyn BrowserSurface>,
        oracle: Arc<dyn CaptchaOracle>,
        max_attempts: usize,
    ) -> Self {
        Self {
            surface,
            oracle,
            selectors: LoginSelectors::default(),
            timings: LoginTimings::default(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn with_selectors(mut self, selectors: LoginSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_timings(mut self, timings: LoginTimings) -> Self {
        self.timings = timings;
        self
    }

    /// 打开门户登录页并等待登录表单
    pub async fn open_portal(&self, url: &str) -> AppResult<()> {
        info!("🌐 打开门户: {}", url);
        self.surface.goto(url).await?;
        self.surface
            .wait_present(&self.selectors.login, self.timings.element_timeout)
            .await
    }

    /// 登录
    ///
    /// 任何一次尝试中的意外错误（元素超时、识别失败）都按失败计数，
    /// 最后一次仍失败时返回 `AuthenticationExhausted`。
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<(), SessionError> {
        info!("🔐 开始登录: {}", credentials.login());

        if let Err(e) = self.fill_login(credentials.login()).await {
            error!("✗ 无法填写登录名: {}", e);
            return Err(SessionError::AuthenticationExhausted {
                attempts: 0,
                last_cause: e.to_string(),
            });
        }

        let mut last_cause = String::new();
        for attempt in 1..=self.max_attempts {
            debug!("登录尝试 {}/{}", attempt, self.max_attempts);
            match self.attempt(credentials, attempt > 1).await {
                Ok(AttemptOutcome::Accepted) => {
                    info!("✅ 登录成功 (第 {} 次尝试)", attempt);
                    return Ok(());
                }
                Ok(AttemptOutcome::Rejected(message)) => {
                    warn!(
                        "⚠️ 登录失败 ({}/{}): {}",
                        attempt, self.max_attempts, message
                    );
                    last_cause = message;
                }
                Err(e) => {
                    warn!(
                        "⚠️ 登录尝试出错 ({}/{}): {}",
                        attempt, self.max_attempts, e
                    );
                    last_cause = e.to_string();
                }
            }
        }

        error!("❌ 登录失败，已达到最大尝试次数 {}", self.max_attempts);
        Err(SessionError::AuthenticationExhausted {
            attempts: self.max_attempts,
            last_cause,
        })
    }

    async fn fill_login(&self, login: &str) -> AppResult<()> {
        let field = &self.selectors.login;
        self.surface
            .wait_present(field, self.timings.element_timeout)
            .await?;
        self.surface.type_text(field, login).await
    }

    async fn attempt(&self, credentials: &Credentials, retry: bool) -> AppResult<AttemptOutcome> {
        let s = &self.selectors;
        let timeout = self.timings.element_timeout;

        self.surface.wait_present(&s.password, timeout).await?;
        if retry {
            self.surface.clear(&s.password).await?;
        }
        self.surface
            .type_text(&s.password, credentials.password())
            .await?;

        self.surface.wait_present(&s.captcha_image, timeout).await?;
        let image = self.surface.screenshot(&s.captcha_image).await?;
        let raw = self.oracle.solve(&image).await?;
        let text = clean_captcha_text(&raw);
        debug!("验证码: {} -> {}", raw, text);

        if retry {
            self.surface.clear(&s.captcha_input).await?;
        }
        self.surface.type_text(&s.captcha_input, &text).await?;

        self.surface.wait_clickable(&s.submit, timeout).await?;
        self.surface.click(&s.submit).await?;
        sleep(self.timings.submit_settle).await;

        self.detect_rejection().await
    }

    /// 错误提示在短时间内出现且有内容即视为失败
    async fn detect_rejection(&self) -> AppResult<AttemptOutcome> {
        let probe = &self.selectors.error_message;
        match self.surface.wait_present(probe, self.timings.error_probe).await {
            Ok(()) => {}
            Err(e) if e.is_timeout() => return Ok(AttemptOutcome::Accepted),
            Err(e) => return Err(e),
        }

        let message = self.surface.text(probe).await?;
        let message = message.trim();
        if message.is_empty() {
            Ok(AttemptOutcome::Accepted)
        } else {
            Ok(AttemptOutcome::Rejected(message.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptchaError;
    use crate::testing::{ScriptedOracle, ScriptedSurface};

    fn fast_timings() -> LoginTimings {
        LoginTimings {
            element_timeout: Duration::from_millis(10),
            error_probe: Duration::ZERO,
            submit_settle: Duration::ZERO,
        }
    }

    fn controller(
        surface: Arc<ScriptedSurface>,
        oracle: Arc<ScriptedOracle>,
        max_attempts: usize,
    ) -> SessionController {
        SessionController::new(surface, oracle, max_attempts).with_timings(fast_timings())
    }

    fn credentials() -> Credentials {
        Credentials::new("12345678000199", "segredo")
    }

    #[tokio::test]
    async fn test_success_after_captcha_failures() {
        let surface = Arc::new(ScriptedSurface::new().with_text(
            "#lblMsg",
            &["Código inválido", "Código inválido", ""],
        ));
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok("x1ty2".to_string()),
            Ok("x1ty2".to_string()),
            Ok("k9t8".to_string()),
        ]));

        controller(surface.clone(), oracle.clone(), 3)
            .authenticate(&credentials())
            .await
            .unwrap();

        assert_eq!(surface.count_actions("type #txtLogin "), 1);
        assert_eq!(surface.count_actions("type #txtSenha "), 3);
        assert_eq!(surface.count_actions("clear #txtSenha"), 2);
        assert_eq!(surface.count_actions("clear #txtCodeTextBox"), 2);
        assert_eq!(surface.count_actions("click #btnLogar"), 3);
        assert_eq!(oracle.calls(), 3);
        assert_eq!(
            surface.actions().iter().filter(|a| a.starts_with("type #txtCodeTextBox")).last(),
            Some(&"type #txtCodeTextBox k98".to_string())
        );
    }

    #[tokio::test]
    async fn test_attempt_order_on_retry() {
        let surface = Arc::new(ScriptedSurface::new().with_text("#lblMsg", &["Erro", ""]));
        let oracle = Arc::new(ScriptedOracle::default());

        controller(surface.clone(), oracle, 3)
            .authenticate(&credentials())
            .await
            .unwrap();

        let actions = surface.actions();
        let second_attempt: Vec<&str> = actions
            .iter()
            .map(String::as_str)
            .skip_while(|a| !a.starts_with("clear"))
            .collect();
        assert_eq!(
            second_attempt,
            vec![
                "clear #txtSenha",
                "type #txtSenha segredo",
                "screenshot #imgNewCaptcha",
                "clear #txtCodeTextBox",
                "type #txtCodeTextBox abc12",
                "click #btnLogar",
            ]
        );
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_cause() {
        let surface = Arc::new(ScriptedSurface::new().with_text("#lblMsg", &["Código inválido"]));
        let oracle = Arc::new(ScriptedOracle::default());

        let err = controller(surface.clone(), oracle.clone(), 3)
            .authenticate(&credentials())
            .await
            .unwrap_err();

        let SessionError::AuthenticationExhausted {
            attempts,
            last_cause,
        } = err;
        assert_eq!(attempts, 3);
        assert_eq!(last_cause, "Código inválido");
        assert_eq!(oracle.calls(), 3);
        assert_eq!(surface.count_actions("type #txtLogin "), 1);
    }

    #[tokio::test]
    async fn test_oracle_failure_counts_as_attempt() {
        let surface = Arc::new(ScriptedSurface::new().with_missing("#lblMsg"));
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Err(CaptchaError::EmptySolution),
            Ok("abc".to_string()),
        ]));

        controller(surface.clone(), oracle.clone(), 2)
            .authenticate(&credentials())
            .await
            .unwrap();

        assert_eq!(oracle.calls(), 2);
        assert_eq!(surface.count_actions("click #btnLogar"), 1);
    }

    #[tokio::test]
    async fn test_oracle_failure_on_last_attempt_is_fatal() {
        let surface = Arc::new(ScriptedSurface::new());
        let oracle = Arc::new(ScriptedOracle::new(vec![Err(CaptchaError::EmptySolution)]));

        let err = controller(surface, oracle, 1)
            .authenticate(&credentials())
            .await
            .unwrap_err();

        let SessionError::AuthenticationExhausted { attempts, last_cause } = err;
        assert_eq!(attempts, 1);
        assert!(last_cause.contains("验证码"));
    }

    #[tokio::test]
    async fn test_missing_login_field_aborts_before_attempts() {
        let surface = Arc::new(ScriptedSurface::new().with_missing("#txtLogin"));
        let oracle = Arc::new(ScriptedOracle::default());

        let err = controller(surface, oracle.clone(), 3)
            .authenticate(&credentials())
            .await
            .unwrap_err();

        let SessionError::AuthenticationExhausted { attempts, .. } = err;
        assert_eq!(attempts, 0);
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_open_portal_waits_for_login_form() {
        let surface = Arc::new(ScriptedSurface::new());
        let oracle = Arc::new(ScriptedOracle::default());

        controller(surface.clone(), oracle, 3)
            .open_portal("https://nfse.example.gov.br/")
            .await
            .unwrap();

        assert_eq!(surface.actions(), vec!["goto https://nfse.example.gov.br/"]);
    }
}
