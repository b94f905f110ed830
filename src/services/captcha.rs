//! 验证码识别服务 - 业务能力层
//!
//! 只负责"图片 → 文本"能力，不关心登录流程
//!
//! ## 技术栈
//! - 使用 `reqwest` 调用 CapSolver 的 `ImageToTextTask`
//! - 图片以 base64 形式提交

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::CaptchaError;

/// 识别结果中经常被多识别出来的字符
const OVER_RECOGNIZED: &[char] = &['t'];

/// 验证码识别能力
#[async_trait]
pub trait CaptchaOracle: Send + Sync {
    /// 识别验证码图片，返回原始文本
    async fn solve(&self, image: &[u8]) -> Result<String, CaptchaError>;
}

/// 清理识别结果：去掉多识别的字符和空白
pub fn clean_captcha_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| !OVER_RECOGNIZED.contains(c) && !c.is_whitespace())
        .collect()
}

// ========== CapSolver 请求 / 响应结构 ==========

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskRequest<'a> {
    client_key: &'a str,
    task: ImageToTextTask,
}

#[derive(Debug, Serialize)]
struct ImageToTextTask {
    #[serde(rename = "type")]
    kind: &'static str,
    body: String,
    module: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskResultRequest<'a> {
    client_key: &'a str,
    task_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskResponse {
    #[serde(default)]
    error_id: i64,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    solution: Option<Solution>,
}

#[derive(Debug, Deserialize)]
struct Solution {
    #[serde(default)]
    text: Option<String>,
}

/// 单次响应的解析结果
#[derive(Debug, PartialEq, Eq)]
enum TaskState {
    Ready(String),
    Pending(String),
}

impl TaskResponse {
    fn into_state(self) -> Result<TaskState, CaptchaError> {
        if self.error_id != 0 {
            return Err(CaptchaError::Rejected {
                code: self.error_code.unwrap_or_default(),
                description: self.error_description.unwrap_or_default(),
            });
        }

        if self.status.as_deref() == Some("ready") {
            let text = self
                .solution
                .and_then(|s| s.text)
                .filter(|t| !t.trim().is_empty())
                .ok_or(CaptchaError::EmptySolution)?;
            return Ok(TaskState::Ready(text));
        }

        match self.task_id {
            Some(task_id) => Ok(TaskState::Pending(task_id)),
            None => Err(CaptchaError::EmptySolution),
        }
    }
}

/// CapSolver 客户端
pub struct CapSolverClient {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    poll_interval: Duration,
    max_polls: usize,
}

impl CapSolverClient {
    /// 创建新的客户端
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            poll_interval: Duration::from_secs(1),
            max_polls: 20,
        }
    }

    /// 自定义轮询参数
    pub fn with_polling(mut self, poll_interval: Duration, max_polls: usize) -> Self {
        self.poll_interval = poll_interval;
        self.max_polls = max_polls;
        self
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<TaskResponse, CaptchaError> {
        let endpoint = format!("{}/{}", self.api_base, path);
        let wrap = |source| CaptchaError::RequestFailed {
            endpoint: endpoint.clone(),
            source,
        };

        let response = self
            .http
            .post(&endpoint)
            .json(body)
            .send()
            .await
            .map_err(wrap)?;
        response.json::<TaskResponse>().await.map_err(wrap)
    }
}

#[async_trait]
impl CaptchaOracle for CapSolverClient {
    async fn solve(&self, image: &[u8]) -> Result<String, CaptchaError> {
        debug!("提交验证码图片: {} 字节", image.len());

        let request = CreateTaskRequest {
            client_key: &self.api_key,
            task: ImageToTextTask {
                kind: "ImageToTextTask",
                body: STANDARD.encode(image),
                module: "common",
            },
        };

        let task_id = match self.post("createTask", &request).await?.into_state()? {
            TaskState::Ready(text) => {
                info!("✓ 验证码识别完成: {}", text);
                return Ok(text);
            }
            TaskState::Pending(task_id) => task_id,
        };

        for poll in 1..=self.max_polls {
            sleep(self.poll_interval).await;
            let request = TaskResultRequest {
                client_key: &self.api_key,
                task_id: &task_id,
            };
            match self.post("getTaskResult", &request).await?.into_state()? {
                TaskState::Ready(text) => {
                    info!("✓ 验证码识别完成 (轮询 {} 次): {}", poll, text);
                    return Ok(text);
                }
                TaskState::Pending(_) => debug!("验证码任务处理中 ({}/{})", poll, self.max_polls),
            }
        }

        warn!("验证码任务 {} 超时", task_id);
        Err(CaptchaError::TimedOut {
            task_id,
            polls: self.max_polls,
        })
    }
}
