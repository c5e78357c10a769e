//! 考试 API 客户端
//!
//! 封装所有与考试服务端相关的 HTTP 调用

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::exam_api::ExamApi;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{ExamData, ExamResponse, FinishRequest, SecurityEvent, SyncEnvelope};

/// 考试 API 客户端
pub struct ExamClient {
    http: Client,
    base_url: String,
}

impl ExamClient {
    /// 创建新的考试客户端
    pub fn new(config: &Config) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// 发送 JSON POST 请求，只关心是否成功
    async fn post_json<T: Serialize + ?Sized>(&self, endpoint: &str, body: &T) -> AppResult<()> {
        debug!("POST {} payload: {}", endpoint, serde_json::to_string(body)?);
        let resp = self
            .http
            .post(self.url(endpoint))
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(endpoint, e))?;
        Self::check_status(endpoint, resp).await?;
        Ok(())
    }

    /// 非 2xx 响应转换为错误，附带响应体方便排查
    async fn check_status(endpoint: &str, resp: Response) -> AppResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.ok().filter(|b| !b.is_empty());
        Err(AppError::bad_status(endpoint, status.as_u16(), body))
    }
}

#[async_trait]
impl ExamApi for ExamClient {
    async fn fetch_exam(&self, session_id: &str) -> AppResult<ExamData> {
        let endpoint = format!("exam/{}", session_id);
        let resp = self
            .http
            .get(self.url(&endpoint))
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(&endpoint, e))?;
        let resp = Self::check_status(&endpoint, resp).await?;
        let text = resp
            .text()
            .await
            .map_err(|e| AppError::api_request_failed(&endpoint, e))?;
        let parsed: ExamResponse = serde_json::from_str(&text)?;
        debug!("考试数据已获取: {} 字节", text.len());
        Ok(parsed.exam_data)
    }

    async fn save_progress(&self, envelope: &SyncEnvelope) -> AppResult<()> {
        self.post_json("exam/save-progress", envelope).await
    }

    async fn log_security(&self, event: &SecurityEvent) -> AppResult<()> {
        self.post_json("exam/log-security", event).await
    }

    async fn finish(&self, session_id: &str, request: &FinishRequest) -> AppResult<()> {
        let endpoint = format!("test-session/{}/finish", session_id);
        self.post_json(&endpoint, request).await
    }
}
