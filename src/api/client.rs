//! REST 网关 - 通知后端的薄封装
//!
//! 所有请求携带 Bearer 凭证，使用固定超时（默认 30 秒）。超时与网络错误
//! 视为可恢复失败：调用方保持既有状态不变并提供重试入口。
//!
//! 后端实现不在本 crate 范围内，[`NotificationGateway`] 是唯一契约，
//! 测试用内存实现替换。

use async_trait::async_trait;
use tracing::debug;

use crate::api::types::{Notification, NotificationSettings, NotificationSummary, Page};
use crate::config::Config;
use crate::error::{NotifyError, Result};

/// 通知 REST 契约
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// GET /notifications/unread
    async fn fetch_unread(&self) -> Result<Vec<Notification>>;

    /// GET /notifications?page&size
    async fn fetch_page(&self, page: u32, size: u32) -> Result<Page<Notification>>;

    /// GET /notifications/summary
    async fn fetch_summary(&self) -> Result<NotificationSummary>;

    /// PUT /notifications/{id}/read
    async fn mark_read(&self, id: i64) -> Result<()>;

    /// PUT /notifications/read-all
    async fn mark_all_read(&self) -> Result<()>;

    /// DELETE /notifications/{id}
    async fn delete(&self, id: i64) -> Result<()>;

    /// GET /notifications/settings
    async fn fetch_settings(&self) -> Result<NotificationSettings>;

    /// PUT /notifications/settings（整体替换）
    async fn update_settings(
        &self,
        settings: &NotificationSettings,
    ) -> Result<NotificationSettings>;
}

/// 基于 reqwest 的网关实现
#[derive(Clone)]
pub struct RestGateway {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl RestGateway {
    /// 创建网关。`base_url` 不带结尾斜杠，如 `http://host/api`。
    pub fn new(config: &Config, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.rest_timeout)
            .build()
            .map_err(|e| NotifyError::Request(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 状态码映射到错误分类：401/403 → Auth，404/409 → Stale，其余非 2xx → Request
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        debug!(status = %status, body = %body, "request rejected");
        match status.as_u16() {
            401 | 403 => Err(NotifyError::Auth(format!("{}: {}", status, body))),
            404 | 409 => Err(NotifyError::Stale(format!("{}: {}", status, body))),
            _ => Err(NotifyError::Request(format!("{}: {}", status, body))),
        }
    }

    fn map_send_error(e: reqwest::Error) -> NotifyError {
        if e.is_timeout() {
            NotifyError::Timeout
        } else {
            NotifyError::Request(e.to_string())
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        let resp = Self::check(resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))
    }

    async fn send_ack(&self, req: reqwest::RequestBuilder) -> Result<()> {
        let resp = req
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        Self::check(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationGateway for RestGateway {
    async fn fetch_unread(&self) -> Result<Vec<Notification>> {
        self.get_json("/notifications/unread").await
    }

    async fn fetch_page(&self, page: u32, size: u32) -> Result<Page<Notification>> {
        self.get_json(&format!("/notifications?page={}&size={}", page, size))
            .await
    }

    async fn fetch_summary(&self) -> Result<NotificationSummary> {
        self.get_json("/notifications/summary").await
    }

    async fn mark_read(&self, id: i64) -> Result<()> {
        self.send_ack(self.http.put(self.url(&format!("/notifications/{}/read", id))))
            .await
    }

    async fn mark_all_read(&self) -> Result<()> {
        self.send_ack(self.http.put(self.url("/notifications/read-all")))
            .await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.send_ack(self.http.delete(self.url(&format!("/notifications/{}", id))))
            .await
    }

    async fn fetch_settings(&self) -> Result<NotificationSettings> {
        self.get_json("/notifications/settings").await
    }

    async fn update_settings(
        &self,
        settings: &NotificationSettings,
    ) -> Result<NotificationSettings> {
        let resp = self
            .http
            .put(self.url("/notifications/settings"))
            .bearer_auth(&self.token)
            .json(settings)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        let resp = Self::check(resp).await?;
        resp.json::<NotificationSettings>()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))
    }
}
