//! Notification client error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Errors produced by the notification client core.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// A publish/subscribe was attempted while the push channel is down.
    #[error("not connected")]
    NotConnected,

    /// Credential rejected or missing. Never retried with the same token.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transient connection failure (socket close, handshake failure).
    #[error("connection error: {0}")]
    Connection(String),

    /// REST request failed with a non-auth, non-conflict status.
    #[error("request failed: {0}")]
    Request(String),

    /// REST request exceeded the fixed timeout. Recoverable, state untouched.
    #[error("request timed out")]
    Timeout,

    /// The server no longer knows the entity we tried to mutate
    /// (e.g. mark-read on a notification deleted elsewhere).
    #[error("stale state: {0}")]
    Stale(String),

    /// Malformed frame or payload on the wire.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl NotifyError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an authentication error.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// 认证类错误不应以同一凭证重试
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// 瞬时失败：重试可能成功（连接层退避重试，动作层提示用户重试）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Request(_) | Self::Timeout | Self::NotConnected
        )
    }
}
