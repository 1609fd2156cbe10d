//! 客户端配置 - 环境变量驱动的调优常量
//!
//! 所有调优常量（REST 地址、推送地址、退避参数、列表容量、Toast 时长）
//! 在进程启动时从环境变量读取一次，之后不再变化。
//!
//! 环境变量（均可省略，使用默认值）：
//! - `NOTIFY_BASE_URL` / `NOTIFY_PUSH_URL`
//! - `NOTIFY_REST_TIMEOUT_SECS`
//! - `NOTIFY_BASE_DELAY_MS` / `NOTIFY_MAX_DELAY_MS` / `NOTIFY_MAX_RECONNECT_ATTEMPTS`
//! - `NOTIFY_RECENT_CAP`

use std::time::Duration;
use tracing::warn;

use crate::api::types::Priority;

/// 默认 REST 基础 URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// 默认推送通道 URL
pub const DEFAULT_PUSH_URL: &str = "ws://localhost:8080/ws";

/// REST 请求固定超时（秒）- 超时视为可恢复失败，不改动任何存储
pub const DEFAULT_REST_TIMEOUT_SECS: u64 = 30;

/// 重连退避基础延迟（毫秒）
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// 重连退避延迟上限（毫秒）
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// 连续失败次数上限，超过后进入 Exhausted 状态，需要人工干预
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// 连接成功后到重新订阅之间的安定延迟（毫秒）
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

/// 最近通知缓冲区容量（铃铛下拉列表）
pub const DEFAULT_RECENT_CAP: usize = 50;

/// Toast 自动关闭时长，按优先级区分
#[derive(Debug, Clone, Copy)]
pub struct ToastDurations {
    pub low: Duration,
    pub normal: Duration,
    pub high: Duration,
    pub urgent: Duration,
}

impl Default for ToastDurations {
    fn default() -> Self {
        Self {
            low: Duration::from_secs(3),
            normal: Duration::from_secs(5),
            high: Duration::from_secs(8),
            urgent: Duration::from_secs(10),
        }
    }
}

impl ToastDurations {
    /// 根据优先级取自动关闭时长（Urgent 最长，Low 最短）
    pub fn for_priority(&self, priority: Priority) -> Duration {
        match priority {
            Priority::Low => self.low,
            Priority::Normal => self.normal,
            Priority::High => self.high,
            Priority::Urgent => self.urgent,
        }
    }
}

/// 客户端配置
#[derive(Debug, Clone)]
pub struct Config {
    /// REST 基础 URL
    pub base_url: String,
    /// 推送通道 URL
    pub push_url: String,
    /// REST 请求超时
    pub rest_timeout: Duration,
    /// 退避基础延迟
    pub base_delay: Duration,
    /// 退避延迟上限
    pub max_delay: Duration,
    /// 最大重连次数
    pub max_reconnect_attempts: u32,
    /// 重订阅前的安定延迟
    pub settle_delay: Duration,
    /// 最近通知缓冲区容量
    pub recent_cap: usize,
    /// Toast 时长
    pub toast_durations: ToastDurations,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            push_url: DEFAULT_PUSH_URL.to_string(),
            rest_timeout: Duration::from_secs(DEFAULT_REST_TIMEOUT_SECS),
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            recent_cap: DEFAULT_RECENT_CAP,
            toast_durations: ToastDurations::default(),
        }
    }
}

impl Config {
    /// 从环境变量加载配置，未设置或解析失败则使用默认值
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_string("NOTIFY_BASE_URL", defaults.base_url),
            push_url: env_string("NOTIFY_PUSH_URL", defaults.push_url),
            rest_timeout: Duration::from_secs(env_parse(
                "NOTIFY_REST_TIMEOUT_SECS",
                DEFAULT_REST_TIMEOUT_SECS,
            )),
            base_delay: Duration::from_millis(env_parse(
                "NOTIFY_BASE_DELAY_MS",
                DEFAULT_BASE_DELAY_MS,
            )),
            max_delay: Duration::from_millis(env_parse(
                "NOTIFY_MAX_DELAY_MS",
                DEFAULT_MAX_DELAY_MS,
            )),
            max_reconnect_attempts: env_parse(
                "NOTIFY_MAX_RECONNECT_ATTEMPTS",
                DEFAULT_MAX_RECONNECT_ATTEMPTS,
            ),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            recent_cap: env_parse("NOTIFY_RECENT_CAP", DEFAULT_RECENT_CAP),
            toast_durations: ToastDurations::default(),
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) if !raw.is_empty() => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "invalid value in environment, using default");
            default
        }),
        _ => default,
    }
}
