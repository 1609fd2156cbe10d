//! 投递决策器 - 决定新到推送是否/如何展示
//!
//! 决策顺序：浏览器渠道总开关 → 按类别开关 → 免打扰时间窗（支持跨
//! 午夜回绕，区间左闭右开）→ 按 id 去重 → 展示。展示为瞬态 Toast，
//! 显著程度与自动关闭时长由优先级派生；若原生通知权限已授予则同时
//! 弹原生通知。

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use tracing::debug;

use crate::api::types::{Notification, NotificationSettings};
use crate::config::ToastDurations;
use crate::notification::dedup::PresentationDeduplicator;
use crate::notification::toast::{NativeNotifier, Toast, ToastSeverity, ToastSink};

/// 单次投递决策的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentDecision {
    /// 已展示
    Presented,
    /// 浏览器渠道关闭
    ChannelDisabled,
    /// 对应类别开关关闭
    CategoryDisabled,
    /// 处于免打扰时间窗
    QuietHours,
    /// 窗口内重复展示（重连重放）
    Duplicate,
}

/// 投递决策器
pub struct DeliveryPresenter {
    dedup: PresentationDeduplicator,
    durations: ToastDurations,
    sink: Arc<dyn ToastSink>,
    native: Arc<dyn NativeNotifier>,
}

impl DeliveryPresenter {
    pub fn new(
        sink: Arc<dyn ToastSink>,
        native: Arc<dyn NativeNotifier>,
        durations: ToastDurations,
    ) -> Self {
        Self {
            dedup: PresentationDeduplicator::new(),
            durations,
            sink,
            native,
        }
    }

    /// 对一条新到推送做完整决策，`now` 为本地时间（便于测试注入）
    pub fn present(
        &mut self,
        notification: &Notification,
        settings: &NotificationSettings,
        now: NaiveTime,
    ) -> PresentDecision {
        if !settings.browser_enabled {
            return PresentDecision::ChannelDisabled;
        }
        if !settings.category_enabled(notification.kind.category()) {
            return PresentDecision::CategoryDisabled;
        }
        if let Some((start, end)) = settings.quiet_hours() {
            if in_quiet_hours(now, start, end) {
                debug!(id = notification.id, "suppressed by quiet hours");
                return PresentDecision::QuietHours;
            }
        }
        if !self.dedup.should_present(notification.id) {
            return PresentDecision::Duplicate;
        }

        let toast = Toast {
            key: format!("notification-{}", notification.id),
            title: notification.title.clone(),
            body: notification.message.clone(),
            severity: ToastSeverity::from_priority(notification.priority),
            duration: self.durations.for_priority(notification.priority),
            action_url: notification.action_url.clone(),
        };
        self.sink.show(&toast);

        if self.native.permission_granted() {
            self.native.notify(&notification.title, &notification.message);
        }
        PresentDecision::Presented
    }

    /// 系统级错误 Toast（连接耗尽等）。不走渠道/免打扰过滤，
    /// 一次性语义由重连控制器的 first-occurrence 标志保证。
    pub fn present_system_error(&self, key: &str, title: &str, body: &str) {
        self.sink.show(&Toast {
            key: key.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            severity: ToastSeverity::Critical,
            duration: Duration::from_secs(10),
            action_url: None,
        });
    }
}

/// `now` 是否落在 `[start, end)` 内，`start > end` 表示跨午夜回绕
pub fn in_quiet_hours(now: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    use std::cmp::Ordering;
    match start.cmp(&end) {
        // 退化窗口（start == end）视为未配置
        Ordering::Equal => false,
        Ordering::Less => now >= start && now < end,
        Ordering::Greater => now >= start || now < end,
    }
}
