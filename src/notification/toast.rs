//! Toast 与原生通知的输出席位
//!
//! Presenter 只做决策，实际展示通过两个 trait 席位输出：
//! - [`ToastSink`]：应用内瞬态 Toast（UI 层实现；CLI 提供控制台实现）
//! - [`NativeNotifier`]：操作系统级通知，权限可能缺失或被拒绝，
//!   所有路径在其不可用时照常工作

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::types::Priority;

/// Toast 显著程度，由优先级派生
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastSeverity {
    Info,
    Warning,
    Critical,
}

impl ToastSeverity {
    pub fn from_priority(priority: Priority) -> Self {
        match priority {
            Priority::Low | Priority::Normal => ToastSeverity::Info,
            Priority::High => ToastSeverity::Warning,
            Priority::Urgent => ToastSeverity::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToastSeverity::Info => "info",
            ToastSeverity::Warning => "warning",
            ToastSeverity::Critical => "critical",
        }
    }
}

/// 一条待展示的瞬态 Toast
#[derive(Debug, Clone)]
pub struct Toast {
    /// 展示标识，用于 UI 层自身的去重/更新（`notification-{id}` 或 `system-*`）
    pub key: String,
    /// 标题
    pub title: String,
    /// 正文
    pub body: String,
    /// 显著程度
    pub severity: ToastSeverity,
    /// 自动关闭时长（Urgent 最长，Low 最短）
    pub duration: Duration,
    /// 点击跳转目标
    pub action_url: Option<String>,
}

/// 应用内 Toast 输出席位
pub trait ToastSink: Send + Sync {
    fn show(&self, toast: &Toast);
}

/// 操作系统级通知能力
pub trait NativeNotifier: Send + Sync {
    /// 用户是否已授予通知权限
    fn permission_granted(&self) -> bool;

    /// 弹出原生通知。只在 `permission_granted()` 为 true 时调用。
    fn notify(&self, title: &str, body: &str);
}

/// 无原生通知能力（权限缺失/被拒绝时的默认实现）
pub struct NoopNativeNotifier;

impl NativeNotifier for NoopNativeNotifier {
    fn permission_granted(&self) -> bool {
        false
    }

    fn notify(&self, _title: &str, _body: &str) {}
}

/// 控制台 Toast 输出，供 CLI 运行模式使用
pub struct ConsoleToastSink;

impl ToastSink for ConsoleToastSink {
    fn show(&self, toast: &Toast) {
        println!(
            "[{}] {} — {} ({}s)",
            toast.severity.as_str(),
            toast.title,
            toast.body,
            toast.duration.as_secs()
        );
    }
}
