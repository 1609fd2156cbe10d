//! 设置门 - 用户通知偏好的本地持有者
//!
//! 简单 CRUD：REST 获取/整体替换更新。获取失败回退到宽松默认值
//! （所有渠道开启、每日摘要、22:00–08:00 免打扰），保证 Presenter
//! 永远有可用配置。更新采用 UI 乐观生效，由服务端响应确认或回滚。

use tracing::warn;

use crate::api::types::NotificationSettings;
use crate::error::{NotifyError, Result};

/// 设置门
#[derive(Debug, Default)]
pub struct SettingsGate {
    settings: NotificationSettings,
    /// 是否拿到过服务端的权威副本
    synced: bool,
}

impl SettingsGate {
    /// 以宽松默认值创建
    pub fn new() -> Self {
        Self {
            settings: NotificationSettings::default(),
            synced: false,
        }
    }

    pub fn current(&self) -> &NotificationSettings {
        &self.settings
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// 应用 REST 获取结果。失败时保留现有配置（首次即默认值）并告警。
    pub fn apply_fetched(&mut self, result: Result<NotificationSettings>) {
        match result {
            Ok(settings) => {
                self.settings = settings;
                self.synced = true;
            }
            Err(e) => {
                warn!(error = %e, synced = self.synced, "settings fetch failed, keeping fallback");
            }
        }
    }

    /// 乐观应用新配置，返回回滚用的旧值
    pub fn apply_optimistic(&mut self, new: NotificationSettings) -> NotificationSettings {
        std::mem::replace(&mut self.settings, new)
    }

    /// 服务端确认：以响应中的副本为准
    pub fn confirm(&mut self, server_copy: NotificationSettings) {
        self.settings = server_copy;
        self.synced = true;
    }

    /// 更新被服务端拒绝：回滚到乐观应用前的值
    pub fn rollback(&mut self, previous: NotificationSettings, error: &NotifyError) {
        warn!(error = %error, "settings update rejected, rolling back");
        self.settings = previous;
    }
}
