//! 聚合计数存储 - 未读/总数/类别计数的唯一持有者
//!
//! 三类生产者（推送、REST 刷新、本地乐观增减）全部通过本模块的操作 API
//! 收敛到同一份聚合，外部不允许直接写字段。
//!
//! ## 快照优先策略
//!
//! 推送摘要与 REST 摘要都视为"到达即权威"的完整快照，到达时整体替换
//! （replace-on-arrival）。乐观增减只在两次快照之间生效；快照可能短暂
//! 覆盖在途的乐观增减，由下一次快照纠正（客户端在每次本地变更确认后
//! 触发一次 REST 重同步）。
//!
//! 不变式：任何操作之后 `0 ≤ unread_count ≤ total_count`。

use tracing::debug;

use crate::api::types::NotificationSummary;

/// 聚合计数存储
#[derive(Debug, Default)]
pub struct SummaryStore {
    summary: NotificationSummary,
}

impl SummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前聚合（只读）
    pub fn get(&self) -> &NotificationSummary {
        &self.summary
    }

    pub fn unread_count(&self) -> u32 {
        self.summary.unread_count
    }

    /// REST 拉取后的权威替换，覆盖所有过期的乐观增减
    pub fn set_summary(&mut self, full: NotificationSummary) {
        self.summary = Self::normalize(full);
    }

    /// 服务端推送的聚合快照，同样到达即权威
    pub fn apply_push(&mut self, pushed: NotificationSummary) {
        self.summary = Self::normalize(pushed);
    }

    /// 推送到达时的乐观自增：新通知同时增加未读数与总数
    pub fn increment_unread(&mut self) {
        self.summary.unread_count = self.summary.unread_count.saturating_add(1);
        self.summary.total_count = self
            .summary
            .total_count
            .saturating_add(1)
            .max(self.summary.unread_count);
    }

    /// 本地已读时的乐观自减，钳制在 0
    pub fn decrement_unread(&mut self) {
        self.summary.unread_count = self.summary.unread_count.saturating_sub(1);
        if self.summary.unread_count == 0 {
            self.summary.has_urgent = false;
        }
    }

    /// mark-all-read 的乐观归零
    pub fn clear_unread(&mut self) {
        self.summary.unread_count = 0;
        self.summary.has_urgent = false;
    }

    /// 推送到达的通知为 URGENT 时由客户端调用
    pub fn note_urgent(&mut self) {
        self.summary.has_urgent = true;
    }

    /// 修复不一致的入站快照：unread 不得超过 total
    fn normalize(mut summary: NotificationSummary) -> NotificationSummary {
        if summary.unread_count > summary.total_count {
            debug!(
                unread = summary.unread_count,
                total = summary.total_count,
                "inbound summary has unread > total, clamping"
            );
            summary.unread_count = summary.total_count;
        }
        summary
    }
}
