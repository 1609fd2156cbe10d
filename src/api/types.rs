//! 通知领域类型 - 与服务端 JSON 约定一一对应
//!
//! 所有 wire 类型使用 camelCase 字段名。`Notification` 由服务端创建并分配
//! 稳定 id，客户端只能通过 mark-read / delete 请求间接修改。

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// 通知优先级（有序：Low < Normal < High < Urgent）
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Normal => "NORMAL",
            Priority::High => "HIGH",
            Priority::Urgent => "URGENT",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 通知类别标签，由触发的领域事件决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    DocumentSubmitted,
    DocumentApproved,
    DocumentRejected,
    NewVersion,
    NewComment,
    CommentResolved,
    CollaboratorAdded,
    CollaboratorRemoved,
    RegistrationApproval,
    /// 未知类别（向前兼容：新服务端事件不应导致反序列化失败）
    #[serde(other)]
    Other,
}

/// 展示层类别，用于按类别开关过滤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Documents,
    Comments,
    Approvals,
}

impl NotificationKind {
    /// 映射到展示层类别
    pub fn category(&self) -> Category {
        match self {
            NotificationKind::DocumentSubmitted
            | NotificationKind::DocumentApproved
            | NotificationKind::DocumentRejected
            | NotificationKind::NewVersion
            | NotificationKind::CollaboratorAdded
            | NotificationKind::CollaboratorRemoved
            | NotificationKind::Other => Category::Documents,
            NotificationKind::NewComment | NotificationKind::CommentResolved => {
                Category::Comments
            }
            NotificationKind::RegistrationApproval => Category::Approvals,
        }
    }
}

/// 单条通知
///
/// 不变式：`is_read == true` 时 `read_at` 必有值。
/// 读状态单调：false → true，只有权威重同步可以整体替换。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// 服务端分配的稳定标识
    pub id: i64,
    /// 标题
    pub title: String,
    /// 正文
    pub message: String,
    /// 类别标签
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// 优先级
    pub priority: Priority,
    /// 是否已读（单调 false → true）
    pub is_read: bool,
    /// 可选的跳转目标
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    /// 服务端创建时间（不可变）
    pub created_at: DateTime<Utc>,
    /// 首次标记已读的时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    /// 触发人显示名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by_name: Option<String>,
}

/// 聚合计数 - 从权威通知集派生，客户端持有最终一致的缓存副本
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSummary {
    /// 未读数（≥0）
    pub unread_count: u32,
    /// 总数（≥ unread_count）
    pub total_count: u32,
    /// 是否存在未读的 URGENT 通知
    pub has_urgent: bool,
    /// 文档类计数
    #[serde(default)]
    pub document_count: u32,
    /// 评论类计数
    #[serde(default)]
    pub comment_count: u32,
    /// 审批类计数
    #[serde(default)]
    pub approval_count: u32,
}

/// 摘要推送频率
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DigestFrequency {
    None,
    Daily,
    Weekly,
}

/// 用户通知偏好
///
/// 获取失败时回退到宽松默认值（见 [`NotificationSettings::default`]），
/// 保证 Presenter 永远有可用配置。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    /// 邮件渠道总开关
    pub email_enabled: bool,
    /// 浏览器渠道总开关
    pub browser_enabled: bool,
    /// 文档类通知开关
    pub document_updates: bool,
    /// 评论类通知开关
    pub comment_updates: bool,
    /// 审批类通知开关
    pub approval_updates: bool,
    /// 摘要推送频率
    pub digest_frequency: DigestFrequency,
    /// 免打扰开始时间（"HH:MM"）
    pub quiet_hours_start: String,
    /// 免打扰结束时间（"HH:MM"），允许跨午夜
    pub quiet_hours_end: String,
}

impl Default for NotificationSettings {
    /// 宽松默认值：所有渠道开启，每日摘要，22:00–08:00 免打扰
    fn default() -> Self {
        Self {
            email_enabled: true,
            browser_enabled: true,
            document_updates: true,
            comment_updates: true,
            approval_updates: true,
            digest_frequency: DigestFrequency::Daily,
            quiet_hours_start: "22:00".to_string(),
            quiet_hours_end: "08:00".to_string(),
        }
    }
}

impl NotificationSettings {
    /// 某个类别是否开启
    pub fn category_enabled(&self, category: Category) -> bool {
        match category {
            Category::Documents => self.document_updates,
            Category::Comments => self.comment_updates,
            Category::Approvals => self.approval_updates,
        }
    }

    /// 解析免打扰时间窗。任一端解析失败返回 None（视为未配置）。
    pub fn quiet_hours(&self) -> Option<(NaiveTime, NaiveTime)> {
        let start = NaiveTime::parse_from_str(&self.quiet_hours_start, "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(&self.quiet_hours_end, "%H:%M").ok()?;
        Some((start, end))
    }
}

/// 分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// 当前页内容
    pub content: Vec<T>,
    /// 页号（从 0 开始）
    pub page: u32,
    /// 页大小
    pub size: u32,
    /// 总条数
    pub total_elements: u64,
    /// 总页数
    pub total_pages: u32,
}
