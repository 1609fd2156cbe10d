//! DocReview 实时通知客户端核心
//!
//! 维护"未读聚合"与"通知列表"在不可靠、带退避重连的按用户推送通道上
//! 的最终一致视图，同时安全处理本地用户动作（已读/删除/全部已读）与
//! 服务端推送之间的竞态。

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod notification;
pub mod push;

pub use api::{
    Category, DigestFrequency, Notification, NotificationGateway, NotificationKind,
    NotificationSettings, NotificationSummary, Page, Priority, RestGateway,
};
pub use client::{Action, ClientSnapshot, NotifyClient};
pub use config::{Config, ToastDurations};
pub use error::{NotifyError, Result};
pub use notification::{
    ConsoleToastSink, DeliveryPresenter, HistoryView, NativeNotifier, NoopNativeNotifier,
    PresentDecision, PresentationDeduplicator, RecentList, SettingsGate, SummaryStore,
    Toast, ToastSeverity, ToastSink,
};
pub use push::{
    ConnectionState, PushTransport, ReconnectController, ReconnectPolicy, TransportEvent,
    WsTransport,
};
