//! 通知核心：聚合存储、列表调和、投递决策、设置门

pub mod dedup;
pub mod list;
pub mod presenter;
pub mod settings;
pub mod summary;
pub mod toast;

pub use dedup::PresentationDeduplicator;
pub use list::{HistoryView, RecentList};
pub use presenter::{in_quiet_hours, DeliveryPresenter, PresentDecision};
pub use settings::SettingsGate;
pub use summary::SummaryStore;
pub use toast::{
    ConsoleToastSink, NativeNotifier, NoopNativeNotifier, Toast, ToastSeverity, ToastSink,
};
