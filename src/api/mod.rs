//! REST 层：wire 类型与网关契约

pub mod client;
pub mod types;

pub use client::{NotificationGateway, RestGateway};
pub use types::{
    Category, DigestFrequency, Notification, NotificationKind, NotificationSettings,
    NotificationSummary, Page, Priority,
};
