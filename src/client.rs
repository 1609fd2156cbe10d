//! 客户端组合根 - 单写者事件循环
//!
//! 所有共享状态（聚合计数、最近缓冲、历史视图、设置）由一个事件循环
//! 任务独占持有，外部只通过 [`NotifyClient`] 句柄发送动作命令。三类
//! 生产者（推送消息、REST 响应、本地乐观变更）在 `tokio::select!` 的
//! 单线程交错中收敛，存储变更全部是同步函数，不跨 await 点。
//!
//! 生命周期：登录时构造并 spawn，登出时 [`NotifyClient::shutdown`] —
//! 取消挂起的重连定时器、退订所有目的地、断开连接，之后不再有任何
//! 重试触发。
//!
//! REST 调用在独立任务中执行，完成后经内部确认通道送回循环，因此
//! 一个 mark-read 确认和另一条通知的推送可以以任意顺序到达，循环
//! 按到达顺序逐个处理。

use std::sync::Arc;

use chrono::{Local, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::client::NotificationGateway;
use crate::api::types::{
    Notification, NotificationSettings, NotificationSummary, Page, Priority,
};
use crate::config::Config;
use crate::error::{NotifyError, Result};
use crate::notification::list::{HistoryView, RecentList};
use crate::notification::presenter::DeliveryPresenter;
use crate::notification::settings::SettingsGate;
use crate::notification::summary::SummaryStore;
use crate::notification::toast::{NativeNotifier, ToastSink};
use crate::push::reconnect::{
    is_auth_error_message, ConnectionState, FailureDisposition, ReconnectController,
    ReconnectPolicy,
};
use crate::push::transport::{
    notifications_destination, summary_destination, PushTransport, TransportEvent,
};

/// 本地用户动作
#[derive(Debug)]
pub enum Action {
    MarkRead(i64),
    MarkAllRead,
    Delete(i64),
    RefreshSummary,
    LoadPage { page: u32, size: u32 },
    UpdateSettings(NotificationSettings),
    Snapshot(oneshot::Sender<ClientSnapshot>),
    Shutdown,
}

/// REST 任务完成后的确认事件
enum Ack {
    MarkRead { id: i64, result: Result<()> },
    MarkAllRead { result: Result<()> },
    Delete { id: i64, result: Result<()> },
    Summary(Result<NotificationSummary>),
    Unread(Result<Vec<Notification>>),
    Page(Result<Page<Notification>>),
    Settings(Result<NotificationSettings>),
    SettingsUpdate {
        result: Result<NotificationSettings>,
        previous: NotificationSettings,
    },
}

/// 客户端状态快照（CLI 展示与测试观察用）
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    pub connection: ConnectionState,
    pub reconnect_attempts: u32,
    pub summary: NotificationSummary,
    pub recent: Vec<Notification>,
    pub history: Vec<Notification>,
    pub settings: NotificationSettings,
}

/// 事件循环句柄。克隆廉价，跨任务共享。
#[derive(Clone)]
pub struct NotifyClient {
    actions: mpsc::Sender<Action>,
}

impl NotifyClient {
    /// 构造并启动客户端。`user_email` 决定订阅的目的地，`token` 为
    /// 连接与 REST 共用的 Bearer 凭证。
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        config: Config,
        gateway: Arc<dyn NotificationGateway>,
        transport: Box<dyn PushTransport>,
        sink: Arc<dyn ToastSink>,
        native: Arc<dyn NativeNotifier>,
        user_email: impl Into<String>,
        token: impl Into<String>,
    ) -> (Self, JoinHandle<()>) {
        let (actions_tx, actions_rx) = mpsc::channel(32);
        let (acks_tx, acks_rx) = mpsc::channel(32);

        let policy = ReconnectPolicy::new(
            config.base_delay,
            config.max_delay,
            config.max_reconnect_attempts,
        );
        let event_loop = EventLoop {
            presenter: DeliveryPresenter::new(sink, native, config.toast_durations),
            recent: RecentList::new(config.recent_cap),
            history: HistoryView::new(),
            summary: SummaryStore::new(),
            settings: SettingsGate::new(),
            controller: ReconnectController::new(policy),
            config,
            gateway,
            transport,
            user_email: user_email.into(),
            token: token.into(),
            actions_rx,
            acks_tx,
            acks_rx,
            reconnect_at: None,
            transport_active: false,
        };
        let handle = tokio::spawn(event_loop.run());
        (Self { actions: actions_tx }, handle)
    }

    async fn send(&self, action: Action) -> Result<()> {
        self.actions
            .send(action)
            .await
            .map_err(|_| NotifyError::Request("notification client stopped".to_string()))
    }

    pub async fn mark_read(&self, id: i64) -> Result<()> {
        self.send(Action::MarkRead(id)).await
    }

    pub async fn mark_all_read(&self) -> Result<()> {
        self.send(Action::MarkAllRead).await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.send(Action::Delete(id)).await
    }

    pub async fn refresh_summary(&self) -> Result<()> {
        self.send(Action::RefreshSummary).await
    }

    pub async fn load_page(&self, page: u32, size: u32) -> Result<()> {
        self.send(Action::LoadPage { page, size }).await
    }

    pub async fn update_settings(&self, settings: NotificationSettings) -> Result<()> {
        self.send(Action::UpdateSettings(settings)).await
    }

    /// 读取当前状态快照（经循环往返，观察到的一定是完整状态）
    pub async fn snapshot(&self) -> Result<ClientSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Action::Snapshot(tx)).await?;
        rx.await
            .map_err(|_| NotifyError::Request("notification client stopped".to_string()))
    }

    /// 登出/会话结束：停止循环并断开推送通道
    pub async fn shutdown(&self) {
        let _ = self.send(Action::Shutdown).await;
    }
}

struct EventLoop {
    config: Config,
    gateway: Arc<dyn NotificationGateway>,
    transport: Box<dyn PushTransport>,
    controller: ReconnectController,
    summary: SummaryStore,
    recent: RecentList,
    history: HistoryView,
    settings: SettingsGate,
    presenter: DeliveryPresenter,
    user_email: String,
    token: String,
    actions_rx: mpsc::Receiver<Action>,
    acks_tx: mpsc::Sender<Ack>,
    acks_rx: mpsc::Receiver<Ack>,
    /// 挂起的重连截止时间。None 表示未调度（teardown 时显式清除）。
    reconnect_at: Option<tokio::time::Instant>,
    /// 连接建立后为 true，用于门控事件分支避免空转
    transport_active: bool,
}

impl EventLoop {
    async fn run(mut self) {
        self.bootstrap();
        self.schedule_reconnect();

        loop {
            let deadline = self.reconnect_at;
            tokio::select! {
                _ = tokio::time::sleep_until(
                    deadline.unwrap_or_else(tokio::time::Instant::now)
                ), if deadline.is_some() => {
                    self.reconnect_at = None;
                    self.attempt_connect().await;
                }
                event = self.transport.next_event(), if self.transport_active => {
                    self.handle_transport_event(event).await;
                }
                Some(ack) = self.acks_rx.recv() => {
                    self.handle_ack(ack);
                }
                action = self.actions_rx.recv() => {
                    match action {
                        None | Some(Action::Shutdown) => {
                            self.teardown().await;
                            break;
                        }
                        Some(action) => self.handle_action(action),
                    }
                }
            }
        }
    }

    /// 登录播种：设置、聚合、未读列表各拉一次
    fn bootstrap(&mut self) {
        self.spawn_fetch_settings();
        self.spawn_fetch_summary();
        self.spawn_fetch_unread();
    }

    async fn teardown(&mut self) {
        // 先清掉挂起的重连定时器，保证 teardown 之后不再有重试触发
        self.reconnect_at = None;
        self.transport.disconnect().await;
        self.transport_active = false;
        info!("notification client stopped");
    }

    fn schedule_reconnect(&mut self) {
        match self.controller.next_attempt() {
            Some(delay) => {
                self.reconnect_at = Some(tokio::time::Instant::now() + delay);
            }
            None => debug!("reconnect controller exhausted, nothing scheduled"),
        }
    }

    async fn attempt_connect(&mut self) {
        if self.token.is_empty() {
            // 无有效凭证：静默失败，不升级为用户可见错误
            debug!("no credential present, skipping connect attempt");
            self.controller
                .on_failure(&NotifyError::auth("no credential"));
            return;
        }
        match self.transport.connect(&self.token).await {
            Ok(()) => {
                self.controller.on_connected();
                self.transport_active = true;
                // 安定延迟后再订阅，避免握手尚未完成时的订阅丢失
                tokio::time::sleep(self.config.settle_delay).await;
                self.resubscribe().await;
                // 断线期间可能漏推：连上后做一次权威重同步
                self.spawn_fetch_summary();
            }
            Err(e) => {
                warn!(error = %e, attempts = self.controller.attempts(), "connect attempt failed");
                match self.controller.on_failure(&e) {
                    FailureDisposition::Retry => self.schedule_reconnect(),
                    FailureDisposition::GiveUp => self.report_connection_failure(),
                }
            }
        }
    }

    /// 重订阅是幂等的：先退订（若存在）再订阅，保证每个目的地恰好
    /// 一个活跃 handler
    async fn resubscribe(&mut self) {
        let destinations = [
            notifications_destination(&self.user_email),
            summary_destination(&self.user_email),
        ];
        for destination in destinations {
            if let Err(e) = self.transport.unsubscribe(&destination).await {
                debug!(destination = %destination, error = %e, "pre-subscribe unsubscribe failed");
            }
            if let Err(e) = self.transport.subscribe(&destination).await {
                warn!(destination = %destination, error = %e, "subscribe failed");
            }
        }
    }

    /// 整个会话最多一条连接错误 Toast
    fn report_connection_failure(&mut self) {
        if self.controller.should_report_error() {
            self.presenter.present_system_error(
                "system-connection",
                "Live updates unavailable",
                "Lost connection to the notification service. Manual refresh still works.",
            );
        }
    }

    async fn handle_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            None => {
                self.transport_active = false;
                if self.controller.is_connected() {
                    self.controller.on_disconnected();
                    self.schedule_reconnect();
                }
            }
            Some(TransportEvent::Disconnected { reason }) => {
                info!(reason = %reason, "push channel dropped");
                self.transport_active = false;
                self.controller.on_disconnected();
                self.schedule_reconnect();
            }
            Some(TransportEvent::ProtocolError { message }) => {
                if is_auth_error_message(&message) {
                    // 凭证被服务端拒绝：断开且不以同一凭证重试
                    warn!(message = %message, "auth-class protocol error");
                    self.transport.disconnect().await;
                    self.transport_active = false;
                    if self.controller.on_failure(&NotifyError::auth(message))
                        == FailureDisposition::GiveUp
                    {
                        self.report_connection_failure();
                    }
                } else {
                    warn!(message = %message, "protocol error on push channel");
                }
            }
            Some(TransportEvent::Message { destination, body }) => {
                self.handle_message(&destination, body);
            }
        }
    }

    fn handle_message(&mut self, destination: &str, body: Value) {
        if destination.ends_with("notification-summary") {
            match serde_json::from_value::<NotificationSummary>(body) {
                // 推送快照到达即权威，整体替换
                Ok(summary) => self.summary.apply_push(summary),
                Err(e) => warn!(error = %e, "malformed summary push"),
            }
        } else if destination.ends_with("notifications") {
            match serde_json::from_value::<Notification>(body) {
                Ok(notification) => self.on_push(notification),
                Err(e) => warn!(error = %e, "malformed notification push"),
            }
        } else {
            debug!(destination, "message for unknown destination");
        }
    }

    fn on_push(&mut self, notification: Notification) {
        let is_new = self.recent.prepend(notification.clone());
        if is_new && !notification.is_read {
            self.summary.increment_unread();
            if notification.priority == Priority::Urgent {
                self.summary.note_urgent();
            }
        }
        let decision = self.presenter.present(
            &notification,
            self.settings.current(),
            Local::now().time(),
        );
        debug!(id = notification.id, decision = ?decision, is_new, "push handled");
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::MarkRead(id) => {
                let now = Utc::now();
                // 乐观变更全部同步完成，REST 确认异步送回
                let changed = self.recent.mark_read(id, now);
                self.history.mark_read(id, now);
                if changed {
                    self.summary.decrement_unread();
                }
                self.spawn_rest(move |g| async move { Ack::MarkRead { id, result: g.mark_read(id).await } });
            }
            Action::MarkAllRead => {
                let now = Utc::now();
                self.recent.mark_all_read(now);
                self.history.mark_all_read(now);
                self.summary.clear_unread();
                self.spawn_rest(|g| async move { Ack::MarkAllRead { result: g.mark_all_read().await } });
            }
            Action::Delete(id) => {
                let was_unread = self.recent.get(id).map(|n| !n.is_read).unwrap_or(false);
                self.recent.remove(id);
                self.history.remove(id);
                if was_unread {
                    self.summary.decrement_unread();
                }
                self.spawn_rest(move |g| async move { Ack::Delete { id, result: g.delete(id).await } });
            }
            Action::RefreshSummary => self.spawn_fetch_summary(),
            Action::LoadPage { page, size } => {
                self.spawn_rest(move |g| async move { Ack::Page(g.fetch_page(page, size).await) });
            }
            Action::UpdateSettings(new) => {
                let previous = self.settings.apply_optimistic(new.clone());
                self.spawn_rest(move |g| async move {
                    Ack::SettingsUpdate {
                        result: g.update_settings(&new).await,
                        previous,
                    }
                });
            }
            Action::Snapshot(tx) => {
                let _ = tx.send(self.snapshot());
            }
            Action::Shutdown => unreachable!("handled in run loop"),
        }
    }

    fn handle_ack(&mut self, ack: Ack) {
        match ack {
            Ack::MarkRead { id, result } => match result {
                // 确认后重同步，覆盖乐观增减的误差
                Ok(()) => self.spawn_fetch_summary(),
                Err(NotifyError::Stale(_)) => {
                    // 服务端已无此条（别处删除）：丢弃本次操作的效果，
                    // 信任下一次权威拉取
                    debug!(id, "mark-read hit stale entry, resyncing");
                    self.presenter.present_system_error(
                        "system-stale",
                        "Notification no longer exists",
                        "It was removed elsewhere. The list has been refreshed.",
                    );
                    self.spawn_fetch_summary();
                    self.spawn_fetch_unread();
                }
                Err(e) => self.report_action_failure("mark-read", e),
            },
            Ack::MarkAllRead { result } => match result {
                Ok(()) => self.spawn_fetch_summary(),
                Err(e) => self.report_action_failure("mark-all-read", e),
            },
            Ack::Delete { id, result } => match result {
                Ok(()) => self.spawn_fetch_summary(),
                Err(NotifyError::Stale(_)) => {
                    // 想删的已经没了：结果一致，静默重同步即可
                    debug!(id, "delete hit stale entry, resyncing");
                    self.spawn_fetch_summary();
                }
                Err(e) => self.report_action_failure("delete", e),
            },
            Ack::Summary(result) => match result {
                Ok(summary) => self.summary.set_summary(summary),
                // 失败保持现状：聚合仍可用，下次重同步纠正
                Err(e) => warn!(error = %e, "summary refresh failed, keeping cached value"),
            },
            Ack::Unread(result) => match result {
                Ok(items) => self.recent.replace_all(items),
                Err(e) => warn!(error = %e, "unread fetch failed, keeping cached list"),
            },
            Ack::Page(result) => match result {
                Ok(page) => self.history.replace_page(page),
                // 失败保留已加载页，浮出可重试错误
                Err(e) => self.report_action_failure("load-page", e),
            },
            Ack::Settings(result) => self.settings.apply_fetched(result),
            Ack::SettingsUpdate { result, previous } => match result {
                Ok(server_copy) => self.settings.confirm(server_copy),
                Err(e) => {
                    self.settings.rollback(previous, &e);
                    self.report_action_failure("update-settings", e);
                }
            },
        }
    }

    /// 异步操作失败的统一出口：要么静默（认证错误整个会话只报一次），
    /// 要么一条可重试 Toast，绝不向上抛穿循环
    fn report_action_failure(&mut self, operation: &str, error: NotifyError) {
        warn!(operation, error = %error, "rest operation failed");
        if error.is_auth() {
            if self.controller.should_report_error() {
                self.presenter.present_system_error(
                    "system-auth",
                    "Session expired",
                    "Please sign in again to keep receiving notifications.",
                );
            }
            return;
        }
        // 只有瞬时失败值得提示重试；其余失败重试也不会成功
        if !error.is_transient() {
            return;
        }
        self.presenter.present_system_error(
            "system-retry",
            "Action failed",
            "The notification service did not respond. Please retry.",
        );
    }

    fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            connection: self.controller.state(),
            reconnect_attempts: self.controller.attempts(),
            summary: self.summary.get().clone(),
            recent: self.recent.to_vec(),
            history: self.history.entries().to_vec(),
            settings: self.settings.current().clone(),
        }
    }

    fn spawn_fetch_summary(&self) {
        self.spawn_rest(|g| async move { Ack::Summary(g.fetch_summary().await) });
    }

    fn spawn_fetch_unread(&self) {
        self.spawn_rest(|g| async move { Ack::Unread(g.fetch_unread().await) });
    }

    fn spawn_fetch_settings(&self) {
        self.spawn_rest(|g| async move { Ack::Settings(g.fetch_settings().await) });
    }

    /// 在独立任务中执行一次 REST 调用，结果经确认通道回到循环
    fn spawn_rest<F, Fut>(&self, call: F)
    where
        F: FnOnce(Arc<dyn NotificationGateway>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Ack> + Send + 'static,
    {
        let gateway = self.gateway.clone();
        let acks = self.acks_tx.clone();
        tokio::spawn(async move {
            let ack = call(gateway).await;
            let _ = acks.send(ack).await;
        });
    }
}
