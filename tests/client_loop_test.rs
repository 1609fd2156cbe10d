//! 事件循环集成测试 - 用脚本化的传输与网关驱动完整客户端
//!
//! 覆盖三个对抗性交错场景：
//! - 重连重放不产生重复投递（列表去重 + 展示去重）
//! - 本地乐观已读与过期推送摘要的竞态（replace-on-arrival 策略）
//! - 重连耗尽恰好一条错误 Toast，之后不再调度任何尝试
//!
//! 全部使用 `start_paused` 虚拟时钟，退避延迟自动快进。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use review_notify::{
    Config, ConnectionState, NativeNotifier, Notification, NotificationGateway,
    NotificationKind, NotificationSettings, NotificationSummary, NotifyClient, NotifyError,
    Page, Priority, PushTransport, Toast, ToastSink, TransportEvent,
};

// ============================================================================
// 脚本化传输
// ============================================================================

#[derive(Default)]
struct TransportState {
    /// 每次 connect 的脚本结果（true = 成功），耗尽后用 default_ok
    connect_script: VecDeque<bool>,
    default_ok: bool,
    connect_calls: usize,
    connected: bool,
    active_subs: Vec<String>,
    /// 对已订阅目的地的重复 subscribe 次数（契约要求为 0）
    duplicate_subscribes: usize,
}

struct MockTransport {
    state: Arc<Mutex<TransportState>>,
    events: mpsc::Receiver<TransportEvent>,
}

fn mock_transport(
    script: Vec<bool>,
    default_ok: bool,
) -> (
    Box<MockTransport>,
    Arc<Mutex<TransportState>>,
    mpsc::Sender<TransportEvent>,
) {
    let state = Arc::new(Mutex::new(TransportState {
        connect_script: script.into(),
        default_ok,
        ..TransportState::default()
    }));
    let (tx, rx) = mpsc::channel(32);
    let transport = Box::new(MockTransport {
        state: state.clone(),
        events: rx,
    });
    (transport, state, tx)
}

#[async_trait]
impl PushTransport for MockTransport {
    async fn connect(&mut self, token: &str) -> review_notify::Result<()> {
        if token.is_empty() {
            return Err(NotifyError::auth("no credential"));
        }
        let mut state = self.state.lock().unwrap();
        state.connect_calls += 1;
        let ok = state.connect_script.pop_front().unwrap_or(state.default_ok);
        if ok {
            state.connected = true;
            Ok(())
        } else {
            Err(NotifyError::connection("connection refused"))
        }
    }

    async fn subscribe(&mut self, destination: &str) -> review_notify::Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(NotifyError::NotConnected);
        }
        if state.active_subs.iter().any(|d| d == destination) {
            state.duplicate_subscribes += 1;
            return Ok(());
        }
        state.active_subs.push(destination.to_string());
        Ok(())
    }

    async fn unsubscribe(&mut self, destination: &str) -> review_notify::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.active_subs.retain(|d| d != destination);
        Ok(())
    }

    async fn publish(
        &mut self,
        _destination: &str,
        _body: serde_json::Value,
    ) -> review_notify::Result<()> {
        if !self.state.lock().unwrap().connected {
            return Err(NotifyError::NotConnected);
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        let mut state = self.state.lock().unwrap();
        // 契约：先退订再断开
        state.active_subs.clear();
        state.connected = false;
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn subscriptions(&self) -> Vec<String> {
        self.state.lock().unwrap().active_subs.clone()
    }
}

// ============================================================================
// 脚本化 REST 网关
// ============================================================================

struct MockGateway {
    /// fetch_summary 的脚本响应序列，耗尽后重复最后一个
    summaries: Mutex<VecDeque<NotificationSummary>>,
    last_summary: Mutex<NotificationSummary>,
    unread: Mutex<Vec<Notification>>,
    /// fetch_page 的脚本错误序列，耗尽后返回空页
    page_errors: Mutex<VecDeque<NotifyError>>,
    mark_read_delay: Duration,
    mark_read_calls: AtomicUsize,
    summary_calls: AtomicUsize,
}

impl MockGateway {
    fn new(summaries: Vec<NotificationSummary>, unread: Vec<Notification>) -> Arc<Self> {
        let last = summaries.last().cloned().unwrap_or_default();
        Arc::new(Self {
            summaries: Mutex::new(summaries.into()),
            last_summary: Mutex::new(last),
            unread: Mutex::new(unread),
            page_errors: Mutex::new(VecDeque::new()),
            mark_read_delay: Duration::ZERO,
            mark_read_calls: AtomicUsize::new(0),
            summary_calls: AtomicUsize::new(0),
        })
    }

    fn with_mark_read_delay(
        summaries: Vec<NotificationSummary>,
        unread: Vec<Notification>,
        delay: Duration,
    ) -> Arc<Self> {
        let last = summaries.last().cloned().unwrap_or_default();
        Arc::new(Self {
            summaries: Mutex::new(summaries.into()),
            last_summary: Mutex::new(last),
            unread: Mutex::new(unread),
            page_errors: Mutex::new(VecDeque::new()),
            mark_read_delay: delay,
            mark_read_calls: AtomicUsize::new(0),
            summary_calls: AtomicUsize::new(0),
        })
    }

    /// 测试设置：退化免打扰窗（start == end），避免依赖本地时钟
    fn test_settings() -> NotificationSettings {
        NotificationSettings {
            quiet_hours_start: "00:00".to_string(),
            quiet_hours_end: "00:00".to_string(),
            ..NotificationSettings::default()
        }
    }
}

#[async_trait]
impl NotificationGateway for MockGateway {
    async fn fetch_unread(&self) -> review_notify::Result<Vec<Notification>> {
        Ok(self.unread.lock().unwrap().clone())
    }

    async fn fetch_page(&self, page: u32, size: u32) -> review_notify::Result<Page<Notification>> {
        if let Some(err) = self.page_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(Page {
            content: Vec::new(),
            page,
            size,
            total_elements: 0,
            total_pages: 0,
        })
    }

    async fn fetch_summary(&self) -> review_notify::Result<NotificationSummary> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.summaries.lock().unwrap();
        match queue.pop_front() {
            Some(summary) => {
                *self.last_summary.lock().unwrap() = summary.clone();
                Ok(summary)
            }
            None => Ok(self.last_summary.lock().unwrap().clone()),
        }
    }

    async fn mark_read(&self, _id: i64) -> review_notify::Result<()> {
        if !self.mark_read_delay.is_zero() {
            tokio::time::sleep(self.mark_read_delay).await;
        }
        self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn mark_all_read(&self) -> review_notify::Result<()> {
        Ok(())
    }

    async fn delete(&self, _id: i64) -> review_notify::Result<()> {
        Ok(())
    }

    async fn fetch_settings(&self) -> review_notify::Result<NotificationSettings> {
        Ok(Self::test_settings())
    }

    async fn update_settings(
        &self,
        settings: &NotificationSettings,
    ) -> review_notify::Result<NotificationSettings> {
        Ok(settings.clone())
    }
}

// ============================================================================
// 记录型输出席位
// ============================================================================

struct RecordingSink {
    toasts: Mutex<Vec<Toast>>,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            toasts: Mutex::new(Vec::new()),
        })
    }

    fn count_with_key(&self, key: &str) -> usize {
        self.toasts
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.key == key)
            .count()
    }
}

impl ToastSink for RecordingSink {
    fn show(&self, toast: &Toast) {
        self.toasts.lock().unwrap().push(toast.clone());
    }
}

struct NoNative;

impl NativeNotifier for NoNative {
    fn permission_granted(&self) -> bool {
        false
    }
    fn notify(&self, _title: &str, _body: &str) {}
}

// ============================================================================
// 辅助
// ============================================================================

fn test_config() -> Config {
    Config {
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(1),
        max_reconnect_attempts: 3,
        settle_delay: Duration::from_millis(10),
        recent_cap: 50,
        ..Config::default()
    }
}

fn summary(unread: u32, total: u32) -> NotificationSummary {
    NotificationSummary {
        unread_count: unread,
        total_count: total,
        ..NotificationSummary::default()
    }
}

fn notification(id: i64) -> Notification {
    Notification {
        id,
        title: format!("notification {}", id),
        message: "body".to_string(),
        kind: NotificationKind::NewComment,
        priority: Priority::Normal,
        is_read: false,
        action_url: None,
        created_at: Utc::now(),
        read_at: None,
        triggered_by_name: None,
    }
}

fn push_event(n: &Notification) -> TransportEvent {
    TransportEvent::Message {
        destination: "user/s@uni.edu/topic/notifications".to_string(),
        body: serde_json::to_value(n).unwrap(),
    }
}

fn summary_push_event(s: &NotificationSummary) -> TransportEvent {
    TransportEvent::Message {
        destination: "user/s@uni.edu/topic/notification-summary".to_string(),
        body: serde_json::to_value(s).unwrap(),
    }
}

/// 让循环消化已注入的事件（虚拟时钟下 sleep 即快进）
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ============================================================================
// 场景测试
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_replayed_push_delivered_exactly_once() {
    let (transport, _state, events) = mock_transport(vec![true], true);
    let gateway = MockGateway::new(vec![summary(0, 0)], Vec::new());
    let sink = RecordingSink::new();
    let (client, join) = NotifyClient::spawn(
        test_config(),
        gateway,
        transport,
        sink.clone(),
        Arc::new(NoNative),
        "s@uni.edu",
        "token-1",
    );

    // 等待连接建立与播种完成
    tokio::time::sleep(Duration::from_millis(500)).await;

    // 同一条通知推送两次（模拟重连后的重放）
    let n = notification(7);
    events.send(push_event(&n)).await.unwrap();
    events.send(push_event(&n)).await.unwrap();
    settle().await;

    let snapshot = client.snapshot().await.unwrap();
    let matching: Vec<_> = snapshot.recent.iter().filter(|x| x.id == 7).collect();
    assert_eq!(matching.len(), 1, "list must contain exactly one entry for id 7");
    assert_eq!(snapshot.summary.unread_count, 1, "unread incremented once");
    assert_eq!(
        sink.count_with_key("notification-7"),
        1,
        "at most one toast for a replayed push"
    );

    client.shutdown().await;
    join.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_optimistic_read_race_with_stale_push_summary() {
    // 脚本：播种 {3,8}，连接后重同步 {3,8}，已读确认后的重同步 {2,8}
    let (transport, _state, events) = mock_transport(vec![true], true);
    let gateway = MockGateway::with_mark_read_delay(
        vec![summary(3, 8), summary(3, 8), summary(2, 8)],
        vec![notification(7)],
        Duration::from_millis(500),
    );
    let sink = RecordingSink::new();
    let (client, join) = NotifyClient::spawn(
        test_config(),
        gateway.clone(),
        transport,
        sink,
        Arc::new(NoNative),
        "s@uni.edu",
        "token-1",
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(snapshot.summary.unread_count, 3, "seeded from bootstrap");

    // 本地已读：乐观减到 2，REST 确认在 500ms 后
    client.mark_read(7).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(snapshot.summary.unread_count, 2, "optimistic decrement");

    // 在确认到达前，读之前计算的过期推送摘要到达：到达即权威，覆盖为 5
    events.send(summary_push_event(&summary(5, 8))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(snapshot.summary.unread_count, 5, "push snapshot replaces on arrival");

    // REST 确认到达后触发权威重同步，收敛到服务端计入已读的值
    tokio::time::sleep(Duration::from_secs(2)).await;
    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(gateway.mark_read_calls.load(Ordering::SeqCst), 1);
    // 恰好三次摘要拉取：播种、连接后重同步、确认后重同步
    assert_eq!(gateway.summary_calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        snapshot.summary.unread_count, 2,
        "post-ack resync wins over the stale push"
    );

    // 读标志单调：条目保持已读
    let entry = snapshot.recent.iter().find(|n| n.id == 7).unwrap();
    assert!(entry.is_read);
    assert!(entry.read_at.is_some());

    client.shutdown().await;
    join.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_reconnect_single_toast_no_further_attempts() {
    // 三次连接全部失败
    let (transport, state, _events) = mock_transport(vec![false, false, false], false);
    let gateway = MockGateway::new(vec![summary(0, 0)], Vec::new());
    let sink = RecordingSink::new();
    let (client, join) = NotifyClient::spawn(
        test_config(),
        gateway,
        transport,
        sink.clone(),
        Arc::new(NoNative),
        "s@uni.edu",
        "token-1",
    );

    // 退避序列 100/200/400ms，快进足够长
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(state.lock().unwrap().connect_calls, 3, "exactly max_attempts tries");
    assert_eq!(
        sink.count_with_key("system-connection"),
        1,
        "exactly one user-facing error toast"
    );
    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(snapshot.connection, ConnectionState::Exhausted);

    // 耗尽后不再有任何自动尝试
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(state.lock().unwrap().connect_calls, 3);
    assert_eq!(sink.count_with_key("system-connection"), 1);

    client.shutdown().await;
    join.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_resubscribes_single_handler_per_destination() {
    let (transport, state, events) = mock_transport(vec![true, true], true);
    let gateway = MockGateway::new(vec![summary(0, 0)], Vec::new());
    let (client, join) = NotifyClient::spawn(
        test_config(),
        gateway,
        transport,
        RecordingSink::new(),
        Arc::new(NoNative),
        "s@uni.edu",
        "token-1",
    );

    tokio::time::sleep(Duration::from_millis(500)).await;
    {
        let state = state.lock().unwrap();
        assert_eq!(state.connect_calls, 1);
        assert_eq!(state.active_subs.len(), 2, "notifications + summary destinations");
    }

    // 连接掉线，触发重连与重订阅
    events
        .send(TransportEvent::Disconnected {
            reason: "server restart".to_string(),
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(snapshot.connection, ConnectionState::Connected);
    {
        let state = state.lock().unwrap();
        assert_eq!(state.connect_calls, 2);
        assert_eq!(state.active_subs.len(), 2, "still one handler per destination");
        assert_eq!(state.duplicate_subscribes, 0, "resubscribe is unsubscribe-then-subscribe");
    }

    client.shutdown().await;
    join.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_pending_reconnect() {
    // 连接一直失败，但在第一次失败后的退避期内就登出
    let (transport, state, _events) = mock_transport(Vec::new(), false);
    let gateway = MockGateway::new(vec![summary(0, 0)], Vec::new());
    let (client, join) = NotifyClient::spawn(
        Config {
            base_delay: Duration::from_secs(1),
            max_reconnect_attempts: 5,
            ..test_config()
        },
        gateway,
        transport,
        RecordingSink::new(),
        Arc::new(NoNative),
        "s@uni.edu",
        "token-1",
    );

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(state.lock().unwrap().connect_calls, 1);

    client.shutdown().await;
    join.await.unwrap();

    // teardown 之后没有任何重试触发
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(state.lock().unwrap().connect_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_toast_only_for_transient_failures() {
    let (transport, _state, _events) = mock_transport(vec![true], true);
    let gateway = MockGateway::new(vec![summary(0, 0)], Vec::new());
    {
        let mut errors = gateway.page_errors.lock().unwrap();
        errors.push_back(NotifyError::Stale("page gone".to_string()));
        errors.push_back(NotifyError::Timeout);
    }
    let sink = RecordingSink::new();
    let (client, join) = NotifyClient::spawn(
        test_config(),
        gateway,
        transport,
        sink.clone(),
        Arc::new(NoNative),
        "s@uni.edu",
        "token-1",
    );

    tokio::time::sleep(Duration::from_millis(300)).await;

    // 非瞬时失败：重试也不会成功，不弹重试 Toast
    client.load_page(5, 20).await.unwrap();
    settle().await;
    assert_eq!(sink.count_with_key("system-retry"), 0);

    // 瞬时失败（超时）：弹一条可重试 Toast
    client.load_page(0, 20).await.unwrap();
    settle().await;
    assert_eq!(sink.count_with_key("system-retry"), 1);

    client.shutdown().await;
    join.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_mark_all_read_zeroes_unread_and_flips_entries() {
    let (transport, _state, _events) = mock_transport(vec![true], true);
    let gateway = MockGateway::new(
        vec![summary(2, 2), summary(2, 2), summary(0, 2)],
        vec![notification(1), notification(2)],
    );
    let (client, join) = NotifyClient::spawn(
        test_config(),
        gateway,
        transport,
        RecordingSink::new(),
        Arc::new(NoNative),
        "s@uni.edu",
        "token-1",
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    client.mark_all_read().await.unwrap();
    settle().await;

    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(snapshot.summary.unread_count, 0);
    assert!(snapshot.recent.iter().all(|n| n.is_read && n.read_at.is_some()));

    client.shutdown().await;
    join.await.unwrap();
}
