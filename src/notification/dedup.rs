//! 展示去重器 - 防止重连重放导致同一通知弹两次 Toast
//!
//! 重连触发的重订阅竞态会让服务端重放最近的推送。通知 id 是服务端
//! 分配的稳定标识，所以按 id 在时间窗口内去重即可，无需内容相似度。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

/// 默认去重窗口
const DEFAULT_WINDOW: Duration = Duration::from_secs(120);

/// 按通知 id 的展示去重器
pub struct PresentationDeduplicator {
    /// 最近展示过的通知: id -> 展示时间
    recent: HashMap<i64, Instant>,
    /// 去重窗口
    window: Duration,
}

impl PresentationDeduplicator {
    pub fn new() -> Self {
        Self {
            recent: HashMap::new(),
            window: DEFAULT_WINDOW,
        }
    }

    /// 设置去重窗口
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// 是否应该展示。同一 id 在窗口内第二次询问返回 `false`。
    pub fn should_present(&mut self, id: i64) -> bool {
        let now = Instant::now();
        self.cleanup_expired(now);

        if let Some(shown_at) = self.recent.get(&id) {
            if now.duration_since(*shown_at) < self.window {
                debug!(id, "suppressing duplicate presentation");
                return false;
            }
        }
        self.recent.insert(id, now);
        true
    }

    fn cleanup_expired(&mut self, now: Instant) {
        self.recent
            .retain(|_, shown_at| now.duration_since(*shown_at) < self.window);
    }
}

impl Default for PresentationDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}
