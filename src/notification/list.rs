//! 通知列表调和器
//!
//! 两个相互独立的视图：
//! - [`RecentList`]：铃铛下拉用的有界最近缓冲，最新在前，默认容量 50，
//!   只允许头部插入、按 id 删除、原地改读标志，从不重排序。
//! - [`HistoryView`]:通知中心用的分页完整历史，按页替换/追加。
//!
//! 重连重放（同 id 再次 prepend）原地更新而不是重复插入；本地读标志
//! 单调（false → true），重放携带的 `is_read=false` 不会逆转本地已读。

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::api::types::{Notification, Page};

/// 有界最近通知缓冲
#[derive(Debug)]
pub struct RecentList {
    entries: VecDeque<Notification>,
    cap: usize,
}

impl RecentList {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap.min(64)),
            cap: cap.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<Notification> {
        self.entries.iter().cloned().collect()
    }

    pub fn get(&self, id: i64) -> Option<&Notification> {
        self.entries.iter().find(|n| n.id == id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.get(id).is_some()
    }

    pub fn unread_len(&self) -> usize {
        self.entries.iter().filter(|n| !n.is_read).count()
    }

    /// 推送到达：头部插入，超出容量截断尾部。
    ///
    /// 同 id 已存在时（重连重放）原地更新，保留本地已读标志。
    /// 返回 `true` 表示这是一条新通知（非重放）。
    pub fn prepend(&mut self, incoming: Notification) -> bool {
        if let Some(existing) = self.entries.iter_mut().find(|n| n.id == incoming.id) {
            debug!(id = incoming.id, "replayed notification, updating in place");
            let locally_read = existing.is_read && !incoming.is_read;
            let (read_flag, read_at) = if locally_read {
                (true, existing.read_at)
            } else {
                (incoming.is_read, incoming.read_at)
            };
            *existing = incoming;
            existing.is_read = read_flag;
            existing.read_at = read_at;
            return false;
        }

        self.entries.push_front(incoming);
        self.entries.truncate(self.cap);
        true
    }

    /// 本地已读。幂等：对已读条目是 no-op，返回 `false`。
    pub fn mark_read(&mut self, id: i64, at: DateTime<Utc>) -> bool {
        match self.entries.iter_mut().find(|n| n.id == id) {
            Some(n) if !n.is_read => {
                n.is_read = true;
                n.read_at = Some(at);
                true
            }
            _ => false,
        }
    }

    /// 全部标记已读，返回状态实际变化的条数
    pub fn mark_all_read(&mut self, at: DateTime<Utc>) -> usize {
        let mut changed = 0;
        for n in self.entries.iter_mut().filter(|n| !n.is_read) {
            n.is_read = true;
            n.read_at = Some(at);
            changed += 1;
        }
        changed
    }

    /// 按 id 删除。不存在时 no-op，返回 `false`。
    pub fn remove(&mut self, id: i64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|n| n.id != id);
        self.entries.len() != before
    }

    /// 启动/登录时用未读列表整体播种（最新在前）
    pub fn replace_all(&mut self, mut items: Vec<Notification>) {
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(self.cap);
        self.entries = items.into();
    }
}

/// 分页完整历史视图，与最近缓冲互不合并
#[derive(Debug, Default)]
pub struct HistoryView {
    entries: Vec<Notification>,
    loaded_pages: u32,
    total_elements: u64,
    total_pages: u32,
}

impl HistoryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Notification] {
        &self.entries
    }

    pub fn loaded_pages(&self) -> u32 {
        self.loaded_pages
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn has_more(&self) -> bool {
        self.loaded_pages < self.total_pages
    }

    /// 应用一页 REST 结果：第 0 页整体替换，后续页去重追加。
    ///
    /// 失败路径不经过这里 - REST 出错时调用方保持现有页数据不变。
    pub fn replace_page(&mut self, page: Page<Notification>) {
        if page.page == 0 {
            self.entries = page.content;
            self.loaded_pages = 1;
        } else if page.page == self.loaded_pages {
            for n in page.content {
                if !self.entries.iter().any(|e| e.id == n.id) {
                    self.entries.push(n);
                }
            }
            self.loaded_pages += 1;
        } else {
            // 乱序到达的页（比如过期的在途响应）直接丢弃
            debug!(
                page = page.page,
                loaded = self.loaded_pages,
                "ignoring out-of-order page"
            );
            return;
        }
        self.total_elements = page.total_elements;
        self.total_pages = page.total_pages;
    }

    /// 本地变更镜像：历史视图与最近缓冲保持一致
    pub fn mark_read(&mut self, id: i64, at: DateTime<Utc>) {
        if let Some(n) = self.entries.iter_mut().find(|n| n.id == id && !n.is_read) {
            n.is_read = true;
            n.read_at = Some(at);
        }
    }

    pub fn mark_all_read(&mut self, at: DateTime<Utc>) {
        for n in self.entries.iter_mut().filter(|n| !n.is_read) {
            n.is_read = true;
            n.read_at = Some(at);
        }
    }

    pub fn remove(&mut self, id: i64) {
        self.entries.retain(|n| n.id != id);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
