//! 插件稳定性追踪
//!
//! 按插件记录崩溃时间；时间窗内崩溃次数达到阈值即视为不稳定。

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::errors::CollaboratorResult;
use crate::types::PluginId;

/// 默认崩溃阈值
pub const DEFAULT_MAX_CRASHES: usize = 3;
/// 默认统计窗口
pub const DEFAULT_CRASH_WINDOW: Duration = Duration::from_secs(120);

/// 不稳定插件追踪接口
pub trait InstabilityTracker: Send + Sync {
    fn is_unstable(&self, id: &PluginId) -> CollaboratorResult<bool>;
}

/// 基于崩溃历史的追踪器
#[derive(Debug)]
pub struct CrashHistoryTracker {
    max_crashes: usize,
    window: Duration,
    crashes: Mutex<HashMap<PluginId, VecDeque<Instant>>>,
}

impl Default for CrashHistoryTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CRASHES, DEFAULT_CRASH_WINDOW)
    }
}

impl CrashHistoryTracker {
    /// `max_crashes` 为 0 时按 1 处理
    pub fn new(max_crashes: usize, window: Duration) -> Self {
        Self {
            max_crashes: max_crashes.max(1),
            window,
            crashes: Mutex::new(HashMap::new()),
        }
    }

    /// 记录一次崩溃
    pub fn record_crash(&self, id: &PluginId) {
        self.record_crash_at(id, Instant::now());
    }

    /// 记录指定时刻的崩溃
    pub fn record_crash_at(&self, id: &PluginId, at: Instant) {
        let mut crashes = self.crashes.lock();
        let history = crashes.entry(id.clone()).or_default();
        history.push_back(at);
        while let Some(&oldest) = history.front() {
            let expired = at.saturating_duration_since(oldest) >= self.window;
            if expired || history.len() > self.max_crashes {
                history.pop_front();
            } else {
                break;
            }
        }
        tracing::debug!(
            "[CrashTracker] 插件 {} 崩溃，窗口内累计 {} 次",
            id,
            history.len()
        );
    }

    /// 在指定时刻判断是否不稳定
    pub fn is_unstable_at(&self, id: &PluginId, now: Instant) -> bool {
        let crashes = self.crashes.lock();
        let Some(history) = crashes.get(id) else {
            return false;
        };
        let recent = history
            .iter()
            .filter(|&&at| now.saturating_duration_since(at) < self.window)
            .count();
        recent >= self.max_crashes
    }

    /// 清除插件的崩溃记录
    pub fn clear(&self, id: &PluginId) {
        self.crashes.lock().remove(id);
    }
}

impl InstabilityTracker for CrashHistoryTracker {
    fn is_unstable(&self, id: &PluginId) -> CollaboratorResult<bool> {
        Ok(self.is_unstable_at(id, Instant::now()))
    }
}
