//! 结论投递
//!
//! 调用方通过关联令牌把提交与结论对应起来。

use plugin_resolver_core::Verdict;
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// 关联令牌
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationToken(Uuid);

impl CorrelationToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 结论接收方
///
/// 每次提交最多回调一次；请求被取消时不回调。
pub trait ResolutionSink: Send + Sync + 'static {
    fn on_resolved(&self, token: CorrelationToken, verdict: Verdict);
}

/// 将结论转发到通道的接收方
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(CorrelationToken, Verdict)>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(CorrelationToken, Verdict)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ResolutionSink for ChannelSink {
    fn on_resolved(&self, token: CorrelationToken, verdict: Verdict) {
        // 接收端已关闭说明调用方不再关心结果
        let _ = self.tx.send((token, verdict));
    }
}
