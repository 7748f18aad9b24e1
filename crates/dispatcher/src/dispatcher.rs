//! 解析请求分发器
//!
//! 每个请求进程一个分发器。提交后在运行时中异步解析，结论通过弱引用的
//! `ResolutionSink` 回调恰好一次；请求被取消或接收方已释放时静默丢弃。

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use plugin_resolver_core::{
    BuiltinHandlerRegistry, FrameId, InternalHandlerAvailability, ProcessId, RequestContext,
    ResolutionPolicy,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{DispatchError, DispatchResult};
use crate::sink::{CorrelationToken, ResolutionSink};

/// 未完成的请求
struct PendingResolution {
    /// 区分复用同一令牌的先后请求
    seq: u64,
    frame_id: FrameId,
    cancel: CancellationToken,
}

type PendingTable = DashMap<CorrelationToken, PendingResolution>;

/// 解析请求分发器
pub struct ResolutionDispatcher {
    process_id: ProcessId,
    policy: Arc<ResolutionPolicy>,
    builtin: Arc<BuiltinHandlerRegistry>,
    sink: Weak<dyn ResolutionSink>,
    pending: Arc<PendingTable>,
    next_seq: AtomicU64,
    root: CancellationToken,
    runtime: Handle,
}

impl ResolutionDispatcher {
    /// 在当前 tokio 运行时上创建分发器
    pub fn new<S: ResolutionSink>(
        process_id: ProcessId,
        policy: Arc<ResolutionPolicy>,
        builtin: Arc<BuiltinHandlerRegistry>,
        sink: &Arc<S>,
    ) -> DispatchResult<Self> {
        let runtime = Handle::try_current().map_err(|_| DispatchError::NoRuntime)?;
        Ok(Self::with_runtime(process_id, policy, builtin, sink, runtime))
    }

    /// 使用指定运行时创建分发器，所有回调都在该运行时上执行
    pub fn with_runtime<S: ResolutionSink>(
        process_id: ProcessId,
        policy: Arc<ResolutionPolicy>,
        builtin: Arc<BuiltinHandlerRegistry>,
        sink: &Arc<S>,
        runtime: Handle,
    ) -> Self {
        let sink: Arc<dyn ResolutionSink> = sink.clone();
        Self {
            process_id,
            policy,
            builtin,
            sink: Arc::downgrade(&sink),
            pending: Arc::new(DashMap::new()),
            next_seq: AtomicU64::new(0),
            root: CancellationToken::new(),
            runtime,
        }
    }

    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    /// 未完成的请求数
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// 提交解析请求
    ///
    /// 结论永远不会在本调用内同步回调。
    pub fn submit_resolution(
        &self,
        token: CorrelationToken,
        ctx: RequestContext,
    ) -> DispatchResult<()> {
        if self.root.is_cancelled() {
            return Err(DispatchError::ShutDown);
        }
        if ctx.process_id() != self.process_id {
            return Err(DispatchError::ProcessMismatch {
                expected: self.process_id,
                actual: ctx.process_id(),
            });
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let cancel = self.root.child_token();
        match self.pending.entry(token) {
            Entry::Occupied(_) => return Err(DispatchError::DuplicateToken(token)),
            Entry::Vacant(slot) => {
                slot.insert(PendingResolution {
                    seq,
                    frame_id: ctx.frame_id(),
                    cancel: cancel.clone(),
                });
            }
        }

        debug!(
            "[Dispatcher] 提交请求 {} (进程 {}, 帧 {}, MIME `{}`)",
            token,
            self.process_id,
            ctx.frame_id(),
            ctx.mime_type()
        );
        self.runtime.spawn(run_resolution(
            Arc::clone(&self.policy),
            Arc::clone(&self.pending),
            self.sink.clone(),
            token,
            seq,
            ctx,
            cancel,
        ));
        Ok(())
    }

    /// 取消单个请求，返回请求是否仍在等待
    pub fn cancel(&self, token: &CorrelationToken) -> bool {
        match self.pending.remove(token) {
            Some((_, pending)) => {
                pending.cancel.cancel();
                debug!("[Dispatcher] 取消请求 {}", token);
                true
            }
            None => false,
        }
    }

    /// 帧销毁时取消该帧的所有请求，返回取消数量
    pub fn cancel_frame(&self, frame_id: FrameId) -> usize {
        let mut cancelled = 0;
        self.pending.retain(|_, pending| {
            if pending.frame_id == frame_id {
                pending.cancel.cancel();
                cancelled += 1;
                false
            } else {
                true
            }
        });
        if cancelled > 0 {
            debug!("[Dispatcher] 帧 {} 销毁，取消 {} 个请求", frame_id, cancelled);
        }
        cancelled
    }

    /// 进程销毁：取消所有请求并拒绝后续提交
    pub fn shutdown(&self) {
        if self.root.is_cancelled() {
            return;
        }
        self.root.cancel();
        let dropped = self.pending.len();
        self.pending.clear();
        info!(
            "[Dispatcher] 进程 {} 的分发器已关闭，丢弃 {} 个未完成请求",
            self.process_id, dropped
        );
    }

    /// 内置处理器查询（同步）
    pub fn is_internal_handler_available(&self, mime_type: &str) -> InternalHandlerAvailability {
        self.builtin.is_internal_handler_available(mime_type)
    }
}

impl Drop for ResolutionDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_resolution(
    policy: Arc<ResolutionPolicy>,
    pending: Arc<PendingTable>,
    sink: Weak<dyn ResolutionSink>,
    token: CorrelationToken,
    seq: u64,
    ctx: RequestContext,
    cancel: CancellationToken,
) {
    let verdict = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            pending.remove_if(&token, |_, p| p.seq == seq);
            debug!("[Dispatcher] 请求 {} 在解析完成前被取消", token);
            return;
        }
        verdict = policy.resolve(&ctx) => verdict,
    };

    // 只有移除了自身表项的一方负责投递
    if pending.remove_if(&token, |_, p| p.seq == seq).is_none() || cancel.is_cancelled() {
        debug!("[Dispatcher] 请求 {} 已取消，丢弃结论", token);
        return;
    }

    match sink.upgrade() {
        Some(sink) => sink.on_resolved(token, verdict),
        None => debug!("[Dispatcher] 接收方已释放，丢弃请求 {} 的结论", token),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ChannelSink;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use plugin_resolver_core::{
        CollaboratorResult, CrashHistoryTracker, GuestProcessRegistry, MimeAssociation,
        PluginCatalog, PluginDescriptor, PluginStatus, PluginType, StaticCatalog, Verdict,
    };
    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::sync::Notify;
    use tokio::time::timeout;

    type Delivery = (CorrelationToken, Verdict);

    async fn next_delivery(rx: &mut UnboundedReceiver<Delivery>) -> Delivery {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    /// 释放接收方后收集剩余的投递，通道关闭即结束
    async fn remaining_deliveries(
        sink: Arc<ChannelSink>,
        mut rx: UnboundedReceiver<Delivery>,
    ) -> Vec<CorrelationToken> {
        drop(sink);
        let mut tokens = Vec::new();
        while let Some((token, _)) = timeout(Duration::from_secs(1), rx.recv()).await.unwrap() {
            tokens.push(token);
        }
        tokens
    }

    async fn wait_until_idle(dispatcher: &ResolutionDispatcher) {
        timeout(Duration::from_secs(1), async {
            while dispatcher.pending_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    fn channel_sink() -> (Arc<ChannelSink>, UnboundedReceiver<Delivery>) {
        let (sink, rx) = ChannelSink::new();
        (Arc::new(sink), rx)
    }

    /// 放行前一直挂起的目录，放行后对所有请求保持打开
    struct GatedCatalog {
        open: AtomicBool,
        gate: Notify,
        inner: StaticCatalog,
    }

    impl GatedCatalog {
        fn open(&self) {
            self.open.store(true, Ordering::SeqCst);
            self.gate.notify_waiters();
        }
    }

    #[async_trait]
    impl PluginCatalog for GatedCatalog {
        async fn enumerate_plugins(&self) -> CollaboratorResult<Vec<Arc<PluginDescriptor>>> {
            loop {
                let notified = self.gate.notified();
                if self.open.load(Ordering::SeqCst) {
                    break;
                }
                notified.await;
            }
            self.inner.enumerate_plugins().await
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        verdicts: Mutex<Vec<(CorrelationToken, Verdict)>>,
    }

    impl ResolutionSink for RecordingSink {
        fn on_resolved(&self, token: CorrelationToken, verdict: Verdict) {
            self.verdicts.lock().push((token, verdict));
        }
    }

    fn plugins() -> Vec<PluginDescriptor> {
        vec![PluginDescriptor::new("pdf", "PDF", PluginType::Sandboxed)
            .with_mime(MimeAssociation::exact("application/pdf"))]
    }

    fn policy_with(catalog: Arc<dyn PluginCatalog>) -> Arc<ResolutionPolicy> {
        Arc::new(ResolutionPolicy::new(
            catalog,
            Arc::new(CrashHistoryTracker::default()),
            Arc::new(GuestProcessRegistry::new()),
        ))
    }

    fn gated() -> (Arc<GatedCatalog>, Arc<ResolutionPolicy>) {
        let catalog = Arc::new(GatedCatalog {
            open: AtomicBool::new(false),
            gate: Notify::new(),
            inner: StaticCatalog::new(plugins()),
        });
        let policy = policy_with(catalog.clone());
        (catalog, policy)
    }

    fn request(frame: u32) -> RequestContext {
        RequestContext::parse(
            ProcessId(1),
            FrameId(frame),
            "https://example.com/doc.pdf",
            "https://example.com/",
            "application/pdf",
        )
        .unwrap()
    }

    fn dispatcher<S: ResolutionSink>(
        policy: Arc<ResolutionPolicy>,
        sink: &Arc<S>,
    ) -> ResolutionDispatcher {
        ResolutionDispatcher::new(
            ProcessId(1),
            policy,
            Arc::new(BuiltinHandlerRegistry::default()),
            sink,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_verdict_delivered_after_submit_returns() {
        let (sink, mut rx) = channel_sink();
        let dispatcher = dispatcher(policy_with(Arc::new(StaticCatalog::new(plugins()))), &sink);
        let token = CorrelationToken::new();

        dispatcher.submit_resolution(token, request(1)).unwrap();
        assert!(rx.try_recv().is_err());

        let (received, verdict) = next_delivery(&mut rx).await;
        assert_eq!(received, token);
        assert_eq!(verdict.status, PluginStatus::Allowed);
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_each_submission_resolved_exactly_once() {
        let (sink, mut rx) = channel_sink();
        let dispatcher = dispatcher(policy_with(Arc::new(StaticCatalog::new(plugins()))), &sink);

        let tokens: HashSet<CorrelationToken> = (0..10).map(|_| CorrelationToken::new()).collect();
        for token in &tokens {
            dispatcher.submit_resolution(*token, request(1)).unwrap();
        }

        let mut seen = HashSet::new();
        for _ in 0..tokens.len() {
            let (token, _) = next_delivery(&mut rx).await;
            assert!(seen.insert(token));
        }
        assert_eq!(seen, tokens);
        assert!(remaining_deliveries(sink, rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_catalog_responds() {
        let (catalog, policy) = gated();
        let (sink, mut rx) = channel_sink();
        let dispatcher = dispatcher(policy, &sink);
        let token = CorrelationToken::new();

        dispatcher.submit_resolution(token, request(1)).unwrap();
        tokio::task::yield_now().await;

        assert!(dispatcher.cancel(&token));
        assert!(!dispatcher.cancel(&token));

        let later = CorrelationToken::new();
        dispatcher.submit_resolution(later, request(2)).unwrap();
        catalog.open();

        assert_eq!(next_delivery(&mut rx).await.0, later);
        assert!(remaining_deliveries(sink, rx).await.is_empty());
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_frame_only_affects_that_frame() {
        let (catalog, policy) = gated();
        let (sink, mut rx) = channel_sink();
        let dispatcher = dispatcher(policy, &sink);
        let keep = CorrelationToken::new();

        dispatcher.submit_resolution(CorrelationToken::new(), request(1)).unwrap();
        dispatcher.submit_resolution(CorrelationToken::new(), request(1)).unwrap();
        dispatcher.submit_resolution(keep, request(2)).unwrap();
        tokio::task::yield_now().await;

        assert_eq!(dispatcher.cancel_frame(FrameId(1)), 2);
        assert_eq!(dispatcher.pending_count(), 1);

        catalog.open();
        assert_eq!(next_delivery(&mut rx).await.0, keep);
        assert!(remaining_deliveries(sink, rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_pending_token_rejected() {
        let (_catalog, policy) = gated();
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = dispatcher(policy, &sink);
        let token = CorrelationToken::new();

        dispatcher.submit_resolution(token, request(1)).unwrap();
        assert_eq!(
            dispatcher.submit_resolution(token, request(1)),
            Err(DispatchError::DuplicateToken(token))
        );
    }

    #[tokio::test]
    async fn test_process_mismatch_rejected() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = dispatcher(policy_with(Arc::new(StaticCatalog::default())), &sink);
        let ctx = RequestContext::parse(
            ProcessId(2),
            FrameId(1),
            "https://example.com/",
            "https://example.com/",
            "application/pdf",
        )
        .unwrap();

        assert_eq!(
            dispatcher.submit_resolution(CorrelationToken::new(), ctx),
            Err(DispatchError::ProcessMismatch {
                expected: ProcessId(1),
                actual: ProcessId(2),
            })
        );
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_and_rejects_new() {
        let (catalog, policy) = gated();
        let (sink, mut rx) = channel_sink();
        let closing = dispatcher(Arc::clone(&policy), &sink);
        let other = dispatcher(policy, &sink);

        closing.submit_resolution(CorrelationToken::new(), request(1)).unwrap();
        tokio::task::yield_now().await;
        closing.shutdown();
        assert_eq!(closing.pending_count(), 0);

        assert_eq!(
            closing.submit_resolution(CorrelationToken::new(), request(1)),
            Err(DispatchError::ShutDown)
        );

        // 另一个分发器的结论到达时，已关闭分发器的请求早已结束
        let survivor = CorrelationToken::new();
        other.submit_resolution(survivor, request(1)).unwrap();
        catalog.open();

        assert_eq!(next_delivery(&mut rx).await.0, survivor);
        assert!(remaining_deliveries(sink, rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_released_sink_is_silent_noop() {
        let (catalog, policy) = gated();
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = dispatcher(policy, &sink);

        dispatcher.submit_resolution(CorrelationToken::new(), request(1)).unwrap();
        tokio::task::yield_now().await;
        drop(sink);

        catalog.open();
        wait_until_idle(&dispatcher).await;
    }

    #[tokio::test]
    async fn test_internal_handler_query_is_synchronous() {
        let sink = Arc::new(RecordingSink::default());
        let builtin = BuiltinHandlerRegistry::new(vec![PluginDescriptor::new(
            "cdm",
            "CDM",
            PluginType::BrowserInternal,
        )
        .with_mime(MimeAssociation::exact("application/x-cdm").with_param("codecs", "vp9"))]);
        let dispatcher = ResolutionDispatcher::new(
            ProcessId(1),
            policy_with(Arc::new(StaticCatalog::default())),
            Arc::new(builtin),
            &sink,
        )
        .unwrap();

        let result = dispatcher.is_internal_handler_available("application/x-cdm");
        assert!(result.available);
        assert_eq!(result.extra_param_values, vec!["vp9"]);
        assert!(!dispatcher.is_internal_handler_available("application/pdf").available);
    }

    #[test]
    fn test_new_requires_runtime() {
        let sink = Arc::new(RecordingSink::default());
        let result = ResolutionDispatcher::new(
            ProcessId(1),
            policy_with(Arc::new(StaticCatalog::default())),
            Arc::new(BuiltinHandlerRegistry::default()),
            &sink,
        );
        assert!(matches!(result, Err(DispatchError::NoRuntime)));
    }
}
