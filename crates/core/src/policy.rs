//! 解析策略
//!
//! 从候选插件中选出一个并计算最终状态：
//!
//! 1. 无候选 - `NotFound`（平台不支持旧式插件且 MIME 类型在已知列表中时为 `NpapiNotSupported`）
//! 2. 选择第一个可用候选；都不可用时取第一个候选并标记为 `Disabled`
//! 3. 信任降级：隔离表面中的旧式插件一律为 `Unauthorized`；已允许的结果遇到不稳定插件或隔离表面时同样降为 `Unauthorized`
//!
//! 协作方故障按最严格的答案处理（fail-closed），不会向调用方传播。

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::availability::AvailabilityFilter;
use crate::catalog::PluginCatalog;
use crate::instability::InstabilityTracker;
use crate::isolation::IsolationRegistry;
use crate::matcher::{Candidate, CandidateMatcher, CandidateSet};
use crate::types::{PluginStatus, ProcessId, RequestContext, Verdict};

/// 已知存在沙箱版本的 MIME 类型
pub const LEGACY_CAPABLE_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/x-google-chrome-pdf",
    "application/x-nacl",
    "application/x-pnacl",
    "application/vnd.chromium.remoting-viewer",
    "application/x-shockwave-flash",
    "application/futuresplash",
];

/// 策略选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOptions {
    /// 当前平台是否支持旧式插件
    pub legacy_plugins_supported: bool,
    /// 平台不支持旧式插件时，未匹配到候选需报告 `NpapiNotSupported` 的 MIME 类型
    pub legacy_capable_mime_types: Vec<String>,
}

impl Default for PolicyOptions {
    fn default() -> Self {
        Self {
            // Windows/macOS 已移除旧式插件支持
            legacy_plugins_supported: !cfg!(any(target_os = "windows", target_os = "macos")),
            legacy_capable_mime_types: LEGACY_CAPABLE_MIME_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl PolicyOptions {
    fn reports_legacy_unsupported(&self, mime_type: &str) -> bool {
        !self.legacy_plugins_supported
            && self
                .legacy_capable_mime_types
                .iter()
                .any(|known| known == mime_type)
    }
}

/// 解析策略
///
/// 不持有任何可变状态，可在多个请求间并发共享。
pub struct ResolutionPolicy {
    matcher: CandidateMatcher,
    availability: Option<Arc<dyn AvailabilityFilter>>,
    instability: Arc<dyn InstabilityTracker>,
    isolation: Arc<dyn IsolationRegistry>,
    options: PolicyOptions,
}

impl ResolutionPolicy {
    pub fn new(
        catalog: Arc<dyn PluginCatalog>,
        instability: Arc<dyn InstabilityTracker>,
        isolation: Arc<dyn IsolationRegistry>,
    ) -> Self {
        Self {
            matcher: CandidateMatcher::new(catalog),
            availability: None,
            instability,
            isolation,
            options: PolicyOptions::default(),
        }
    }

    /// 设置可用性过滤器
    pub fn with_availability_filter(mut self, filter: Arc<dyn AvailabilityFilter>) -> Self {
        self.availability = Some(filter);
        self
    }

    /// 设置策略选项
    pub fn with_options(mut self, options: PolicyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn matcher(&self) -> &CandidateMatcher {
        &self.matcher
    }

    pub fn options(&self) -> &PolicyOptions {
        &self.options
    }

    /// 解析一次请求
    pub async fn resolve(&self, ctx: &RequestContext) -> Verdict {
        let set = match self
            .matcher
            .find_candidates(ctx.url(), ctx.mime_type(), true)
            .await
        {
            Ok(set) => set,
            Err(e) => {
                warn!("[PluginResolver] 插件目录不可用，按未找到处理: {}", e);
                CandidateSet::default()
            }
        };

        if set.is_empty() {
            return self.verdict_without_candidates(ctx.mime_type());
        }

        let (index, status) = match self.first_available(ctx, &set) {
            Some(index) => (index, PluginStatus::Allowed),
            None => (0, PluginStatus::Disabled),
        };
        let chosen = &set.candidates[index];
        let status = self.apply_trust_downgrades(ctx.process_id(), chosen, status);

        debug!(
            "[PluginResolver] 进程 {} 帧 {} MIME `{}` -> {} ({})",
            ctx.process_id(),
            ctx.frame_id(),
            ctx.mime_type(),
            chosen.plugin.id,
            status
        );
        Verdict::with_plugin(
            status,
            Arc::clone(&chosen.plugin),
            chosen.actual_mime_type.clone(),
        )
    }

    fn verdict_without_candidates(&self, mime_type: &str) -> Verdict {
        if self.options.reports_legacy_unsupported(mime_type) {
            debug!("[PluginResolver] MIME `{}` 可能需要旧式插件，当前平台不支持", mime_type);
            return Verdict::npapi_not_supported();
        }
        Verdict::not_found()
    }

    /// 第一个通过可用性过滤的候选下标
    fn first_available(&self, ctx: &RequestContext, set: &CandidateSet) -> Option<usize> {
        let Some(filter) = &self.availability else {
            return Some(0);
        };
        set.candidates.iter().position(|candidate| {
            filter
                .is_available(
                    ctx.process_id(),
                    ctx.frame_id(),
                    ctx.url(),
                    ctx.top_origin_url(),
                    &candidate.plugin,
                )
                .unwrap_or_else(|e| {
                    warn!(
                        "[PluginResolver] 可用性过滤失败，视插件 {} 为不可用: {}",
                        candidate.plugin.id, e
                    );
                    false
                })
        })
    }

    fn apply_trust_downgrades(
        &self,
        process_id: ProcessId,
        chosen: &Candidate,
        status: PluginStatus,
    ) -> PluginStatus {
        let isolated = self.is_isolated_surface(process_id);

        // 隔离表面中一律拒绝旧式插件
        if chosen.plugin.plugin_type.is_legacy() && isolated {
            return PluginStatus::Unauthorized;
        }

        // 以下降级只作用于已允许的结果，Disabled 保持不变
        if status != PluginStatus::Allowed {
            return status;
        }

        if self.is_unstable(chosen) {
            return PluginStatus::Unauthorized;
        }

        // 隔离表面默认拒绝，放行由外部覆盖机制决定
        if isolated {
            return PluginStatus::Unauthorized;
        }

        status
    }

    fn is_isolated_surface(&self, process_id: ProcessId) -> bool {
        self.isolation
            .is_isolated_surface(process_id)
            .unwrap_or_else(|e| {
                warn!(
                    "[PluginResolver] 隔离注册表不可用，视进程 {} 为隔离表面: {}",
                    process_id, e
                );
                true
            })
    }

    fn is_unstable(&self, chosen: &Candidate) -> bool {
        self.instability
            .is_unstable(&chosen.plugin.id)
            .unwrap_or_else(|e| {
                warn!(
                    "[PluginResolver] 崩溃追踪不可用，视插件 {} 为不稳定: {}",
                    chosen.plugin.id, e
                );
                true
            })
    }
}
