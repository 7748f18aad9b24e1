//! 应用装配
//!
//! 根据配置组装目录、协作方与解析策略，并为每个请求进程创建分发器。

use anyhow::Context;
use plugin_resolver_core::{
    BuiltinHandlerRegistry, CachedCatalog, CrashHistoryTracker, GuestProcessRegistry,
    InternalHandlerAvailability, ProcessId, RequestContext, ResolutionPolicy, StaticAvailabilityFilter,
    StaticCatalog, Verdict,
};
use plugin_resolver_dispatcher::{DispatchResult, ResolutionDispatcher, ResolutionSink};
use std::path::Path;
use std::sync::Arc;

use crate::config::{default_config_path, AppConfig, ConfigError};
use crate::logger::init_logging;

/// 插件解析应用
pub struct ResolverApp {
    config: AppConfig,
    policy: Arc<ResolutionPolicy>,
    builtin: Arc<BuiltinHandlerRegistry>,
    availability: Arc<StaticAvailabilityFilter>,
    crash_tracker: Arc<CrashHistoryTracker>,
    guests: Arc<GuestProcessRegistry>,
}

impl ResolverApp {
    /// 加载配置、初始化日志并完成装配
    ///
    /// 未指定路径时使用默认配置路径，文件不存在则使用默认配置。
    pub fn bootstrap(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(default_config_path);
        let config = AppConfig::load_or_default(&path)
            .with_context(|| format!("加载配置失败: {}", path.display()))?;
        init_logging(&config.logging);
        let app = Self::from_config(config).context("装配解析器失败")?;
        tracing::info!(
            "[PluginResolver] 已加载 {} 个插件，{} 个内置处理器",
            app.config.plugins.len(),
            app.config.builtin_handlers.len()
        );
        Ok(app)
    }

    pub fn from_config(config: AppConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let catalog = Arc::new(CachedCatalog::new(StaticCatalog::new(config.plugins.clone())));
        let availability = Arc::new(StaticAvailabilityFilter::new(
            config.availability.disabled_plugins.iter().cloned(),
            config.availability.blocked_top_level_hosts.iter().cloned(),
        ));
        let crash_tracker = Arc::new(CrashHistoryTracker::new(
            config.stability.max_crashes,
            config.stability.crash_window(),
        ));
        let guests = Arc::new(GuestProcessRegistry::new());
        let builtin = Arc::new(BuiltinHandlerRegistry::new(config.builtin_handlers.clone()));

        let policy = ResolutionPolicy::new(catalog, crash_tracker.clone(), guests.clone())
            .with_availability_filter(availability.clone())
            .with_options(config.policy.clone());

        Ok(Self {
            config,
            policy: Arc::new(policy),
            builtin,
            availability,
            crash_tracker,
            guests,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn policy(&self) -> &Arc<ResolutionPolicy> {
        &self.policy
    }

    pub fn availability(&self) -> &StaticAvailabilityFilter {
        &self.availability
    }

    pub fn crash_tracker(&self) -> &CrashHistoryTracker {
        &self.crash_tracker
    }

    pub fn guests(&self) -> &GuestProcessRegistry {
        &self.guests
    }

    /// 直接解析（不经过分发器）
    pub async fn resolve(&self, ctx: &RequestContext) -> Verdict {
        self.policy.resolve(ctx).await
    }

    pub fn is_internal_handler_available(&self, mime_type: &str) -> InternalHandlerAvailability {
        self.builtin.is_internal_handler_available(mime_type)
    }

    /// 为请求进程创建分发器（需在 tokio 运行时内调用）
    pub fn dispatcher_for<S: ResolutionSink>(
        &self,
        process_id: ProcessId,
        sink: &Arc<S>,
    ) -> DispatchResult<ResolutionDispatcher> {
        ResolutionDispatcher::new(
            process_id,
            Arc::clone(&self.policy),
            Arc::clone(&self.builtin),
            sink,
        )
    }
}
