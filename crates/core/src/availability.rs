//! 可用性过滤
//!
//! 根据环境或策略判断插件当前是否可用。未配置过滤器时所有候选均视为可用。

use parking_lot::RwLock;
use std::collections::HashSet;
use url::Url;

use crate::errors::CollaboratorResult;
use crate::types::{FrameId, PluginDescriptor, PluginId, ProcessId};

/// 可用性过滤器接口
pub trait AvailabilityFilter: Send + Sync {
    fn is_available(
        &self,
        process_id: ProcessId,
        frame_id: FrameId,
        url: &Url,
        top_origin_url: &Url,
        plugin: &PluginDescriptor,
    ) -> CollaboratorResult<bool>;
}

/// 基于禁用列表的过滤器
///
/// - 按插件 ID 整体禁用
/// - 顶层页面主机在屏蔽列表中时禁用所有插件
#[derive(Debug, Default)]
pub struct StaticAvailabilityFilter {
    disabled_plugins: RwLock<HashSet<PluginId>>,
    blocked_top_level_hosts: RwLock<HashSet<String>>,
}

impl StaticAvailabilityFilter {
    pub fn new<P, H>(disabled_plugins: P, blocked_top_level_hosts: H) -> Self
    where
        P: IntoIterator<Item = PluginId>,
        H: IntoIterator<Item = String>,
    {
        Self {
            disabled_plugins: RwLock::new(disabled_plugins.into_iter().collect()),
            blocked_top_level_hosts: RwLock::new(
                blocked_top_level_hosts
                    .into_iter()
                    .map(|host| host.to_ascii_lowercase())
                    .collect(),
            ),
        }
    }

    /// 禁用插件
    pub fn disable_plugin(&self, id: PluginId) {
        self.disabled_plugins.write().insert(id);
    }

    /// 重新启用插件，返回之前是否处于禁用状态
    pub fn enable_plugin(&self, id: &PluginId) -> bool {
        self.disabled_plugins.write().remove(id)
    }

    /// 屏蔽顶层页面主机
    pub fn block_host(&self, host: &str) {
        self.blocked_top_level_hosts
            .write()
            .insert(host.to_ascii_lowercase());
    }

    fn is_host_blocked(&self, top_origin_url: &Url) -> bool {
        match top_origin_url.host_str() {
            Some(host) => self
                .blocked_top_level_hosts
                .read()
                .contains(&host.to_ascii_lowercase()),
            None => false,
        }
    }
}

impl AvailabilityFilter for StaticAvailabilityFilter {
    fn is_available(
        &self,
        _process_id: ProcessId,
        _frame_id: FrameId,
        _url: &Url,
        top_origin_url: &Url,
        plugin: &PluginDescriptor,
    ) -> CollaboratorResult<bool> {
        if self.disabled_plugins.read().contains(&plugin.id) {
            return Ok(false);
        }
        Ok(!self.is_host_blocked(top_origin_url))
    }
}
