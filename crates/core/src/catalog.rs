//! 插件目录
//!
//! 目录负责枚举已安装插件及其 MIME 关联，枚举顺序即下游的平局决胜顺序。
//!
//! - `StaticCatalog` - 固定插件列表
//! - `CachedCatalog` - 首次成功枚举后缓存结果（首次调用可能挂起）

use async_trait::async_trait;
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::errors::CollaboratorResult;
use crate::types::{MimeAssociation, PluginDescriptor};

/// 插件目录接口
#[async_trait]
pub trait PluginCatalog: Send + Sync {
    /// 按目录顺序枚举插件（首次调用可能挂起）
    async fn enumerate_plugins(&self) -> CollaboratorResult<Vec<Arc<PluginDescriptor>>>;

    /// 获取插件的 MIME 关联
    fn mime_associations<'a>(&self, descriptor: &'a PluginDescriptor) -> Cow<'a, [MimeAssociation]> {
        Cow::Borrowed(&descriptor.mime_types)
    }
}

/// 固定插件列表的目录
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    plugins: Vec<Arc<PluginDescriptor>>,
}

impl StaticCatalog {
    pub fn new(plugins: Vec<PluginDescriptor>) -> Self {
        Self {
            plugins: plugins.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[async_trait]
impl PluginCatalog for StaticCatalog {
    async fn enumerate_plugins(&self) -> CollaboratorResult<Vec<Arc<PluginDescriptor>>> {
        Ok(self.plugins.clone())
    }
}

/// 缓存枚举结果的目录包装
///
/// 失败的枚举不会被缓存，下一次请求会重新加载。
pub struct CachedCatalog<C> {
    inner: C,
    cache: OnceCell<Vec<Arc<PluginDescriptor>>>,
}

impl<C: PluginCatalog> CachedCatalog<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            cache: OnceCell::new(),
        }
    }

    /// 是否已完成首次加载
    pub fn is_warm(&self) -> bool {
        self.cache.initialized()
    }
}

#[async_trait]
impl<C: PluginCatalog> PluginCatalog for CachedCatalog<C> {
    async fn enumerate_plugins(&self) -> CollaboratorResult<Vec<Arc<PluginDescriptor>>> {
        if let Some(plugins) = self.cache.get() {
            return Ok(plugins.clone());
        }

        debug!("[PluginCatalog] 插件列表尚未加载，等待首次枚举");
        let plugins = self
            .cache
            .get_or_try_init(|| self.inner.enumerate_plugins())
            .await?;
        info!("[PluginCatalog] 插件列表已加载: {} 个插件", plugins.len());
        Ok(plugins.clone())
    }

    fn mime_associations<'a>(&self, descriptor: &'a PluginDescriptor) -> Cow<'a, [MimeAssociation]> {
        self.inner.mime_associations(descriptor)
    }
}
