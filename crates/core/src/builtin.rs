//! 内置处理器查询
//!
//! 只扫描内置（非目录）处理器，按注册顺序查找第一个精确匹配的 MIME 关联，
//! 返回其附加参数。同步、无副作用。

use serde::{Deserialize, Serialize};

use crate::types::PluginDescriptor;

/// 内置处理器可用性
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalHandlerAvailability {
    pub available: bool,
    pub extra_param_names: Vec<String>,
    pub extra_param_values: Vec<String>,
}

/// 内置处理器注册表
#[derive(Debug, Clone, Default)]
pub struct BuiltinHandlerRegistry {
    handlers: Vec<PluginDescriptor>,
}

impl BuiltinHandlerRegistry {
    pub fn new(handlers: Vec<PluginDescriptor>) -> Self {
        Self { handlers }
    }

    /// 注册内置处理器（追加到末尾）
    pub fn register(&mut self, handler: PluginDescriptor) {
        self.handlers.push(handler);
    }

    pub fn handlers(&self) -> &[PluginDescriptor] {
        &self.handlers
    }

    pub fn is_internal_handler_available(&self, mime_type: &str) -> InternalHandlerAvailability {
        self.handlers
            .iter()
            .find_map(|handler| handler.find_exact(mime_type))
            .map(|association| InternalHandlerAvailability {
                available: true,
                extra_param_names: association.additional_param_names.clone(),
                extra_param_values: association.additional_param_values.clone(),
            })
            .unwrap_or_default()
    }
}
