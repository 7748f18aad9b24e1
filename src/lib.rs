//! plugin-resolver - 插件候选解析与授权引擎
//!
//! ## Workspace 结构
//!
//! - plugin-resolver-core：类型、候选匹配、解析策略、协作方接口及默认实现
//! - plugin-resolver-dispatcher：异步提交/回调与取消
//! - 主 crate：配置加载、日志初始化、应用装配

pub mod app;
pub mod config;
pub mod logger;

pub use app::ResolverApp;
pub use config::{default_config_path, AppConfig, ConfigError};

// 从子 crate 重新导出
pub use plugin_resolver_core as resolver_core;
pub use plugin_resolver_dispatcher as dispatcher;
