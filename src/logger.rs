//! 日志初始化
use crate::config::LoggingConfig;
use tracing::Level;

/// 解析日志级别，无法识别时回退到 info
pub fn parse_level(level: &str) -> Level {
    level.trim().parse::<Level>().unwrap_or(Level::INFO)
}

/// 安装全局 tracing 订阅者
///
/// 重复调用是安全的，只有第一次生效；返回本次是否完成安装。
pub fn init_logging(config: &LoggingConfig) -> bool {
    let level = parse_level(&config.level);
    let installed = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_ok();
    if installed {
        tracing::info!("[PluginResolver] 日志已初始化，级别: {}", level);
    }
    installed
}
