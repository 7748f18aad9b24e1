//! 分发器错误类型

use plugin_resolver_core::ProcessId;
use thiserror::Error;

use crate::sink::CorrelationToken;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// 同一令牌仍有未完成的请求
    #[error("关联令牌重复: {0}")]
    DuplicateToken(CorrelationToken),

    /// 请求来自其他进程
    #[error("请求进程 {actual} 与分发器进程 {expected} 不一致")]
    ProcessMismatch {
        expected: ProcessId,
        actual: ProcessId,
    },

    /// 分发器已关闭
    #[error("分发器已关闭")]
    ShutDown,

    /// 当前线程没有可用的 tokio 运行时
    #[error("没有可用的异步运行时")]
    NoRuntime,
}

pub type DispatchResult<T> = Result<T, DispatchError>;
