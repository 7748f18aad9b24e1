//! 错误类型
//!
//! 协作方故障在策略内部按失败即拒绝（fail-closed）处理，
//! 不会作为错误返回给调用方；这里只定义协作方接口和请求构造使用的错误。

use thiserror::Error;

/// 外部协作方（目录、可用性过滤器、崩溃追踪、隔离注册表）的故障
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// 协作方不可达
    #[error("协作方不可用: {0}")]
    Unavailable(String),

    /// 协作方返回失败
    #[error("协作方调用失败: {0}")]
    Failed(String),
}

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// 请求上下文构造错误
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("无效的 URL `{input}`: {source}")]
    InvalidUrl {
        input: String,
        #[source]
        source: url::ParseError,
    },
}
