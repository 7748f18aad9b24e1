//! 解析请求分发
//!
//! 把 `ResolutionPolicy` 包装成异步请求/回调接口：
//! `submit_resolution(token, ctx)` 提交，`ResolutionSink::on_resolved(token, verdict)` 回调。
//! 支持按令牌、按帧、按进程取消。

mod dispatcher;
mod error;
mod sink;

pub use dispatcher::ResolutionDispatcher;
pub use error::{DispatchError, DispatchResult};
pub use sink::{ChannelSink, CorrelationToken, ResolutionSink};
