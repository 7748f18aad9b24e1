//! 插件候选解析与授权核心
//!
//! 给定 MIME 类型与请求上下文，选出应处理该请求的插件并给出信任状态。
//!
//! ## 模块结构
//!
//! - `types` - 插件描述、请求上下文、解析结论
//! - `catalog` - 插件目录接口与内存实现
//! - `availability` / `instability` / `isolation` - 外部协作方接口与默认实现
//! - `matcher` - 候选匹配
//! - `policy` - 解析策略
//! - `builtin` - 内置处理器查询

pub mod availability;
pub mod builtin;
pub mod catalog;
pub mod errors;
pub mod instability;
pub mod isolation;
pub mod matcher;
pub mod policy;
pub mod types;

pub use availability::{AvailabilityFilter, StaticAvailabilityFilter};
pub use builtin::{BuiltinHandlerRegistry, InternalHandlerAvailability};
pub use catalog::{CachedCatalog, PluginCatalog, StaticCatalog};
pub use errors::{CollaboratorError, CollaboratorResult, ContextError};
pub use instability::{CrashHistoryTracker, InstabilityTracker};
pub use isolation::{GuestProcessRegistry, IsolationRegistry};
pub use matcher::{Candidate, CandidateMatcher, CandidateSet};
pub use policy::{PolicyOptions, ResolutionPolicy, LEGACY_CAPABLE_MIME_TYPES};
pub use types::{
    FrameId, MimeAssociation, PluginDescriptor, PluginId, PluginStatus, PluginType, ProcessId,
    RequestContext, Verdict,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
