//! 插件解析核心类型
//!
//! 定义插件描述、MIME 关联、请求上下文与解析结论（Verdict）。
//! 插件描述由外部目录持有，核心只读不写。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use url::Url;

use crate::errors::ContextError;

// ============================================================================
// 标识
// ============================================================================

/// 插件标识（路径或 ID，对核心而言不透明）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(String);

impl PluginId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PluginId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PluginId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// 发起请求的进程 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub u32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 发起请求的帧 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(pub u32);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// 插件描述
// ============================================================================

/// 插件执行模型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PluginType {
    /// 旧式进程内插件，与宿主进程共享安全上下文
    #[serde(alias = "npapi")]
    LegacyInProcess,
    /// 进程内沙箱插件
    #[default]
    #[serde(alias = "pepper")]
    Sandboxed,
    /// 独立进程沙箱插件
    SandboxedOutOfProcess,
    /// 浏览器内置插件
    BrowserInternal,
}

impl PluginType {
    /// 是否为旧式进程内插件
    pub fn is_legacy(self) -> bool {
        matches!(self, PluginType::LegacyInProcess)
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginType::LegacyInProcess => write!(f, "legacy_in_process"),
            PluginType::Sandboxed => write!(f, "sandboxed"),
            PluginType::SandboxedOutOfProcess => write!(f, "sandboxed_out_of_process"),
            PluginType::BrowserInternal => write!(f, "browser_internal"),
        }
    }
}

/// 插件声明的 MIME 关联
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MimeAssociation {
    /// MIME 类型；通配关联时为模式（`*`、`*/*` 或 `type/*`）
    pub mime_type: String,
    /// 是否为通配关联
    #[serde(default)]
    pub is_wildcard: bool,
    /// 关联的文件扩展名（不含点）
    #[serde(default)]
    pub file_extensions: Vec<String>,
    /// 描述
    #[serde(default)]
    pub description: String,
    /// 附加参数名（与 `additional_param_values` 一一对应）
    #[serde(default)]
    pub additional_param_names: Vec<String>,
    /// 附加参数值
    #[serde(default)]
    pub additional_param_values: Vec<String>,
}

impl MimeAssociation {
    /// 创建精确关联
    pub fn exact(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            is_wildcard: false,
            file_extensions: Vec::new(),
            description: String::new(),
            additional_param_names: Vec::new(),
            additional_param_values: Vec::new(),
        }
    }

    /// 创建通配关联
    pub fn wildcard(pattern: impl Into<String>) -> Self {
        Self {
            is_wildcard: true,
            ..Self::exact(pattern)
        }
    }

    /// 设置文件扩展名
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.file_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// 追加一个附加参数
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_param_names.push(name.into());
        self.additional_param_values.push(value.into());
        self
    }

    /// 字符串完全相等（区分大小写，不做规范化）
    pub fn matches_exact(&self, mime_type: &str) -> bool {
        self.mime_type == mime_type
    }

    /// 通配匹配；空 MIME 类型永不匹配
    pub fn matches_wildcard(&self, mime_type: &str) -> bool {
        if !self.is_wildcard || mime_type.is_empty() {
            return false;
        }
        match self.mime_type.as_str() {
            "*" | "*/*" => true,
            pattern => match pattern.strip_suffix("/*") {
                Some(top_level) => mime_type
                    .split_once('/')
                    .is_some_and(|(requested_top, _)| requested_top == top_level),
                None => false,
            },
        }
    }

    /// 文件扩展名匹配（忽略 ASCII 大小写）
    pub fn matches_extension(&self, extension: &str) -> bool {
        self.file_extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }
}

/// 已注册插件的描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// 插件标识
    pub id: PluginId,
    /// 显示名称
    #[serde(default)]
    pub name: String,
    /// 版本
    #[serde(default)]
    pub version: String,
    /// 执行模型
    #[serde(default, rename = "type")]
    pub plugin_type: PluginType,
    /// 有序的 MIME 关联
    #[serde(default)]
    pub mime_types: Vec<MimeAssociation>,
}

impl PluginDescriptor {
    pub fn new(id: impl Into<PluginId>, name: impl Into<String>, plugin_type: PluginType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: String::new(),
            plugin_type,
            mime_types: Vec::new(),
        }
    }

    /// 设置版本
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// 追加 MIME 关联
    pub fn with_mime(mut self, association: MimeAssociation) -> Self {
        self.mime_types.push(association);
        self
    }

    /// 查找第一个精确匹配的关联
    pub fn find_exact(&self, mime_type: &str) -> Option<&MimeAssociation> {
        self.mime_types.iter().find(|m| m.matches_exact(mime_type))
    }
}

// ============================================================================
// 请求上下文
// ============================================================================

/// 单次解析请求的上下文，创建后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    process_id: ProcessId,
    frame_id: FrameId,
    url: Url,
    top_origin_url: Url,
    mime_type: String,
}

impl RequestContext {
    pub fn new(
        process_id: ProcessId,
        frame_id: FrameId,
        url: Url,
        top_origin_url: Url,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            process_id,
            frame_id,
            url,
            top_origin_url,
            mime_type: mime_type.into(),
        }
    }

    /// 从字符串形式的 URL 构建
    pub fn parse(
        process_id: ProcessId,
        frame_id: FrameId,
        url: &str,
        top_origin_url: &str,
        mime_type: impl Into<String>,
    ) -> Result<Self, ContextError> {
        Ok(Self::new(
            process_id,
            frame_id,
            parse_url(url)?,
            parse_url(top_origin_url)?,
            mime_type,
        ))
    }

    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn top_origin_url(&self) -> &Url {
        &self.top_origin_url
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

fn parse_url(input: &str) -> Result<Url, ContextError> {
    Url::parse(input).map_err(|source| ContextError::InvalidUrl {
        input: input.to_string(),
        source,
    })
}

// ============================================================================
// 解析结论
// ============================================================================

/// 解析状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    /// 允许使用
    Allowed,
    /// 有候选但均未通过可用性过滤
    Disabled,
    /// 被信任降级拒绝
    Unauthorized,
    /// 没有匹配的插件
    NotFound,
    /// 当前平台不支持旧式插件，且该 MIME 类型可能由旧式插件处理
    NpapiNotSupported,
}

impl PluginStatus {
    /// 该状态下结论是否携带插件
    pub fn carries_plugin(self) -> bool {
        match self {
            PluginStatus::Allowed | PluginStatus::Disabled | PluginStatus::Unauthorized => true,
            PluginStatus::NotFound | PluginStatus::NpapiNotSupported => false,
        }
    }
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginStatus::Allowed => write!(f, "allowed"),
            PluginStatus::Disabled => write!(f, "disabled"),
            PluginStatus::Unauthorized => write!(f, "unauthorized"),
            PluginStatus::NotFound => write!(f, "not_found"),
            PluginStatus::NpapiNotSupported => write!(f, "npapi_not_supported"),
        }
    }
}

/// 解析结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: PluginStatus,
    /// 选中的插件；`NotFound`/`NpapiNotSupported` 时为空
    pub plugin: Option<Arc<PluginDescriptor>>,
    /// 实际匹配的 MIME 类型；无插件时为空串
    pub actual_mime_type: String,
}

impl Verdict {
    pub fn not_found() -> Self {
        Self::without_plugin(PluginStatus::NotFound)
    }

    pub fn npapi_not_supported() -> Self {
        Self::without_plugin(PluginStatus::NpapiNotSupported)
    }

    fn without_plugin(status: PluginStatus) -> Self {
        Self {
            status,
            plugin: None,
            actual_mime_type: String::new(),
        }
    }

    /// 携带选中插件的结论
    pub(crate) fn with_plugin(
        status: PluginStatus,
        plugin: Arc<PluginDescriptor>,
        actual_mime_type: String,
    ) -> Self {
        debug_assert!(status.carries_plugin());
        Self {
            status,
            plugin: Some(plugin),
            actual_mime_type,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.status == PluginStatus::Allowed
    }

    pub fn plugin_id(&self) -> Option<&PluginId> {
        self.plugin.as_ref().map(|p| &p.id)
    }
}
