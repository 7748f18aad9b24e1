//! 配置加载
//!
//! YAML 配置文件，所有段落均可省略并使用默认值。

use plugin_resolver_core::{PluginDescriptor, PluginId, PolicyOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("读取配置文件失败 {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("配置解析失败: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("配置无效: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub policy: PolicyOptions,
    pub stability: StabilityConfig,
    pub availability: AvailabilityConfig,
    /// 目录中的插件，顺序即匹配顺序
    pub plugins: Vec<PluginDescriptor>,
    /// 内置处理器
    pub builtin_handlers: Vec<PluginDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace / debug / info / warn / error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// 窗口内崩溃达到该次数视为不稳定
    pub max_crashes: usize,
    /// 统计窗口（秒）
    pub crash_window_secs: u64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            max_crashes: 3,
            crash_window_secs: 120,
        }
    }
}

impl StabilityConfig {
    pub fn crash_window(&self) -> Duration {
        Duration::from_secs(self.crash_window_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvailabilityConfig {
    pub disabled_plugins: Vec<PluginId>,
    pub blocked_top_level_hosts: Vec<String>,
}

impl AppConfig {
    /// 从文件加载
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// 文件不存在时返回默认配置
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 保存到文件
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content).map_err(io_error)
    }

    /// 校验插件定义
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_descriptors("plugins", &self.plugins)?;
        validate_descriptors("builtin_handlers", &self.builtin_handlers)?;
        if self.stability.max_crashes == 0 {
            return Err(ConfigError::Invalid(
                "stability.max_crashes 必须大于 0".to_string(),
            ));
        }
        if self.stability.crash_window_secs == 0 {
            return Err(ConfigError::Invalid(
                "stability.crash_window_secs 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_descriptors(section: &str, descriptors: &[PluginDescriptor]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for descriptor in descriptors {
        if descriptor.id.as_str().trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{section}: 插件 ID 不能为空")));
        }
        if !seen.insert(&descriptor.id) {
            return Err(ConfigError::Invalid(format!(
                "{section}: 插件 ID 重复: {}",
                descriptor.id
            )));
        }
        for association in &descriptor.mime_types {
            if association.mime_type.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "{section}: 插件 {} 的 MIME 类型不能为空",
                    descriptor.id
                )));
            }
            if association.additional_param_names.len()
                != association.additional_param_values.len()
            {
                return Err(ConfigError::Invalid(format!(
                    "{section}: 插件 {} 的附加参数名与值数量不一致",
                    descriptor.id
                )));
            }
        }
    }
    Ok(())
}

/// 默认配置文件路径
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("plugin-resolver")
        .join("config.yaml")
}
