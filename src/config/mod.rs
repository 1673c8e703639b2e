//! 统一配置系统
//!
//! 提供TOML/JSON配置文件、环境变量覆盖和配置验证

use crate::impl_default;
use crate::registry::InitializationLevel;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 桥接层配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 桥接层主配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,

    /// 诊断配置
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    /// 布局校验配置
    #[serde(default)]
    pub layout: LayoutConfig,

    /// 注册扩展类的初始化级别
    #[serde(default = "default_initialization_level")]
    pub minimum_initialization_level: InitializationLevel,
}

fn default_initialization_level() -> InitializationLevel {
    InitializationLevel::Scene
}

impl BridgeConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self {
            minimum_initialization_level: default_initialization_level(),
            ..Self::default()
        }
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 保存为JSON文件
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("GODOT_INTEROP_LOG_LEVEL") {
            if let Some(level) = LogLevel::parse(&val) {
                self.logging.level = level;
            }
        }
        if let Ok(val) = env::var("GODOT_INTEROP_FORWARD_DIAGNOSTICS") {
            self.diagnostics.forward_to_engine =
                val.parse().unwrap_or(self.diagnostics.forward_to_engine);
        }
        if let Ok(val) = env::var("GODOT_INTEROP_VALIDATE_LAYOUT") {
            self.layout.validate_on_startup =
                val.parse().unwrap_or(self.layout.validate_on_startup);
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.logging.validate()?;
        self.diagnostics.validate()?;
        self.layout.validate()?;
        Ok(())
    }

    /// 自动查找并加载配置文件
    ///
    /// 按以下顺序查找：
    /// 1. ./godot_interop.toml
    /// 2. ./godot_interop.json
    /// 3. 使用默认配置
    pub fn load_or_default() -> Self {
        if let Ok(config) = Self::from_toml_file("godot_interop.toml") {
            tracing::info!(target: "config", "Loaded config from godot_interop.toml");
            return config;
        }

        if let Ok(config) = Self::from_json_file("godot_interop.json") {
            tracing::info!(target: "config", "Loaded config from godot_interop.json");
            return config;
        }

        tracing::debug!(target: "config", "Using default configuration");
        Self::new()
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,

    /// 是否输出到文件
    pub log_to_file: bool,

    /// 日志文件路径
    pub log_file_path: String,

    /// 是否输出到控制台
    pub log_to_console: bool,
}

impl_default!(LoggingConfig {
    level: LogLevel::Info,
    log_to_file: false,
    log_file_path: "godot_interop.log".to_string(),
    log_to_console: true,
});

impl LoggingConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.log_to_file && self.log_file_path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "log_file_path must be set when log_to_file is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl LogLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// `EnvFilter` directive for this level.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// 诊断配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// 保留的最近诊断记录数
    pub max_recent: usize,

    /// 是否转发到引擎日志（print_error / print_warning）
    pub forward_to_engine: bool,

    /// 重复类名注册时是否 panic（仅用于开发阶段）
    pub panic_on_duplicate_class: bool,
}

impl_default!(DiagnosticsConfig {
    max_recent: 256,
    forward_to_engine: true,
    panic_on_duplicate_class: false,
});

impl DiagnosticsConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_recent == 0 {
            return Err(ConfigError::ValidationError(
                "diagnostics.max_recent must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// 布局校验配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// 加载时是否校验内建类型布局
    pub validate_on_startup: bool,

    /// 引擎导出的布局元数据文件（extension_api.json 格式）
    pub metadata_path: Option<PathBuf>,
}

impl_default!(LayoutConfig {
    validate_on_startup: false,
    metadata_path: None,
});

impl LayoutConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.validate_on_startup && self.metadata_path.is_none() {
            return Err(ConfigError::ValidationError(
                "layout.metadata_path is required when validate_on_startup is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.minimum_initialization_level, InitializationLevel::Scene);
    }

    #[test]
    fn test_toml_serialization() {
        let mut config = BridgeConfig::new();
        config.diagnostics.max_recent = 12;
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: BridgeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.diagnostics.max_recent, 12);
        assert_eq!(parsed.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_json_serialization() {
        let config = BridgeConfig::new();
        let json_str = serde_json::to_string(&config).unwrap();
        let parsed: BridgeConfig = serde_json::from_str(&json_str).unwrap();
        assert_eq!(
            config.diagnostics.forward_to_engine,
            parsed.diagnostics.forward_to_engine
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = BridgeConfig::from_toml_str("[logging]\nlevel = \"Debug\"\nlog_to_file = false\nlog_file_path = \"x.log\"\nlog_to_console = true\n").unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.diagnostics.max_recent, 256);
        assert_eq!(config.minimum_initialization_level, InitializationLevel::Scene);
    }

    #[test]
    fn test_validation_rejects_missing_metadata_path() {
        let mut config = BridgeConfig::new();
        config.layout.validate_on_startup = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("nope"), None);
        assert_eq!(LogLevel::Trace.as_directive(), "trace");
    }
}
