//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::registrar::StartType;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// 主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 服务身份
    #[serde(default)]
    pub service: ServiceConfig,
    /// 生命周期配置
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// 停止确认轮询配置
    #[serde(default)]
    pub stop_poll: StopPollConfig,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 服务身份配置
///
/// `Debug` 输出中密码被替换为 `***`。
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// 服务名称
    #[serde(default = "default_service_name")]
    pub name: String,
    /// 显示名称
    #[serde(default = "default_service_name")]
    pub display_name: String,
    /// 启动类型
    #[serde(default)]
    pub start_type: StartType,
    /// 依赖的服务
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// 运行账户
    #[serde(default = "default_account")]
    pub account: String,
    /// 账户密码
    pub password: Option<String>,
    /// 注册的可执行文件路径，不填则使用当前进程
    pub executable_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            display_name: default_service_name(),
            start_type: StartType::AutoStart,
            dependencies: Vec::new(),
            account: default_account(),
            password: None,
            executable_path: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .field("start_type", &self.start_type)
            .field("dependencies", &self.dependencies)
            .field("account", &self.account)
            .field("password", &redact_password(&self.password))
            .field("executable_path", &self.executable_path)
            .finish()
    }
}

/// 用于调试输出的密码占位
pub(crate) fn redact_password(password: &Option<String>) -> Option<&'static str> {
    password.as_ref().map(|_| "***")
}

/// 生命周期配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LifecycleConfig {
    /// run 循环间隔（毫秒）
    #[serde(default = "default_interval_ms")]
    pub run_interval_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            run_interval_ms: default_interval_ms(),
        }
    }
}

impl LifecycleConfig {
    /// run 循环间隔
    pub fn run_interval(&self) -> Duration {
        Duration::from_millis(self.run_interval_ms)
    }
}

/// 停止确认轮询配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StopPollConfig {
    /// 轮询间隔（毫秒）
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// 最大查询次数
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for StopPollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl StopPollConfig {
    /// 轮询间隔
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 日志文件
    pub file: Option<PathBuf>,
    /// 是否使用JSON格式
    #[serde(default)]
    pub json: bool,
    /// 模块级别日志控制，例如 `"service_lifecycle::registrar" = "debug"`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            json: false,
            modules: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    /// 日志级别，无法识别时为 Info
    pub fn level_filter(&self) -> LevelFilter {
        parse_level(&self.level).unwrap_or(LevelFilter::Info)
    }

    /// 各模块的日志级别，忽略无法识别的级别
    pub fn module_filters(&self) -> BTreeMap<String, LevelFilter> {
        self.modules
            .iter()
            .filter_map(|(module, level)| Some((module.clone(), parse_level(level)?)))
            .collect()
    }
}

const VALID_LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

fn parse_level(level: &str) -> Option<LevelFilter> {
    match level {
        "debug" => Some(LevelFilter::Debug),
        "info" => Some(LevelFilter::Info),
        "warn" => Some(LevelFilter::Warn),
        "error" => Some(LevelFilter::Error),
        _ => None,
    }
}

// 默认值函数
fn default_service_name() -> String {
    "coturn".to_string()
}
fn default_account() -> String {
    r"NT AUTHORITY\LocalService".to_string()
}
fn default_interval_ms() -> u64 {
    1000
}
fn default_max_attempts() -> u32 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，失败时返回错误描述
pub fn validate_config(config: &Config) -> Result<(), String> {
    let service = &config.service;
    if service.name.trim().is_empty() {
        return Err("服务名称不能为空".to_string());
    }
    // 服务控制管理器不允许名称中出现斜杠
    if service.name.contains(['/', '\\']) {
        return Err(format!("服务名称不能包含斜杠: {}", service.name));
    }
    if service.display_name.trim().is_empty() {
        return Err("服务显示名称不能为空".to_string());
    }
    if service.account.trim().is_empty() {
        return Err("运行账户不能为空".to_string());
    }
    if service.dependencies.iter().any(|d| d.trim().is_empty()) {
        return Err("依赖服务名称不能为空".to_string());
    }

    if config.lifecycle.run_interval_ms == 0 {
        return Err("run 循环间隔不能为0".to_string());
    }
    if config.stop_poll.interval_ms == 0 {
        return Err("停止轮询间隔不能为0".to_string());
    }
    if config.stop_poll.max_attempts == 0 {
        return Err("停止轮询最大次数不能为0".to_string());
    }

    if parse_level(&config.logging.level).is_none() {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.logging.level, VALID_LOG_LEVELS
        ));
    }
    for (module, level) in &config.logging.modules {
        if module.trim().is_empty() {
            return Err("模块名称不能为空".to_string());
        }
        if parse_level(level).is_none() {
            return Err(format!("模块 {module} 的日志级别无效: {level}"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.service.name, "coturn");
        assert_eq!(config.service.account, r"NT AUTHORITY\LocalService");
        assert_eq!(config.lifecycle.run_interval(), Duration::from_secs(1));
        assert_eq!(config.stop_poll.max_attempts, 30);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let serialized = toml::to_string(&config).expect("序列化失败");
        assert!(!serialized.is_empty());

        let deserialized: Config = toml::from_str(&serialized).expect("反序列化失败");
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_name_with_slash_is_rejected() {
        let mut config = Config::default();
        config.service.name = r"bad\name".to_string();
        let error = validate_config(&config).unwrap_err();
        assert!(error.contains("斜杠"));
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let mut config = Config::default();
        config.lifecycle.run_interval_ms = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.stop_poll.max_attempts = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        let error = validate_config(&config).unwrap_err();
        assert!(error.contains("verbose"));
    }

    #[test]
    fn test_debug_output_hides_password() {
        let mut config = Config::default();
        config.service.password = Some("hunter2".to_string());

        let formatted = format!("{config:?}");
        assert!(!formatted.contains("hunter2"));
        assert!(formatted.contains(r#"password: Some("***")"#));

        config.service.password = None;
        assert!(format!("{config:?}").contains("password: None"));
    }

    #[test]
    fn test_module_levels() {
        let config: Config = toml::from_str(
            r#"
[logging.modules]
"service_lifecycle::registrar" = "debug"
"tokio" = "warn"
"#,
        )
        .unwrap();
        assert!(validate_config(&config).is_ok());

        let filters = config.logging.module_filters();
        assert_eq!(
            filters.get("service_lifecycle::registrar"),
            Some(&LevelFilter::Debug)
        );
        assert_eq!(filters.get("tokio"), Some(&LevelFilter::Warn));
    }

    #[test]
    fn test_invalid_module_level_is_rejected() {
        let mut config = Config::default();
        config
            .logging
            .modules
            .insert("tokio".to_string(), "loud".to_string());
        let error = validate_config(&config).unwrap_err();
        assert!(error.contains("loud"));
    }

    #[test]
    fn test_level_filter_mapping() {
        let mut logging = LoggingConfig::default();
        assert_eq!(logging.level_filter(), LevelFilter::Info);
        logging.level = "debug".to_string();
        assert_eq!(logging.level_filter(), LevelFilter::Debug);
    }
}
