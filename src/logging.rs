//! 日志系统模块
//!
//! 根据 `[logging]` 配置安装全局 tracing 订阅者，并把 `log` crate 的记录桥接过来。
//! 以服务方式运行时没有控制台，日志只能写到文件。

use crate::config::LoggingConfig;
use anyhow::Context;
use log::LevelFilter;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::filter::{Directive, LevelFilter as TracingLevel};
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter, Layer, Registry};

/// 首次初始化的结果，之后的调用直接返回它
static LOGGING_INIT: OnceLock<Result<(), String>> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 日志配置结构
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// 日志级别
    pub level: LevelFilter,
    /// 日志文件路径（可选）
    pub file_path: Option<PathBuf>,
    /// 是否输出到控制台
    pub console: bool,
    /// 是否使用JSON格式
    pub json_format: bool,
    /// 模块级别日志控制
    pub module_levels: BTreeMap<String, LevelFilter>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            file_path: None,
            console: true,
            json_format: false,
            module_levels: BTreeMap::new(),
        }
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            level: config.level_filter(),
            file_path: config.file.clone(),
            json_format: config.json,
            module_levels: config.module_filters(),
            ..Self::default()
        }
    }
}

impl LogConfig {
    /// 服务模式使用：没有配置日志文件时写到默认日志文件，并关闭控制台输出
    pub fn with_default_file(mut self) -> Self {
        if self.file_path.is_none() {
            self.file_path = Some(get_default_log_path());
            self.console = false;
        }
        self
    }
}

/// 初始化日志系统
///
/// 进程内只安装一次全局订阅者。之后的调用不会重新安装，
/// 返回第一次初始化的结果。
pub fn setup_logging(config: &LogConfig) -> anyhow::Result<()> {
    LOGGING_INIT
        .get_or_init(|| install(config).map_err(|e| format!("{e:#}")))
        .clone()
        .map_err(|e| anyhow::anyhow!("日志系统初始化失败: {}", e))
}

fn install(config: &LogConfig) -> anyhow::Result<()> {
    let subscriber = registry()
        .with(build_layers(config)?)
        .with(build_env_filter(config)?);
    tracing::subscriber::set_global_default(subscriber)
        .context("设置全局 tracing 订阅者失败")?;

    // log crate 到 tracing 的桥接
    tracing_log::LogTracer::init().context("LogTracer初始化失败")?;

    tracing::info!("日志系统初始化完成");
    tracing::debug!("日志配置: {:?}", config);
    Ok(())
}

/// 构建输出层：配置了文件时写文件，没有任何输出时保留控制台
fn build_layers(config: &LogConfig) -> anyhow::Result<Vec<BoxedLayer>> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if let Some(file_path) = &config.file_path {
        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("创建日志目录失败: {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)
            .with_context(|| format!("创建日志文件失败: {}", file_path.display()))?;

        let file_layer = fmt::layer()
            .with_writer(Mutex::new(file))
            .with_timer(fmt::time::ChronoUtc::rfc_3339())
            .with_ansi(false)
            .with_target(true);
        layers.push(if config.json_format {
            file_layer.json().boxed()
        } else {
            file_layer.boxed()
        });
    }

    if config.console || layers.is_empty() {
        let console_layer = fmt::layer().with_timer(fmt::time::ChronoUtc::rfc_3339());
        layers.push(if config.json_format {
            console_layer.json().boxed()
        } else {
            console_layer.with_thread_names(true).boxed()
        });
    }

    Ok(layers)
}

/// 构建过滤器：`RUST_LOG` 之上叠加全局级别和 `[logging.modules]` 中的模块级别
fn build_env_filter(config: &LogConfig) -> anyhow::Result<EnvFilter> {
    let mut filter =
        EnvFilter::from_default_env().add_directive(Directive::from(tracing_level(config.level)));

    for (module, level) in &config.module_levels {
        let directive: Directive = format!("{}={}", module, tracing_level(*level))
            .parse()
            .with_context(|| format!("无效的模块日志级别: {module}"))?;
        filter = filter.add_directive(directive);
    }

    Ok(filter)
}

fn tracing_level(level: LevelFilter) -> TracingLevel {
    match level {
        LevelFilter::Off => TracingLevel::OFF,
        LevelFilter::Error => TracingLevel::ERROR,
        LevelFilter::Warn => TracingLevel::WARN,
        LevelFilter::Info => TracingLevel::INFO,
        LevelFilter::Debug => TracingLevel::DEBUG,
        LevelFilter::Trace => TracingLevel::TRACE,
    }
}

/// 获取默认日志文件路径
///
/// 服务模式下没有控制台，未配置日志文件时使用该路径。
pub fn get_default_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(crate::APP_NAME)
        .join(format!("{}.log", crate::APP_NAME))
}
