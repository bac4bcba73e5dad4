//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口。服务命令沿用 `-install` / `/install`
//! 这类单横线写法，因此不定义短选项，命令作为尾随参数原样交给命令分发器。

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Service Lifecycle - 操作系统后台服务生命周期管理
#[derive(Parser, Debug, Clone)]
#[command(
    name = "service-lifecycle",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "SERVICE_LIFECYCLE_CONFIG"
    )]
    pub config: Option<PathBuf>,

    /// 日志级别，覆盖配置文件中的设置
    #[arg(
        long,
        value_enum,
        help = "日志级别",
        env = "SERVICE_LIFECYCLE_LOG_LEVEL"
    )]
    pub log_level: Option<LogLevel>,

    /// 服务命令：-install | /install | -remove | /remove，不填则以服务方式运行
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

impl Args {
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// 是否以服务方式运行（没有以 `-` 或 `/` 开头的命令）
    pub fn is_service_mode(&self) -> bool {
        self.command
            .first()
            .map_or(true, |first| !first.starts_with(['-', '/']))
    }
}
