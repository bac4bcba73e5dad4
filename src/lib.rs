//! Service Lifecycle - 操作系统后台服务生命周期管理
//!
//! 把当前可执行文件注册为操作系统托管的后台服务，并在服务运行时驱动
//! start → run → stop 三阶段回调：
//! - 安装 / 删除服务注册（删除前尽力停止服务）
//! - 由操作系统服务运行时或前台控制台驱动生命周期
//! - TOML 配置与结构化日志

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod registrar;
pub mod runtime;
pub mod sink;

// 重新导出主要类型
pub use config::Config;
pub use dispatcher::{Command, Dispatcher};
pub use error::{CommandResult, ServiceLifecycleError};
pub use lifecycle::LifecycleHost;
pub use registrar::Registrar;

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
