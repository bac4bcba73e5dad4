//! 服务运行时模块
//!
//! 把生命周期宿主交给操作系统服务运行时（或前台控制台）驱动

use crate::error::RuntimeError;
use crate::lifecycle::LifecycleHost;
use std::sync::Arc;

pub mod console;

#[cfg(windows)]
pub mod windows;

pub use console::ConsoleRuntime;

/// 服务运行时
///
/// 实现负责按顺序调用 `start`、`run`，并在收到停止控制时调用 `stop`，
/// 阻塞直到 `run` 返回。
pub trait ServiceRuntime {
    /// 以服务方式运行，返回 `run` 的返回值
    fn run_as_service(&self, name: &str, host: Arc<LifecycleHost>) -> Result<u32, RuntimeError>;
}

/// 当前平台的服务运行时
#[cfg(windows)]
pub type PlatformRuntime = windows::WindowsServiceRuntime;

/// 当前平台的服务运行时
#[cfg(not(windows))]
pub type PlatformRuntime = ConsoleRuntime;
