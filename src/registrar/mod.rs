//! 服务注册器
//!
//! 在操作系统服务控制数据库中安装或删除服务注册

use crate::config::ServiceConfig;
use crate::error::{InstallError, UninstallError};
use crate::sink::LogSink;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

pub mod database;
pub mod descriptor;
pub mod memory;
pub mod poller;

#[cfg(windows)]
pub mod windows;

pub use database::{
    DatabaseAccess, ServiceAccess, ServiceControlManager, ServiceDatabase, ServiceHandle,
    ServiceState, ServiceStatus, UnsupportedServiceManager,
};
pub use descriptor::{quote_binary_path, ServiceDescriptor, StartType};
pub use memory::{MemoryServiceManager, StopBehavior};
pub use poller::{StopPoller, TerminalStatus};

/// 当前平台的服务控制管理器
#[cfg(windows)]
pub type PlatformServiceManager = windows::WindowsServiceControlManager;

/// 当前平台的服务控制管理器
#[cfg(not(windows))]
pub type PlatformServiceManager = UnsupportedServiceManager;

/// 服务注册器
pub struct Registrar<M> {
    manager: M,
    poller: StopPoller,
    sink: Arc<dyn LogSink>,
}

impl<M: ServiceControlManager> Registrar<M> {
    /// 创建新的服务注册器
    pub fn new(manager: M, poller: StopPoller, sink: Arc<dyn LogSink>) -> Self {
        Self {
            manager,
            poller,
            sink,
        }
    }

    /// 底层服务控制管理器
    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// 把当前可执行文件安装为服务
    ///
    /// 配置中指定了 `executable_path` 时使用该路径，否则使用当前进程的可执行文件。
    pub fn install_current_executable(
        &self,
        service: &ServiceConfig,
        launch_arguments: Vec<String>,
    ) -> Result<ServiceDescriptor, InstallError> {
        let executable = resolve_executable(service).map_err(|e| {
            self.sink.append(&format!("无法安装服务，可执行文件路径解析失败: {e}"));
            InstallError::CannotResolveBinaryPath(e)
        })?;

        let descriptor = ServiceDescriptor::new(service, &executable, launch_arguments)
            .ok_or_else(|| {
                let error = io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("路径不是合法的 UTF-8: {}", executable.display()),
                );
                self.sink.append(&format!("无法安装服务: {error}"));
                InstallError::CannotResolveBinaryPath(error)
            })?;
        self.sink.append(&format!("Path: {}", descriptor.binary_path));

        self.install(&descriptor)?;
        Ok(descriptor)
    }

    /// 安装服务
    ///
    /// 本次调用打开的句柄在任何返回路径上都会被关闭。
    pub fn install(&self, descriptor: &ServiceDescriptor) -> Result<(), InstallError> {
        info!("安装服务: {}", descriptor.name);

        let database = self
            .manager
            .connect(DatabaseAccess::CONNECT | DatabaseAccess::CREATE_SERVICE)
            .map_err(|e| {
                self.sink.append(&format!("打开服务控制数据库失败 ({e})"));
                InstallError::DatabaseOpenFailed(e)
            })?;

        // 服务本身不需要启动或停止自己，只申请查询状态的权限
        let _service = database
            .create_service(descriptor, ServiceAccess::QUERY_STATUS)
            .map_err(|e| {
                self.sink.append(&format!("创建服务失败 ({e})"));
                InstallError::ServiceCreateFailed(e)
            })?;

        self.sink
            .append(&format!("服务安装成功: {}", descriptor.name));
        Ok(())
    }

    /// 卸载服务
    ///
    /// 先尽力停止服务，无论停止是否完成都尝试删除注册。
    pub fn uninstall(&self, service_name: &str) -> Result<(), UninstallError> {
        info!("卸载服务: {service_name}");

        let database = self.manager.connect(DatabaseAccess::CONNECT).map_err(|e| {
            self.sink.append(&format!("打开服务控制数据库失败 ({e})"));
            UninstallError::DatabaseOpenFailed(e)
        })?;

        let service = database
            .open_service(
                service_name,
                ServiceAccess::STOP | ServiceAccess::QUERY_STATUS | ServiceAccess::DELETE,
            )
            .map_err(|e| {
                self.sink.append(&format!("打开服务失败 ({e})"));
                UninstallError::ServiceOpenFailed(e)
            })?;

        self.stop_before_delete(service_name, &service);

        service.delete().map_err(|e| {
            self.sink.append(&format!("删除服务失败 ({e})"));
            UninstallError::DeleteFailed(e)
        })?;

        self.sink.append(&format!("服务已删除: {service_name}"));
        Ok(())
    }

    /// 删除前尽力停止服务，失败只记录警告
    fn stop_before_delete<H: ServiceHandle>(&self, service_name: &str, service: &H) {
        match service.query_status() {
            Ok(status) if status.current_state == ServiceState::Stopped => {
                debug!("服务已处于停止状态: {service_name}");
                return;
            }
            Ok(status) if !status.accepts_stop => {
                self.sink.append(&format!(
                    "{service_name} 当前状态为 {}，不接受停止请求",
                    status.current_state
                ));
                return;
            }
            Ok(_) => {}
            Err(e) => {
                self.sink
                    .append(&format!("查询 {service_name} 状态失败 ({e})，仍尝试停止"));
            }
        }

        self.sink.append(&format!("正在停止 {service_name}..."));
        match self.poller.wait_for_stop(service) {
            Ok(TerminalStatus::Stopped) => {
                self.sink.append(&format!("{service_name} 已停止"));
            }
            Ok(TerminalStatus::StillPending(state)) => {
                self.sink
                    .append(&format!("{service_name} 停止失败，当前状态: {state}"));
            }
            Ok(TerminalStatus::TimedOut { attempts }) => {
                self.sink.append(&format!(
                    "{service_name} 在 {attempts} 次查询后仍未停止，继续删除"
                ));
            }
            Err(e) => {
                self.sink.append(&format!("{service_name} 停止失败: {e}"));
            }
        }
    }
}

/// 解析要注册的可执行文件路径
fn resolve_executable(service: &ServiceConfig) -> io::Result<PathBuf> {
    match &service.executable_path {
        Some(path) => Ok(path.clone()),
        None => std::env::current_exe(),
    }
}
