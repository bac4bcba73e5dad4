//! Windows服务控制管理器
//!
//! 基于 windows-service 的服务控制数据库实现

use crate::error::OsError;
use crate::registrar::database::{
    DatabaseAccess, ServiceAccess, ServiceControlManager, ServiceDatabase, ServiceHandle,
    ServiceState, ServiceStatus,
};
use crate::registrar::descriptor::{ServiceDescriptor, StartType};
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::debug;
use windows_service::service::{
    Service, ServiceAccess as WinServiceAccess, ServiceControlAccept, ServiceDependency,
    ServiceErrorControl, ServiceInfo, ServiceStartType, ServiceState as WinServiceState,
    ServiceStatus as WinServiceStatus, ServiceType,
};
use windows_service::service_manager::{ServiceManager, ServiceManagerAccess};

/// 把 windows-service 错误转换为带错误码的操作系统错误
pub(crate) fn os_error(error: windows_service::Error) -> OsError {
    match error {
        windows_service::Error::Winapi(io_error) => OsError::from(io_error),
        other => OsError::new(None, other.to_string()),
    }
}

/// Windows服务控制管理器
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsServiceControlManager;

impl ServiceControlManager for WindowsServiceControlManager {
    type Database = WindowsServiceDatabase;

    fn connect(&self, access: DatabaseAccess) -> Result<WindowsServiceDatabase, OsError> {
        let mut manager_access = ServiceManagerAccess::empty();
        if access.contains(DatabaseAccess::CONNECT) {
            manager_access |= ServiceManagerAccess::CONNECT;
        }
        if access.contains(DatabaseAccess::CREATE_SERVICE) {
            manager_access |= ServiceManagerAccess::CREATE_SERVICE;
        }

        debug!("连接本地服务控制管理器: {manager_access:?}");
        let manager =
            ServiceManager::local_computer(None::<&str>, manager_access).map_err(os_error)?;
        Ok(WindowsServiceDatabase { manager })
    }
}

/// 已连接的服务控制数据库
pub struct WindowsServiceDatabase {
    manager: ServiceManager,
}

impl WindowsServiceDatabase {
    fn service_info(descriptor: &ServiceDescriptor) -> ServiceInfo {
        // windows-service 会对含空格的路径自行加引号，这里传入去掉引号的路径
        ServiceInfo {
            name: OsString::from(&descriptor.name),
            display_name: OsString::from(&descriptor.display_name),
            service_type: ServiceType::OWN_PROCESS,
            start_type: start_type(descriptor.start_type),
            error_control: ServiceErrorControl::Normal,
            executable_path: PathBuf::from(descriptor.unquoted_binary_path()),
            launch_arguments: descriptor
                .launch_arguments
                .iter()
                .map(OsString::from)
                .collect(),
            dependencies: descriptor
                .dependencies
                .iter()
                .map(|name| ServiceDependency::Service(OsString::from(name)))
                .collect(),
            account_name: if descriptor.account.is_empty() {
                None // LocalSystem
            } else {
                Some(OsString::from(&descriptor.account))
            },
            account_password: descriptor.password.as_ref().map(OsString::from),
        }
    }
}

impl ServiceDatabase for WindowsServiceDatabase {
    type Handle = WindowsServiceHandle;

    fn create_service(
        &self,
        descriptor: &ServiceDescriptor,
        access: ServiceAccess,
    ) -> Result<WindowsServiceHandle, OsError> {
        let info = Self::service_info(descriptor);
        let service = self
            .manager
            .create_service(&info, service_access(access))
            .map_err(os_error)?;
        Ok(WindowsServiceHandle { service })
    }

    fn open_service(&self, name: &str, access: ServiceAccess) -> Result<WindowsServiceHandle, OsError> {
        let service = self
            .manager
            .open_service(name, service_access(access))
            .map_err(os_error)?;
        Ok(WindowsServiceHandle { service })
    }
}

/// Windows服务句柄
pub struct WindowsServiceHandle {
    service: Service,
}

impl ServiceHandle for WindowsServiceHandle {
    fn query_status(&self) -> Result<ServiceStatus, OsError> {
        self.service
            .query_status()
            .map(service_status)
            .map_err(os_error)
    }

    fn stop(&self) -> Result<ServiceStatus, OsError> {
        self.service.stop().map(service_status).map_err(os_error)
    }

    fn delete(&self) -> Result<(), OsError> {
        self.service.delete().map_err(os_error)
    }
}

fn start_type(start_type: StartType) -> ServiceStartType {
    match start_type {
        StartType::AutoStart => ServiceStartType::AutoStart,
        StartType::BootStart => ServiceStartType::BootStart,
        StartType::DemandStart => ServiceStartType::OnDemand,
        StartType::Disabled => ServiceStartType::Disabled,
        StartType::SystemStart => ServiceStartType::SystemStart,
    }
}

fn service_access(access: ServiceAccess) -> WinServiceAccess {
    let mut result = WinServiceAccess::empty();
    if access.contains(ServiceAccess::QUERY_STATUS) {
        result |= WinServiceAccess::QUERY_STATUS;
    }
    if access.contains(ServiceAccess::STOP) {
        result |= WinServiceAccess::STOP;
    }
    if access.contains(ServiceAccess::DELETE) {
        result |= WinServiceAccess::DELETE;
    }
    result
}

fn service_state(state: WinServiceState) -> ServiceState {
    match state {
        WinServiceState::Stopped => ServiceState::Stopped,
        WinServiceState::StartPending => ServiceState::StartPending,
        WinServiceState::StopPending => ServiceState::StopPending,
        WinServiceState::Running => ServiceState::Running,
        WinServiceState::ContinuePending => ServiceState::ContinuePending,
        WinServiceState::PausePending => ServiceState::PausePending,
        WinServiceState::Paused => ServiceState::Paused,
    }
}

fn service_status(status: WinServiceStatus) -> ServiceStatus {
    ServiceStatus {
        current_state: service_state(status.current_state),
        accepts_stop: status.controls_accepted.contains(ServiceControlAccept::STOP),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_conversion() {
        assert_eq!(service_state(WinServiceState::Running), ServiceState::Running);
        assert_eq!(
            service_state(WinServiceState::StopPending),
            ServiceState::StopPending
        );
        assert_eq!(service_state(WinServiceState::Stopped), ServiceState::Stopped);
    }

    #[test]
    fn test_access_conversion() {
        let access = service_access(ServiceAccess::STOP | ServiceAccess::DELETE);
        assert!(access.contains(WinServiceAccess::STOP));
        assert!(access.contains(WinServiceAccess::DELETE));
        assert!(!access.contains(WinServiceAccess::QUERY_STATUS));
    }

    #[test]
    fn test_service_info_strips_quotes() {
        let descriptor = ServiceDescriptor {
            name: "coturn".to_string(),
            display_name: "coturn".to_string(),
            start_type: StartType::DemandStart,
            dependencies: vec!["Tcpip".to_string()],
            account: String::new(),
            password: None,
            binary_path: r#""C:\my app\svc.exe""#.to_string(),
            launch_arguments: vec![],
        };

        let info = WindowsServiceDatabase::service_info(&descriptor);
        assert_eq!(info.executable_path, PathBuf::from(r"C:\my app\svc.exe"));
        assert!(info.account_name.is_none());
        assert_eq!(info.dependencies.len(), 1);
    }
}
