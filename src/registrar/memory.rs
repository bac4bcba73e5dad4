//! 内存中的服务控制数据库
//!
//! 行为模仿 Windows 服务控制管理器（权限检查、错误码、停止过程），
//! 可以注入失败并统计仍然打开的句柄数量。克隆后共享同一份状态。

use crate::error::OsError;
use crate::registrar::database::{
    DatabaseAccess, ServiceAccess, ServiceControlManager, ServiceDatabase, ServiceHandle,
    ServiceState, ServiceStatus,
};
use crate::registrar::descriptor::ServiceDescriptor;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// 拒绝访问
pub const ERROR_ACCESS_DENIED: i32 = 5;
/// 服务无法接受该控制请求
pub const ERROR_INVALID_SERVICE_CONTROL: i32 = 1052;
/// 服务不存在
pub const ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;
/// 服务未运行
pub const ERROR_SERVICE_NOT_ACTIVE: i32 = 1062;
/// 服务已存在
pub const ERROR_SERVICE_EXISTS: i32 = 1073;

/// 收到停止请求后服务的行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBehavior {
    /// 立即停止
    Immediate,
    /// 在给定次数的状态查询中保持 StopPending，之后进入 `then`
    Pending {
        /// 保持 StopPending 的查询次数
        queries: u32,
        /// 最终状态
        then: ServiceState,
    },
    /// 拒绝停止请求
    Reject,
}

#[derive(Debug, Clone)]
struct MemoryService {
    descriptor: ServiceDescriptor,
    state: ServiceState,
    accepts_stop: bool,
    stop_behavior: StopBehavior,
    pending_queries: u32,
    settle_state: ServiceState,
}

impl MemoryService {
    fn status(&self) -> ServiceStatus {
        ServiceStatus {
            current_state: self.state,
            accepts_stop: self.accepts_stop,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    services: BTreeMap<String, MemoryService>,
    open_handles: usize,
    connect_error: Option<OsError>,
    create_error: Option<OsError>,
    delete_error: Option<OsError>,
    stop_requests: usize,
    status_queries: usize,
}

/// 内存服务控制管理器
#[derive(Debug, Clone, Default)]
pub struct MemoryServiceManager {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryServiceManager {
    /// 创建空的数据库
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接登记一个服务（绕过 create_service）
    pub fn insert_service(
        &self,
        descriptor: ServiceDescriptor,
        state: ServiceState,
        stop_behavior: StopBehavior,
    ) {
        let service = MemoryService {
            descriptor,
            state,
            accepts_stop: state == ServiceState::Running,
            stop_behavior,
            pending_queries: 0,
            settle_state: ServiceState::Stopped,
        };
        self.lock()
            .services
            .insert(service.descriptor.name.clone(), service);
    }

    /// 设置服务收到停止请求后的行为
    pub fn set_stop_behavior(&self, name: &str, behavior: StopBehavior) {
        if let Some(service) = self.lock().services.get_mut(name) {
            service.stop_behavior = behavior;
        }
    }

    /// 设置服务状态
    pub fn set_state(&self, name: &str, state: ServiceState) {
        if let Some(service) = self.lock().services.get_mut(name) {
            service.state = state;
            service.accepts_stop = state == ServiceState::Running;
        }
    }

    /// 设置服务是否接受停止请求
    pub fn set_accepts_stop(&self, name: &str, accepts_stop: bool) {
        if let Some(service) = self.lock().services.get_mut(name) {
            service.accepts_stop = accepts_stop;
        }
    }

    /// 后续连接数据库都失败
    pub fn fail_connect(&self, error: OsError) {
        self.lock().connect_error = Some(error);
    }

    /// 后续创建服务都失败
    pub fn fail_create(&self, error: OsError) {
        self.lock().create_error = Some(error);
    }

    /// 后续删除服务都失败
    pub fn fail_delete(&self, error: OsError) {
        self.lock().delete_error = Some(error);
    }

    /// 服务是否已注册
    pub fn contains(&self, name: &str) -> bool {
        self.lock().services.contains_key(name)
    }

    /// 已注册服务的描述符
    pub fn descriptor(&self, name: &str) -> Option<ServiceDescriptor> {
        self.lock()
            .services
            .get(name)
            .map(|service| service.descriptor.clone())
    }

    /// 已注册服务的状态
    pub fn state_of(&self, name: &str) -> Option<ServiceState> {
        self.lock().services.get(name).map(|service| service.state)
    }

    /// 已注册服务数量
    pub fn service_count(&self) -> usize {
        self.lock().services.len()
    }

    /// 仍然打开的句柄数量（数据库连接和服务句柄）
    pub fn open_handles(&self) -> usize {
        self.lock().open_handles
    }

    /// 收到的停止请求次数
    pub fn stop_requests(&self) -> usize {
        self.lock().stop_requests
    }

    /// 收到的状态查询次数
    pub fn status_queries(&self) -> usize {
        self.lock().status_queries
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn access_denied(operation: &str) -> OsError {
    OsError::with_code(ERROR_ACCESS_DENIED, format!("{operation}: 拒绝访问"))
}

fn service_missing(name: &str) -> OsError {
    OsError::with_code(
        ERROR_SERVICE_DOES_NOT_EXIST,
        format!("指定的服务未安装: {name}"),
    )
}

impl ServiceControlManager for MemoryServiceManager {
    type Database = MemoryDatabase;

    fn connect(&self, access: DatabaseAccess) -> Result<MemoryDatabase, OsError> {
        let mut state = self.lock();
        if let Some(error) = state.connect_error.clone() {
            return Err(error);
        }
        state.open_handles += 1;

        Ok(MemoryDatabase {
            state: Arc::clone(&self.state),
            access,
        })
    }
}

/// 内存数据库连接
#[derive(Debug)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
    access: DatabaseAccess,
}

impl ServiceDatabase for MemoryDatabase {
    type Handle = MemoryServiceHandle;

    fn create_service(
        &self,
        descriptor: &ServiceDescriptor,
        access: ServiceAccess,
    ) -> Result<MemoryServiceHandle, OsError> {
        if !self.access.contains(DatabaseAccess::CREATE_SERVICE) {
            return Err(access_denied("CreateService"));
        }

        let mut state = lock_state(&self.state);
        if let Some(error) = state.create_error.clone() {
            return Err(error);
        }
        if state.services.contains_key(&descriptor.name) {
            return Err(OsError::with_code(
                ERROR_SERVICE_EXISTS,
                format!("指定的服务已存在: {}", descriptor.name),
            ));
        }

        state.services.insert(
            descriptor.name.clone(),
            MemoryService {
                descriptor: descriptor.clone(),
                state: ServiceState::Stopped,
                accepts_stop: false,
                stop_behavior: StopBehavior::Immediate,
                pending_queries: 0,
                settle_state: ServiceState::Stopped,
            },
        );
        state.open_handles += 1;

        Ok(MemoryServiceHandle {
            state: Arc::clone(&self.state),
            name: descriptor.name.clone(),
            access,
        })
    }

    fn open_service(&self, name: &str, access: ServiceAccess) -> Result<MemoryServiceHandle, OsError> {
        let mut state = lock_state(&self.state);
        if !state.services.contains_key(name) {
            return Err(service_missing(name));
        }
        state.open_handles += 1;

        Ok(MemoryServiceHandle {
            state: Arc::clone(&self.state),
            name: name.to_string(),
            access,
        })
    }
}

impl Drop for MemoryDatabase {
    fn drop(&mut self) {
        lock_state(&self.state).open_handles -= 1;
    }
}

/// 内存服务句柄
#[derive(Debug)]
pub struct MemoryServiceHandle {
    state: Arc<Mutex<MemoryState>>,
    name: String,
    access: ServiceAccess,
}

impl ServiceHandle for MemoryServiceHandle {
    fn query_status(&self) -> Result<ServiceStatus, OsError> {
        if !self.access.contains(ServiceAccess::QUERY_STATUS) {
            return Err(access_denied("QueryServiceStatus"));
        }

        let mut state = lock_state(&self.state);
        state.status_queries += 1;
        let service = state
            .services
            .get_mut(&self.name)
            .ok_or_else(|| service_missing(&self.name))?;

        if service.state == ServiceState::StopPending {
            if service.pending_queries == 0 {
                service.state = service.settle_state;
                service.accepts_stop = service.state == ServiceState::Running;
            } else {
                service.pending_queries -= 1;
            }
        }
        Ok(service.status())
    }

    fn stop(&self) -> Result<ServiceStatus, OsError> {
        if !self.access.contains(ServiceAccess::STOP) {
            return Err(access_denied("ControlService"));
        }

        let mut state = lock_state(&self.state);
        state.stop_requests += 1;
        let service = state
            .services
            .get_mut(&self.name)
            .ok_or_else(|| service_missing(&self.name))?;

        if service.state == ServiceState::Stopped {
            return Err(OsError::with_code(
                ERROR_SERVICE_NOT_ACTIVE,
                format!("服务未启动: {}", self.name),
            ));
        }

        match service.stop_behavior {
            StopBehavior::Reject => Err(OsError::with_code(
                ERROR_INVALID_SERVICE_CONTROL,
                format!("服务无法接受控制请求: {}", self.name),
            )),
            StopBehavior::Immediate => {
                service.state = ServiceState::Stopped;
                service.accepts_stop = false;
                Ok(service.status())
            }
            StopBehavior::Pending { queries, then } => {
                service.state = ServiceState::StopPending;
                service.accepts_stop = false;
                service.pending_queries = queries;
                service.settle_state = then;
                Ok(service.status())
            }
        }
    }

    fn delete(&self) -> Result<(), OsError> {
        if !self.access.contains(ServiceAccess::DELETE) {
            return Err(access_denied("DeleteService"));
        }

        let mut state = lock_state(&self.state);
        if let Some(error) = state.delete_error.clone() {
            return Err(error);
        }
        state
            .services
            .remove(&self.name)
            .map(|_| ())
            .ok_or_else(|| service_missing(&self.name))
    }
}

impl Drop for MemoryServiceHandle {
    fn drop(&mut self) {
        lock_state(&self.state).open_handles -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use std::path::Path;

    fn descriptor(name: &str) -> ServiceDescriptor {
        let service = ServiceConfig {
            name: name.to_string(),
            ..ServiceConfig::default()
        };
        ServiceDescriptor::new(&service, Path::new("/usr/bin/svc"), vec![]).unwrap()
    }

    #[test]
    fn test_create_requires_create_right() {
        let manager = MemoryServiceManager::new();
        let database = manager.connect(DatabaseAccess::CONNECT).unwrap();

        let error = database
            .create_service(&descriptor("svc"), ServiceAccess::QUERY_STATUS)
            .unwrap_err();
        assert_eq!(error.code, Some(ERROR_ACCESS_DENIED));
        assert!(!manager.contains("svc"));
    }

    #[test]
    fn test_handles_are_counted_and_released() {
        let manager = MemoryServiceManager::new();
        {
            let database = manager
                .connect(DatabaseAccess::CONNECT | DatabaseAccess::CREATE_SERVICE)
                .unwrap();
            let _handle = database
                .create_service(&descriptor("svc"), ServiceAccess::QUERY_STATUS)
                .unwrap();
            assert_eq!(manager.open_handles(), 2);
        }
        assert_eq!(manager.open_handles(), 0);
        assert!(manager.contains("svc"));
    }

    #[test]
    fn test_pending_stop_settles_after_queries() {
        let manager = MemoryServiceManager::new();
        manager.insert_service(
            descriptor("svc"),
            ServiceState::Running,
            StopBehavior::Pending {
                queries: 2,
                then: ServiceState::Stopped,
            },
        );

        let database = manager.connect(DatabaseAccess::CONNECT).unwrap();
        let handle = database
            .open_service("svc", ServiceAccess::STOP | ServiceAccess::QUERY_STATUS)
            .unwrap();

        assert_eq!(handle.stop().unwrap().current_state, ServiceState::StopPending);
        assert_eq!(
            handle.query_status().unwrap().current_state,
            ServiceState::StopPending
        );
        assert_eq!(
            handle.query_status().unwrap().current_state,
            ServiceState::StopPending
        );
        assert_eq!(
            handle.query_status().unwrap().current_state,
            ServiceState::Stopped
        );
    }

    #[test]
    fn test_stop_on_stopped_service_fails() {
        let manager = MemoryServiceManager::new();
        manager.insert_service(descriptor("svc"), ServiceState::Stopped, StopBehavior::Immediate);

        let database = manager.connect(DatabaseAccess::CONNECT).unwrap();
        let handle = database.open_service("svc", ServiceAccess::STOP).unwrap();
        let error = handle.stop().unwrap_err();
        assert_eq!(error.code, Some(ERROR_SERVICE_NOT_ACTIVE));
    }
}
