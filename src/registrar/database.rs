//! 服务控制数据库抽象
//!
//! 对操作系统服务控制数据库的最小抽象：连接数据库、创建或打开服务、
//! 发送停止请求、查询状态、删除注册。句柄在 drop 时关闭。

use crate::error::OsError;
use crate::registrar::descriptor::ServiceDescriptor;
use std::fmt;
use std::ops::BitOr;

/// 服务当前状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// 已停止
    Stopped,
    /// 正在启动
    StartPending,
    /// 正在停止
    StopPending,
    /// 运行中
    Running,
    /// 正在继续
    ContinuePending,
    /// 正在暂停
    PausePending,
    /// 已暂停
    Paused,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Stopped => "已停止",
            ServiceState::StartPending => "正在启动",
            ServiceState::StopPending => "正在停止",
            ServiceState::Running => "运行中",
            ServiceState::ContinuePending => "正在继续",
            ServiceState::PausePending => "正在暂停",
            ServiceState::Paused => "已暂停",
        };
        f.write_str(name)
    }
}

/// 服务状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    /// 当前状态
    pub current_state: ServiceState,
    /// 是否接受停止请求
    pub accepts_stop: bool,
}

/// 服务控制数据库访问权限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseAccess(u32);

impl DatabaseAccess {
    /// 连接
    pub const CONNECT: Self = Self(0x0001);
    /// 创建服务
    pub const CREATE_SERVICE: Self = Self(0x0002);

    /// 是否包含给定权限
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DatabaseAccess {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// 服务句柄访问权限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceAccess(u32);

impl ServiceAccess {
    /// 查询状态
    pub const QUERY_STATUS: Self = Self(0x0004);
    /// 停止
    pub const STOP: Self = Self(0x0020);
    /// 删除
    pub const DELETE: Self = Self(0x0001_0000);

    /// 是否包含给定权限
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ServiceAccess {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// 已打开的服务句柄
pub trait ServiceHandle {
    /// 查询服务状态
    fn query_status(&self) -> Result<ServiceStatus, OsError>;

    /// 发送停止控制请求
    fn stop(&self) -> Result<ServiceStatus, OsError>;

    /// 删除服务注册
    fn delete(&self) -> Result<(), OsError>;
}

/// 已连接的服务控制数据库
pub trait ServiceDatabase {
    /// 服务句柄类型
    type Handle: ServiceHandle;

    /// 创建服务，返回具有给定权限的句柄
    fn create_service(
        &self,
        descriptor: &ServiceDescriptor,
        access: ServiceAccess,
    ) -> Result<Self::Handle, OsError>;

    /// 打开已存在的服务
    fn open_service(&self, name: &str, access: ServiceAccess) -> Result<Self::Handle, OsError>;
}

/// 服务控制管理器
pub trait ServiceControlManager: Send + Sync {
    /// 数据库连接类型
    type Database: ServiceDatabase;

    /// 以给定权限连接服务控制数据库
    fn connect(&self, access: DatabaseAccess) -> Result<Self::Database, OsError>;
}

/// 不支持服务控制管理器的平台
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedServiceManager;

/// 不可能存在的数据库连接
#[derive(Debug)]
pub enum NoDatabase {}

/// 不可能存在的服务句柄
#[derive(Debug)]
pub enum NoHandle {}

impl ServiceControlManager for UnsupportedServiceManager {
    type Database = NoDatabase;

    fn connect(&self, _access: DatabaseAccess) -> Result<NoDatabase, OsError> {
        Err(OsError::new(
            None,
            format!("当前平台（{}）不支持服务控制管理器", std::env::consts::OS),
        ))
    }
}

impl ServiceDatabase for NoDatabase {
    type Handle = NoHandle;

    fn create_service(
        &self,
        _descriptor: &ServiceDescriptor,
        _access: ServiceAccess,
    ) -> Result<NoHandle, OsError> {
        match *self {}
    }

    fn open_service(&self, _name: &str, _access: ServiceAccess) -> Result<NoHandle, OsError> {
        match *self {}
    }
}

impl ServiceHandle for NoHandle {
    fn query_status(&self) -> Result<ServiceStatus, OsError> {
        match *self {}
    }

    fn stop(&self) -> Result<ServiceStatus, OsError> {
        match *self {}
    }

    fn delete(&self) -> Result<(), OsError> {
        match *self {}
    }
}
