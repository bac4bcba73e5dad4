//! 错误处理模块
//!
//! 定义应用程序的统一错误类型、退出码表以及命令执行结果

use crate::lifecycle::LifecyclePhase;
use std::fmt;
use thiserror::Error;

/// 进程退出码
///
/// 每一类失败对应一个独立的负数退出码，0 表示成功（包括服务模式正常退出）。
pub mod exit_code {
    /// 成功
    pub const SUCCESS: i32 = 0;
    /// 无法解析当前可执行文件路径
    pub const CANNOT_RESOLVE_BINARY_PATH: i32 = -1;
    /// 打开服务控制数据库失败
    pub const DATABASE_OPEN_FAILED: i32 = -2;
    /// 创建服务失败
    pub const SERVICE_CREATE_FAILED: i32 = -3;
    /// 打开服务失败
    pub const SERVICE_OPEN_FAILED: i32 = -4;
    /// 删除服务失败
    pub const DELETE_FAILED: i32 = -5;
    /// 命令行用法错误
    pub const USAGE_ERROR: i32 = -6;
    /// 服务运行时失败
    pub const RUNTIME_FAILED: i32 = -7;
    /// 配置或日志初始化失败
    pub const CONFIG_INVALID: i32 = -8;
}

/// 操作系统错误（携带原始错误码）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsError {
    /// 原始错误码
    pub code: Option<i32>,
    /// 错误描述
    pub message: String,
}

impl OsError {
    /// 创建新的操作系统错误
    pub fn new(code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// 带错误码的操作系统错误
    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self::new(Some(code), message)
    }
}

impl fmt::Display for OsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} ({code})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for OsError {}

impl From<std::io::Error> for OsError {
    fn from(error: std::io::Error) -> Self {
        Self::new(error.raw_os_error(), error.to_string())
    }
}

/// 服务安装错误
#[derive(Error, Debug)]
pub enum InstallError {
    /// 无法解析可执行文件路径
    #[error("无法安装服务，可执行文件路径解析失败: {0}")]
    CannotResolveBinaryPath(#[source] std::io::Error),

    /// 打开服务控制数据库失败
    #[error("打开服务控制数据库失败: {0}")]
    DatabaseOpenFailed(#[source] OsError),

    /// 创建服务失败
    #[error("创建服务失败: {0}")]
    ServiceCreateFailed(#[source] OsError),
}

impl InstallError {
    /// 对应的进程退出码
    pub fn exit_code(&self) -> i32 {
        match self {
            InstallError::CannotResolveBinaryPath(_) => exit_code::CANNOT_RESOLVE_BINARY_PATH,
            InstallError::DatabaseOpenFailed(_) => exit_code::DATABASE_OPEN_FAILED,
            InstallError::ServiceCreateFailed(_) => exit_code::SERVICE_CREATE_FAILED,
        }
    }
}

/// 服务卸载错误
///
/// 停止失败不属于卸载错误，只会记录警告，删除照常进行。
#[derive(Error, Debug)]
pub enum UninstallError {
    /// 打开服务控制数据库失败
    #[error("打开服务控制数据库失败: {0}")]
    DatabaseOpenFailed(#[source] OsError),

    /// 打开服务失败
    #[error("打开服务失败: {0}")]
    ServiceOpenFailed(#[source] OsError),

    /// 删除服务失败
    #[error("删除服务失败: {0}")]
    DeleteFailed(#[source] OsError),
}

impl UninstallError {
    /// 对应的进程退出码
    pub fn exit_code(&self) -> i32 {
        match self {
            UninstallError::DatabaseOpenFailed(_) => exit_code::DATABASE_OPEN_FAILED,
            UninstallError::ServiceOpenFailed(_) => exit_code::SERVICE_OPEN_FAILED,
            UninstallError::DeleteFailed(_) => exit_code::DELETE_FAILED,
        }
    }
}

/// 停止确认轮询错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    /// 停止请求被拒绝
    #[error("停止请求被拒绝: {0}")]
    StopRejected(#[source] OsError),

    /// 查询服务状态失败
    #[error("查询服务状态失败: {0}")]
    QueryFailed(#[source] OsError),
}

/// 生命周期状态机错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// 当前状态下不允许该操作
    #[error("生命周期状态 {state:?} 下不允许执行 {operation}")]
    InvalidTransition {
        /// 操作名称
        operation: &'static str,
        /// 当时所处的状态
        state: LifecyclePhase,
    },
}

/// 服务运行时错误
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// 生命周期回调失败
    #[error("生命周期回调失败: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// 运行时创建失败
    #[error("创建运行时失败: {0}")]
    Io(#[from] std::io::Error),

    /// 工作线程异常退出
    #[error("服务工作线程异常退出: {0}")]
    WorkerPanicked(String),

    /// 服务分发器错误
    #[error("服务分发器错误: {0}")]
    Dispatcher(#[source] OsError),

    /// 同一进程中重复分发
    #[error("服务分发器在本进程中已经启动过")]
    AlreadyDispatched,
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 命令执行错误
#[derive(Error, Debug)]
pub enum CommandError {
    /// 安装失败
    #[error(transparent)]
    Install(#[from] InstallError),

    /// 卸载失败
    #[error(transparent)]
    Uninstall(#[from] UninstallError),

    /// 服务模式运行失败
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// 命令行用法错误
    #[error("{usage}")]
    Usage {
        /// 用法说明
        usage: String,
    },
}

impl CommandError {
    /// 对应的进程退出码
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandError::Install(e) => e.exit_code(),
            CommandError::Uninstall(e) => e.exit_code(),
            CommandError::Runtime(_) => exit_code::RUNTIME_FAILED,
            CommandError::Usage { .. } => exit_code::USAGE_ERROR,
        }
    }
}

/// 命令执行结果，由命令分发器转换为控制台输出和进程退出码
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// 进程退出码
    pub exit_code: i32,
    /// 诊断信息
    pub diagnostic_message: Option<String>,
}

impl CommandResult {
    /// 成功结果
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: exit_code::SUCCESS,
            diagnostic_message: Some(message.into()),
        }
    }

    /// 是否成功
    pub fn is_success(&self) -> bool {
        self.exit_code == exit_code::SUCCESS
    }
}

impl From<&CommandError> for CommandResult {
    fn from(error: &CommandError) -> Self {
        Self {
            exit_code: error.exit_code(),
            diagnostic_message: Some(error.to_string()),
        }
    }
}

/// 配置加载阶段的错误类型
#[derive(Error, Debug)]
pub enum ServiceLifecycleError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ServiceLifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_error_display_includes_code() {
        let error = OsError::with_code(1060, "指定的服务未安装");
        assert_eq!(error.to_string(), "指定的服务未安装 (1060)");

        let error = OsError::new(None, "未知错误");
        assert_eq!(error.to_string(), "未知错误");
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            exit_code::CANNOT_RESOLVE_BINARY_PATH,
            exit_code::DATABASE_OPEN_FAILED,
            exit_code::SERVICE_CREATE_FAILED,
            exit_code::SERVICE_OPEN_FAILED,
            exit_code::DELETE_FAILED,
            exit_code::USAGE_ERROR,
            exit_code::RUNTIME_FAILED,
            exit_code::CONFIG_INVALID,
        ];
        for (i, code) in codes.iter().enumerate() {
            assert!(*code < 0);
            assert!(!codes[i + 1..].contains(code));
        }
    }

    #[test]
    fn test_database_open_failure_shares_exit_code() {
        let install = InstallError::DatabaseOpenFailed(OsError::with_code(5, "拒绝访问"));
        let uninstall = UninstallError::DatabaseOpenFailed(OsError::with_code(5, "拒绝访问"));
        assert_eq!(install.exit_code(), uninstall.exit_code());
    }

    #[test]
    fn test_command_result_from_error() {
        let error = CommandError::from(UninstallError::ServiceOpenFailed(OsError::with_code(
            1060,
            "指定的服务未安装",
        )));
        let result = CommandResult::from(&error);
        assert_eq!(result.exit_code, exit_code::SERVICE_OPEN_FAILED);
        assert!(!result.is_success());
        assert!(result.diagnostic_message.unwrap().contains("1060"));
    }
}
