//! 服务描述符
//!
//! 安装时根据配置中的服务身份和当前可执行文件路径构建，提交后不再修改。

use crate::config::types::redact_password;
use crate::config::ServiceConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// 服务启动类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartType {
    /// 系统启动时自动启动
    #[default]
    AutoStart,
    /// 由系统加载器启动（仅驱动）
    BootStart,
    /// 按需启动
    DemandStart,
    /// 禁用
    Disabled,
    /// 由 IoInitSystem 启动（仅驱动）
    SystemStart,
}

/// 服务描述符
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// 服务名称
    pub name: String,
    /// 显示名称
    pub display_name: String,
    /// 启动类型
    pub start_type: StartType,
    /// 依赖的服务，按顺序
    pub dependencies: Vec<String>,
    /// 运行账户
    pub account: String,
    /// 账户密码
    pub password: Option<String>,
    /// 带引号的可执行文件路径
    pub binary_path: String,
    /// 服务启动参数
    pub launch_arguments: Vec<String>,
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .field("start_type", &self.start_type)
            .field("dependencies", &self.dependencies)
            .field("account", &self.account)
            .field("password", &redact_password(&self.password))
            .field("binary_path", &self.binary_path)
            .field("launch_arguments", &self.launch_arguments)
            .finish()
    }
}

impl ServiceDescriptor {
    /// 根据服务配置和可执行文件路径构建描述符
    ///
    /// 路径不是合法 UTF-8 时返回 `None`。
    pub fn new(
        service: &ServiceConfig,
        executable: &Path,
        launch_arguments: Vec<String>,
    ) -> Option<Self> {
        let executable = executable.to_str()?;

        Some(Self {
            name: service.name.clone(),
            display_name: service.display_name.clone(),
            start_type: service.start_type,
            dependencies: service.dependencies.clone(),
            account: service.account.clone(),
            password: service.password.clone(),
            binary_path: quote_binary_path(executable),
            launch_arguments,
        })
    }

    /// 去掉引号后的可执行文件路径
    pub fn unquoted_binary_path(&self) -> &str {
        self.binary_path
            .strip_prefix('"')
            .and_then(|path| path.strip_suffix('"'))
            .unwrap_or(&self.binary_path)
    }
}

/// 给可执行文件路径加上双引号
///
/// 路径中可能包含空格，例如 `C:\my app\svc.exe` 必须写成 `"C:\my app\svc.exe"`
/// 才能被服务控制管理器正确解析。已经带引号的路径保持不变。
pub fn quote_binary_path(path: &str) -> String {
    if path.len() >= 2 && path.starts_with('"') && path.ends_with('"') {
        path.to_string()
    } else {
        format!("\"{path}\"")
    }
}
