//! 命令分发器
//!
//! 把进程参数解析为安装、删除或服务模式运行，并把结果转换为退出码

use crate::config::Config;
use crate::error::{exit_code, CommandError, CommandResult};
use crate::lifecycle::LifecycleHost;
use crate::registrar::{Registrar, ServiceControlManager};
use crate::runtime::ServiceRuntime;
use crate::sink::LogSink;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// 解析后的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 安装服务
    Install,
    /// 删除服务
    Remove,
    /// 无法识别的命令，携带原始参数
    Usage(String),
    /// 以服务方式运行
    RunAsService,
}

impl Command {
    /// 解析命令参数（不含程序名）
    ///
    /// 只看第一个参数：以 `-` 或 `/` 开头时按命令解析，忽略大小写；
    /// 否则进入服务模式。
    pub fn parse(args: &[String]) -> Self {
        let Some(first) = args.first() else {
            return Command::RunAsService;
        };

        let Some(command) = first.strip_prefix('-').or_else(|| first.strip_prefix('/')) else {
            return Command::RunAsService;
        };

        if command.eq_ignore_ascii_case("install") {
            Command::Install
        } else if command.eq_ignore_ascii_case("remove") {
            Command::Remove
        } else {
            Command::Usage(first.clone())
        }
    }
}

/// 命令分发器
pub struct Dispatcher<M, R> {
    config: Config,
    config_path: Option<PathBuf>,
    registrar: Registrar<M>,
    runtime: R,
    sink: Arc<dyn LogSink>,
    program: String,
}

impl<M, R> Dispatcher<M, R>
where
    M: ServiceControlManager,
    R: ServiceRuntime,
{
    /// 创建新的命令分发器
    ///
    /// `config_path` 是本次加载的配置文件，安装时会写入服务启动参数。
    pub fn new(
        config: Config,
        config_path: Option<PathBuf>,
        registrar: Registrar<M>,
        runtime: R,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            config,
            config_path,
            registrar,
            runtime,
            sink,
            program: crate::APP_NAME.to_string(),
        }
    }

    /// 设置用法说明中显示的程序名
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// 用法说明
    pub fn usage(&self) -> String {
        format!(
            "{}\n用法:\n\t-install: 安装服务\n\t-remove:  删除服务",
            self.program
        )
    }

    /// 分发命令
    pub fn dispatch(&self, args: &[String]) -> CommandResult {
        let command = Command::parse(args);
        debug!("分发命令: {:?}", command);

        match self.execute(command) {
            Ok(result) => result,
            Err(error) => CommandResult::from(&error),
        }
    }

    fn execute(&self, command: Command) -> Result<CommandResult, CommandError> {
        let service_name = &self.config.service.name;

        match command {
            Command::Install => {
                let descriptor = self
                    .registrar
                    .install_current_executable(&self.config.service, self.launch_arguments())?;
                Ok(CommandResult::success(format!(
                    "服务安装成功: {} ({})",
                    descriptor.name, descriptor.binary_path
                )))
            }
            Command::Remove => {
                self.registrar.uninstall(service_name)?;
                Ok(CommandResult::success(format!("服务已删除: {service_name}")))
            }
            Command::Usage(token) => {
                info!("无法识别的命令: {}", token);
                Err(CommandError::Usage {
                    usage: format!("无法识别的命令: {token}\n{}", self.usage()),
                })
            }
            Command::RunAsService => {
                let host = Arc::new(LifecycleHost::new(
                    Arc::clone(&self.sink),
                    self.config.lifecycle.run_interval(),
                ));
                let code = self.runtime.run_as_service(service_name, host)?;
                info!("服务运行结束: {} (退出码 {})", service_name, code);
                Ok(CommandResult {
                    exit_code: i32::try_from(code).unwrap_or(exit_code::RUNTIME_FAILED),
                    diagnostic_message: None,
                })
            }
        }
    }

    /// 服务启动参数，让服务进程加载与安装时相同的配置
    fn launch_arguments(&self) -> Vec<String> {
        match &self.config_path {
            Some(path) => vec!["--config".to_string(), path.display().to_string()],
            None => Vec::new(),
        }
    }
}
