//! Windows服务运行时
//!
//! 通过 windows-service 的服务分发器驱动生命周期宿主

use crate::error::{OsError, RuntimeError};
use crate::lifecycle::LifecycleHost;
use crate::registrar::windows::os_error;
use crate::runtime::{ConsoleRuntime, ServiceRuntime};
use std::ffi::OsString;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{error, info};
use windows_service::service::{
    ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus,
    ServiceType,
};
use windows_service::service_control_handler::{self, ServiceControlHandlerResult};
use windows_service::{define_windows_service, service_dispatcher};

/// 进程不是由服务控制管理器启动时分发器返回的错误码
const ERROR_FAILED_SERVICE_CONTROLLER_CONNECT: i32 = 1063;

/// 生命周期回调失败时报告给服务控制管理器的退出码
const ERROR_SERVICE_SPECIFIC_FAILURE: u32 = 1066;

/// 分发器回调需要的上下文
///
/// 服务入口是无法携带参数的 FFI 函数，上下文只能放在静态槽位里，
/// 每个进程只能分发一次。
struct DispatchSlot {
    name: String,
    host: Arc<LifecycleHost>,
    exit_code: AtomicU32,
}

static DISPATCH_SLOT: OnceLock<DispatchSlot> = OnceLock::new();

define_windows_service!(ffi_service_main, service_main);

fn service_main(arguments: Vec<OsString>) {
    let Some(slot) = DISPATCH_SLOT.get() else {
        error!("服务入口被调用，但没有可用的生命周期宿主");
        return;
    };

    if let Err(e) = run_service(slot, arguments) {
        error!("Windows服务运行失败: {}", e);
        slot.exit_code
            .store(ERROR_SERVICE_SPECIFIC_FAILURE, Ordering::Release);
    }
}

fn run_service(slot: &DispatchSlot, arguments: Vec<OsString>) -> windows_service::Result<()> {
    let handler_host = Arc::clone(&slot.host);
    let event_handler = move |control_event| -> ServiceControlHandlerResult {
        match control_event {
            ServiceControl::Stop | ServiceControl::Shutdown => {
                info!("接收到服务停止信号");
                handler_host.stop();
                ServiceControlHandlerResult::NoError
            }
            ServiceControl::Interrogate => ServiceControlHandlerResult::NoError,
            _ => ServiceControlHandlerResult::NotImplemented,
        }
    };

    let status_handle = service_control_handler::register(&slot.name, event_handler)?;

    status_handle.set_service_status(service_status(
        ServiceState::StartPending,
        ServiceControlAccept::empty(),
        0,
    ))?;

    let arguments: Vec<String> = arguments
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    let exit_code = match slot.host.start(&arguments) {
        Ok(_) => {
            status_handle.set_service_status(service_status(
                ServiceState::Running,
                ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN,
                0,
            ))?;
            match slot.host.run() {
                Ok(code) => code,
                Err(e) => {
                    error!("run 回调失败: {}", e);
                    ERROR_SERVICE_SPECIFIC_FAILURE
                }
            }
        }
        Err(e) => {
            error!("start 回调失败: {}", e);
            ERROR_SERVICE_SPECIFIC_FAILURE
        }
    };

    slot.exit_code.store(exit_code, Ordering::Release);
    status_handle.set_service_status(service_status(
        ServiceState::Stopped,
        ServiceControlAccept::empty(),
        exit_code,
    ))?;
    Ok(())
}

fn service_status(
    current_state: ServiceState,
    controls_accepted: ServiceControlAccept,
    exit_code: u32,
) -> ServiceStatus {
    ServiceStatus {
        service_type: ServiceType::OWN_PROCESS,
        current_state,
        controls_accepted,
        exit_code: ServiceExitCode::Win32(exit_code),
        checkpoint: 0,
        wait_hint: if current_state == ServiceState::StartPending {
            Duration::from_secs(3)
        } else {
            Duration::default()
        },
        process_id: None,
    }
}

/// Windows服务运行时
///
/// 进程不是由服务控制管理器启动时（例如在终端里直接运行）退回控制台运行时。
#[derive(Debug, Clone, Default)]
pub struct WindowsServiceRuntime {
    console: ConsoleRuntime,
}

impl WindowsServiceRuntime {
    /// 创建新的Windows服务运行时
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServiceRuntime for WindowsServiceRuntime {
    fn run_as_service(&self, name: &str, host: Arc<LifecycleHost>) -> Result<u32, RuntimeError> {
        let slot = DispatchSlot {
            name: name.to_string(),
            host: Arc::clone(&host),
            exit_code: AtomicU32::new(0),
        };
        if DISPATCH_SLOT.set(slot).is_err() {
            return Err(RuntimeError::AlreadyDispatched);
        }

        match service_dispatcher::start(name, ffi_service_main) {
            Ok(()) => Ok(DISPATCH_SLOT
                .get()
                .map_or(0, |slot| slot.exit_code.load(Ordering::Acquire))),
            Err(e) => {
                let error: OsError = os_error(e);
                if error.code == Some(ERROR_FAILED_SERVICE_CONTROLLER_CONNECT) {
                    info!("进程不是由服务控制管理器启动的，改为控制台模式运行");
                    self.console.run_as_service(name, host)
                } else {
                    Err(RuntimeError::Dispatcher(error))
                }
            }
        }
    }
}
