//! 控制台运行时
//!
//! 在前台驱动生命周期：run 在阻塞线程上执行，Ctrl-C 或关闭信号触发 stop。

use crate::error::RuntimeError;
use crate::lifecycle::LifecycleHost;
use crate::runtime::ServiceRuntime;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// 控制台运行时
#[derive(Debug, Clone)]
pub struct ConsoleRuntime {
    /// 关闭信号发送器
    shutdown_tx: broadcast::Sender<()>,
    /// 是否监听 Ctrl-C
    listen_ctrl_c: bool,
}

impl ConsoleRuntime {
    /// 创建新的控制台运行时
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            listen_ctrl_c: true,
        }
    }

    /// 不监听 Ctrl-C，只响应关闭信号
    pub fn without_ctrl_c(mut self) -> Self {
        self.listen_ctrl_c = false;
        self
    }

    /// 获取关闭信号发送器
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    async fn drive(&self, name: &str, host: Arc<LifecycleHost>) -> Result<u32, RuntimeError> {
        // 先订阅，start 之后发送的关闭信号不会丢失
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        host.start(&[name.to_string()])?;

        let worker_host = Arc::clone(&host);
        let mut worker = tokio::task::spawn_blocking(move || worker_host.run());

        tokio::select! {
            result = &mut worker => {
                debug!("run 在收到外部关闭信号前结束");
                return join_result(result);
            }
            _ = shutdown_rx.recv() => info!("收到关闭信号，正在停止服务: {}", name),
            _ = wait_for_ctrl_c(self.listen_ctrl_c) => info!("收到 Ctrl-C，正在停止服务: {}", name),
        }

        host.stop();
        join_result(worker.await)
    }
}

impl Default for ConsoleRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRuntime for ConsoleRuntime {
    fn run_as_service(&self, name: &str, host: Arc<LifecycleHost>) -> Result<u32, RuntimeError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        info!("以控制台模式运行服务: {}", name);
        runtime.block_on(self.drive(name, host))
    }
}

/// 等待 Ctrl-C；未启用或无法监听时永不完成
async fn wait_for_ctrl_c(enabled: bool) {
    if enabled {
        match tokio::signal::ctrl_c().await {
            Ok(()) => return,
            Err(e) => warn!("无法监听 Ctrl-C: {}", e),
        }
    }
    std::future::pending::<()>().await
}

fn join_result(
    result: Result<Result<u32, crate::error::LifecycleError>, JoinError>,
) -> Result<u32, RuntimeError> {
    result
        .map_err(|e| RuntimeError::WorkerPanicked(e.to_string()))?
        .map_err(RuntimeError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecyclePhase;
    use crate::sink::RecordingSink;
    use std::thread;
    use std::time::{Duration, Instant};

    fn create_host(sink: &Arc<RecordingSink>) -> Arc<LifecycleHost> {
        Arc::new(LifecycleHost::new(sink.clone(), Duration::from_millis(20)))
    }

    #[test]
    fn test_shutdown_signal_stops_run() {
        let sink = Arc::new(RecordingSink::new());
        let host = create_host(&sink);
        let runtime = ConsoleRuntime::new().without_ctrl_c();

        let shutdown_tx = runtime.shutdown_sender();
        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            let _ = shutdown_tx.send(());
        });

        let started = Instant::now();
        let result = runtime.run_as_service("coturn", Arc::clone(&host));
        sender.join().unwrap();

        assert_eq!(result.unwrap(), 0);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(host.phase(), LifecyclePhase::Stopped);
        assert!(sink.contains("Start:argc:[1]:"));
        assert!(sink.contains(" coturn"));
        assert!(sink.contains("stop"));
        assert!(sink.contains("run end"));
    }

    #[test]
    fn test_stop_signal_from_outside_ends_runtime() {
        let sink = Arc::new(RecordingSink::new());
        let host = create_host(&sink);
        let runtime = ConsoleRuntime::new().without_ctrl_c();

        let signal = host.stop_signal();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(60));
            signal.request();
        });

        let result = runtime.run_as_service("coturn", Arc::clone(&host));
        stopper.join().unwrap();

        assert_eq!(result.unwrap(), 0);
        assert!(sink.contains("run end"));
        // 停止标志由外部置位，运行时没有调用 stop 回调
        assert!(!sink.contains("stop"));
    }

    #[test]
    fn test_host_already_started_is_lifecycle_error() {
        let sink = Arc::new(RecordingSink::new());
        let host = create_host(&sink);
        host.start(&[]).unwrap();

        let runtime = ConsoleRuntime::new().without_ctrl_c();
        let result = runtime.run_as_service("coturn", host);

        assert!(matches!(result, Err(RuntimeError::Lifecycle(_))));
    }
}
