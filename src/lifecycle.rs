//! 生命周期回调宿主
//!
//! 服务运行时依次调用 start → run → stop。状态机：
//!
//! ```text
//! Created --start--> Started --run--> Running --stop--> Stopping --run 返回--> Stopped
//! ```
//!
//! stop 可能在与 run 不同的线程上被调用，它只负责置位停止标志；
//! run 在每次迭代前检查该标志，最迟一个轮询间隔后返回。

use crate::error::LifecycleError;
use crate::sink::LogSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// 默认的 run 循环间隔
pub const DEFAULT_RUN_INTERVAL: Duration = Duration::from_secs(1);

/// 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// 已创建，尚未启动
    Created,
    /// start 已完成
    Started,
    /// run 循环进行中
    Running,
    /// 已请求停止，等待 run 返回
    Stopping,
    /// 已停止
    Stopped,
}

/// 停止信号
///
/// 由宿主实例持有，克隆后共享同一个原子标志。
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
}

impl StopSignal {
    /// 创建未置位的停止信号
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求停止，返回是否为首次请求
    pub fn request(&self) -> bool {
        !self.requested.swap(true, Ordering::AcqRel)
    }

    /// 是否已请求停止
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct PhaseState {
    phase: LifecyclePhase,
    run_entered: bool,
}

/// 生命周期回调宿主
pub struct LifecycleHost {
    sink: Arc<dyn LogSink>,
    run_interval: Duration,
    stop_signal: StopSignal,
    state: Mutex<PhaseState>,
}

impl LifecycleHost {
    /// 创建新的生命周期宿主
    pub fn new(sink: Arc<dyn LogSink>, run_interval: Duration) -> Self {
        Self {
            sink,
            run_interval,
            stop_signal: StopSignal::new(),
            state: Mutex::new(PhaseState {
                phase: LifecyclePhase::Created,
                run_entered: false,
            }),
        }
    }

    /// 当前状态
    pub fn phase(&self) -> LifecyclePhase {
        self.lock_state().phase
    }

    /// 停止信号句柄
    pub fn stop_signal(&self) -> StopSignal {
        self.stop_signal.clone()
    }

    /// run 循环间隔
    pub fn run_interval(&self) -> Duration {
        self.run_interval
    }

    /// 启动回调，只记录调用参数，不做阻塞工作
    pub fn start(&self, args: &[String]) -> Result<u32, LifecycleError> {
        {
            let mut state = self.lock_state();
            if state.phase != LifecyclePhase::Created {
                return Err(LifecycleError::InvalidTransition {
                    operation: "start",
                    state: state.phase,
                });
            }
            state.phase = LifecyclePhase::Started;
        }

        self.sink.append(&format!("Start:argc:[{}]:", args.len()));
        for arg in args {
            self.sink.append(&format!(" {arg}"));
        }
        Ok(0)
    }

    /// 运行回调，阻塞直到观察到停止标志
    pub fn run(&self) -> Result<u32, LifecycleError> {
        {
            let mut state = self.lock_state();
            match (state.phase, state.run_entered) {
                (LifecyclePhase::Started, false) => state.phase = LifecyclePhase::Running,
                // start 之后、run 之前已经收到停止请求
                (LifecyclePhase::Stopping, false) => {}
                (phase, _) => {
                    return Err(LifecycleError::InvalidTransition {
                        operation: "run",
                        state: phase,
                    })
                }
            }
            state.run_entered = true;
        }

        self.sink.append("run ...");
        let mut counter: u64 = 1;
        while !self.stop_signal.is_requested() {
            self.sink.append(&format!("run {counter}"));
            counter += 1;
            thread::sleep(self.run_interval);
        }
        self.sink.append("run end");

        self.lock_state().phase = LifecyclePhase::Stopped;
        debug!("run 循环结束，共迭代 {} 次", counter - 1);
        Ok(0)
    }

    /// 停止回调，只置位停止标志，可重复调用
    pub fn stop(&self) {
        self.sink.append("stop");
        if !self.stop_signal.request() {
            debug!("忽略重复的停止请求");
        }

        let mut state = self.lock_state();
        state.phase = match state.phase {
            LifecyclePhase::Created => LifecyclePhase::Stopped,
            LifecyclePhase::Started | LifecyclePhase::Running => LifecyclePhase::Stopping,
            phase => phase,
        };
    }

    fn lock_state(&self) -> MutexGuard<'_, PhaseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingSink;
    use std::time::Instant;

    fn create_host(interval: Duration) -> (Arc<LifecycleHost>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let host = Arc::new(LifecycleHost::new(sink.clone(), interval));
        (host, sink)
    }

    #[test]
    fn test_start_logs_arguments() {
        let (host, sink) = create_host(Duration::from_millis(10));
        let code = host
            .start(&["coturn".to_string(), "--verbose".to_string()])
            .unwrap();

        assert_eq!(code, 0);
        assert_eq!(host.phase(), LifecyclePhase::Started);
        assert_eq!(
            sink.lines(),
            vec![
                "Start:argc:[2]:".to_string(),
                " coturn".to_string(),
                " --verbose".to_string()
            ]
        );
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let (host, _sink) = create_host(Duration::from_millis(10));
        host.start(&[]).unwrap();

        let result = host.start(&[]);
        assert_eq!(
            result,
            Err(LifecycleError::InvalidTransition {
                operation: "start",
                state: LifecyclePhase::Started
            })
        );
    }

    #[test]
    fn test_run_before_start_is_rejected() {
        let (host, sink) = create_host(Duration::from_millis(10));
        let result = host.run();

        assert!(matches!(
            result,
            Err(LifecycleError::InvalidTransition {
                operation: "run",
                state: LifecyclePhase::Created
            })
        ));
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn test_run_exits_within_one_interval_after_stop() {
        let interval = Duration::from_millis(50);
        let (host, sink) = create_host(interval);
        host.start(&[]).unwrap();

        let worker_host = Arc::clone(&host);
        let worker = thread::spawn(move || worker_host.run());

        thread::sleep(Duration::from_millis(180));
        assert_eq!(host.phase(), LifecyclePhase::Running);

        let stop_requested_at = Instant::now();
        host.stop();
        let result = worker.join().unwrap();
        let latency = stop_requested_at.elapsed();

        assert_eq!(result, Ok(0));
        assert!(latency < interval * 4, "run 退出耗时过长: {latency:?}");
        assert_eq!(host.phase(), LifecyclePhase::Stopped);

        // 计数器从 1 开始递增
        assert!(sink.contains("run ..."));
        assert!(sink.contains("run 1"));
        assert!(sink.contains("run 2"));
        assert!(sink.contains("run end"));
    }

    #[test]
    fn test_run_only_once() {
        let (host, _sink) = create_host(Duration::from_millis(5));
        host.start(&[]).unwrap();
        host.stop();

        assert_eq!(host.run(), Ok(0));
        assert!(matches!(
            host.run(),
            Err(LifecycleError::InvalidTransition {
                operation: "run",
                state: LifecyclePhase::Stopped
            })
        ));
    }

    #[test]
    fn test_stop_before_run_skips_loop() {
        let (host, sink) = create_host(Duration::from_millis(5));
        host.start(&[]).unwrap();
        host.stop();
        assert_eq!(host.phase(), LifecyclePhase::Stopping);

        assert_eq!(host.run(), Ok(0));
        assert_eq!(sink.count_matching("run "), 2); // "run ..." 与 "run end"
        assert_eq!(host.phase(), LifecyclePhase::Stopped);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (host, sink) = create_host(Duration::from_millis(5));
        host.start(&[]).unwrap();

        host.stop();
        host.stop();
        host.stop();

        assert!(host.stop_signal().is_requested());
        assert_eq!(host.phase(), LifecyclePhase::Stopping);
        assert_eq!(sink.count_matching("stop"), 3);
    }

    #[test]
    fn test_stop_signal_shared_between_clones() {
        let (host, _sink) = create_host(Duration::from_millis(5));
        let signal = host.stop_signal();
        assert!(!signal.is_requested());

        assert!(signal.request());
        assert!(!signal.request());
        assert!(host.stop_signal().is_requested());
    }

    #[test]
    fn test_hosts_do_not_share_stop_flag() {
        let (first, _) = create_host(Duration::from_millis(5));
        let (second, _) = create_host(Duration::from_millis(5));

        first.stop();
        assert!(first.stop_signal().is_requested());
        assert!(!second.stop_signal().is_requested());
    }

    #[test]
    fn test_stop_before_start_finishes_lifecycle() {
        let (host, _sink) = create_host(Duration::from_millis(5));
        host.stop();
        assert_eq!(host.phase(), LifecyclePhase::Stopped);
        assert!(host.start(&[]).is_err());
    }
}
