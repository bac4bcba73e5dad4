//! 停止确认轮询
//!
//! 发送停止请求后按固定间隔查询服务状态，直到服务离开 StopPending
//! 或者达到最大查询次数。

use crate::config::StopPollConfig;
use crate::error::PollError;
use crate::registrar::database::{ServiceHandle, ServiceState};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// 默认轮询间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// 默认最大查询次数
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// 轮询结束时的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    /// 服务已停止
    Stopped,
    /// 服务离开了 StopPending，但没有停止
    StillPending(ServiceState),
    /// 达到最大查询次数时仍处于 StopPending
    TimedOut {
        /// 已执行的查询次数
        attempts: u32,
    },
}

/// 停止确认轮询器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPoller {
    interval: Duration,
    max_attempts: u32,
}

impl Default for StopPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_MAX_ATTEMPTS)
    }
}

impl From<&StopPollConfig> for StopPoller {
    fn from(config: &StopPollConfig) -> Self {
        Self::new(config.interval(), config.max_attempts)
    }
}

impl StopPoller {
    /// 创建轮询器，最大查询次数至少为 1
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// 轮询间隔
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 最大查询次数
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 发送停止请求并等待服务停止
    pub fn wait_for_stop<H>(&self, handle: &H) -> Result<TerminalStatus, PollError>
    where
        H: ServiceHandle + ?Sized,
    {
        handle.stop().map_err(PollError::StopRejected)?;

        let mut attempts = 0;
        loop {
            thread::sleep(self.interval);
            let status = handle.query_status().map_err(PollError::QueryFailed)?;
            attempts += 1;

            match status.current_state {
                ServiceState::Stopped => return Ok(TerminalStatus::Stopped),
                ServiceState::StopPending if attempts >= self.max_attempts => {
                    return Ok(TerminalStatus::TimedOut { attempts })
                }
                ServiceState::StopPending => {
                    debug!("服务仍在停止中，第 {attempts} 次查询");
                }
                other => return Ok(TerminalStatus::StillPending(other)),
            }
        }
    }
}
