//! 日志输出能力
//!
//! 生命周期宿主和服务注册器只需要"追加一行"的能力，通过构造时注入，
//! 生产环境转发到 tracing，测试中使用 [`RecordingSink`] 记录输出。

use std::sync::{Mutex, PoisonError};
use tracing::info;

/// 追加一行日志
pub trait LogSink: Send + Sync {
    /// 追加一行
    fn append(&self, line: &str);
}

impl<F> LogSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn append(&self, line: &str) {
        self(line)
    }
}

/// 转发到 tracing 的日志输出
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn append(&self, line: &str) {
        info!(target: "service_lifecycle::service", "{line}");
    }
}

/// 在内存中记录每一行输出
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    /// 创建空的记录器
    pub fn new() -> Self {
        Self::default()
    }

    /// 已记录的全部行
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 是否存在完全相同的一行
    pub fn contains(&self, line: &str) -> bool {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|l| l == line)
    }

    /// 包含给定片段的行数
    pub fn count_matching(&self, fragment: &str) -> usize {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|l| l.contains(fragment))
            .count()
    }
}

impl LogSink for RecordingSink {
    fn append(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}
