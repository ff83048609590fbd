//! 进度事件：传输引擎对外的 fire-and-forget 通知。

use crate::options::ProgressHandler;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::SystemTime;

/// 事件对应的动作类别。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferAction {
    RegisterFile,
    TransferFile,
    ComputeChecksum,
    SetModificationTime,
    CreateDirectory,
    RemoveFile,
    RemoveDirectory,
}

/// 单条进度事件。
///
/// 消费方（进度条渲染等）在引擎之外；事件不携带任何回压语义。
#[derive(Clone, Debug)]
pub struct ProgressEvent {
    pub label: String,
    pub size: i64,
    pub transferred: i64,
    pub increment: i64,
    pub started_at: SystemTime,
    pub finished_at: Option<SystemTime>,
    pub action: TransferAction,
}

/// 跨拷贝任务共享的进度计数器。
pub(crate) struct ProgressTracker {
    label: String,
    size: i64,
    transferred: AtomicI64,
    started_at: SystemTime,
    action: TransferAction,
    handler: Option<ProgressHandler>,
}

impl ProgressTracker {
    pub(crate) fn new(
        label: impl Into<String>,
        size: i64,
        action: TransferAction,
        handler: Option<ProgressHandler>,
    ) -> Self {
        Self {
            label: label.into(),
            size,
            transferred: AtomicI64::new(0),
            started_at: SystemTime::now(),
            action,
            handler,
        }
    }

    /// 累计增量并上报一条进行中事件。
    pub(crate) fn add(&self, increment: i64) {
        let transferred = self.transferred.fetch_add(increment, Ordering::AcqRel) + increment;
        if let Some(handler) = &self.handler {
            handler(&ProgressEvent {
                label: self.label.clone(),
                size: self.size,
                transferred,
                increment,
                started_at: self.started_at,
                finished_at: None,
                action: self.action,
            });
        }
    }

    /// 已累计的字节数。
    pub(crate) fn transferred(&self) -> i64 {
        self.transferred.load(Ordering::Acquire)
    }

    /// 上报完成事件。
    pub(crate) fn finish(&self) {
        if let Some(handler) = &self.handler {
            handler(&ProgressEvent {
                label: self.label.clone(),
                size: self.size,
                transferred: self.transferred(),
                increment: 0,
                started_at: self.started_at,
                finished_at: Some(SystemTime::now()),
                action: self.action,
            });
        }
    }
}

/// 一次性动作（建目录、删除、设置修改时间等）的即时事件。
pub(crate) fn notify(handler: &Option<ProgressHandler>, label: &str, action: TransferAction) {
    if let Some(handler) = handler {
        let now = SystemTime::now();
        handler(&ProgressEvent {
            label: label.to_string(),
            size: 0,
            transferred: 0,
            increment: 0,
            started_at: now,
            finished_at: Some(now),
            action,
        });
    }
}
