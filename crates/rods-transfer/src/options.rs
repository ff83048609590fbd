//! 传输选项与错误/进度回调类型。

use crate::progress::ProgressEvent;
use crate::sizing::{BUFFER_SIZE, MINIMUM_RANGE_SIZE};
use rods_core::error::RodsError;
use std::sync::Arc;

/// 进度回调；从任意任务并发调用，实现必须线程安全。
pub type ProgressHandler = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// 错误处理器的决定。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// 记录错误后继续处理后续文件。
    Continue,
    /// 终止整个目录同步。
    Abort,
}

/// 错误回调：目录同步的每个单文件错误先经过它再并入聚合错误。
pub type ErrorHandler = Arc<dyn Fn(&str, &RodsError) -> ErrorDisposition + Send + Sync>;

/// 传输引擎选项。
#[derive(Clone)]
pub struct TransferOptions {
    /// 以 `O_EXCL` 打开目标并跳过已存在的文件。
    pub exclusive: bool,
    /// 传输完成后把修改时间同步到目标侧。
    pub sync_mod_time: bool,
    /// 单文件并行度；0 表示沿用门面配置。
    pub max_threads: usize,
    /// 目录同步生产者领先消费者的最大文件数。
    pub max_queued: usize,
    /// 以校验和而非修改时间判定文件是否需要重传。
    pub verify_checksums: bool,
    /// 拷贝缓冲区尺寸。
    pub buffer_size: usize,
    /// 单个范围的下限。
    pub min_range_size: i64,
    pub error_handler: Option<ErrorHandler>,
    pub progress_handler: Option<ProgressHandler>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            exclusive: false,
            sync_mod_time: true,
            max_threads: 0,
            max_queued: 16,
            verify_checksums: false,
            buffer_size: BUFFER_SIZE,
            min_range_size: MINIMUM_RANGE_SIZE,
            error_handler: None,
            progress_handler: None,
        }
    }
}
