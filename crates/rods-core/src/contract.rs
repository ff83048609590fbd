//! 调用上下文契约：取消信号、截止时间与两者的组合载体。
//!
//! 数据面所有公开操作都以 `&CallContext` 作为首个参数。连接实现方在每次
//! 网络往返的边界上检查取消与截止；核心代码在进入阻塞步骤之前调用
//! [`CallContext::ensure_active`] 以便尽早失败。

use crate::error::RodsError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 取消轮询间隔：等待取消信号时的休眠步长。
const CANCELLATION_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// `Cancellation` 是跨任务共享的取消标志。
///
/// # 设计背景（Why）
/// - 并行传输引擎会把同一逻辑操作分裂到多个任务（范围拷贝、目录扫描、
///   分发器），取消必须一次触发、处处可见；
/// - 标志本身只是 `Arc<AtomicBool>`，克隆与检查都是无锁常数开销。
///
/// # 契约说明（What）
/// - `cancel` 幂等，首次触发返回 `true`；
/// - `child` 返回共享同一标志的副本，父级取消对所有子副本立即可见。
#[derive(Clone, Debug)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    /// 创建独立的取消标志。
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 查询是否已被取消。
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// 触发取消；返回本次调用是否完成了从未取消到取消的翻转。
    pub fn cancel(&self) -> bool {
        !self.flag.swap(true, Ordering::AcqRel)
    }

    /// 派生共享同一标志的子句柄。
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::clone(&self.flag),
        }
    }

    /// 挂起直到取消被触发。
    ///
    /// 哈希计算等不可中断的阻塞步骤用它与工作 Future 做 `select`，
    /// 以便在取消后不再等待结果。
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            tokio::time::sleep(CANCELLATION_POLL_INTERVAL).await;
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// `Deadline` 表示可选的绝对截止时间点。
///
/// 无截止（`none`）表示调用可以任意阻塞；有截止时，核心在操作边界上
/// 将过期映射为 [`RodsError::Timeout`]。
#[derive(Clone, Copy, Debug, Default)]
pub struct Deadline {
    instant: Option<Instant>,
}

impl Deadline {
    /// 无截止时间。
    pub const fn none() -> Self {
        Self { instant: None }
    }

    /// 以绝对时间点构造截止。
    pub fn at(instant: Instant) -> Self {
        Self {
            instant: Some(instant),
        }
    }

    /// 以相对当前时刻的超时构造截止。
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            instant: Some(Instant::now() + timeout),
        }
    }

    /// 读取截止时间点；`None` 表示无截止。
    pub fn instant(&self) -> Option<Instant> {
        self.instant
    }

    /// 判断截止是否已过期。
    pub fn is_expired(&self) -> bool {
        match self.instant {
            Some(target) => target <= Instant::now(),
            None => false,
        }
    }

    /// 距离截止的剩余时长；无截止时返回 `None`。
    pub fn remaining(&self) -> Option<Duration> {
        self.instant
            .map(|target| target.saturating_duration_since(Instant::now()))
    }
}

/// `CallContext` 组合一次调用链路上的取消与截止约束。
///
/// # 契约说明（What）
/// - **前置条件**：上下文由最外层调用方构造，内部任务通过 [`child`](Self::child)
///   派生共享取消标志的副本；
/// - **后置条件**：`ensure_active` 在取消时返回 [`RodsError::Cancelled`]，
///   在截止过期时返回 [`RodsError::Timeout`]，否则不产生副作用。
#[derive(Clone, Debug)]
pub struct CallContext {
    cancellation: Cancellation,
    deadline: Deadline,
}

impl CallContext {
    /// 构造无约束的后台上下文。
    pub fn background() -> Self {
        Self {
            cancellation: Cancellation::new(),
            deadline: Deadline::none(),
        }
    }

    /// 进入 Builder 流程。
    pub fn builder() -> CallContextBuilder {
        CallContextBuilder::default()
    }

    /// 读取取消标志。
    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// 读取截止时间。
    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// 派生共享取消标志与截止的子上下文。
    pub fn child(&self) -> Self {
        Self {
            cancellation: self.cancellation.child(),
            deadline: self.deadline,
        }
    }

    /// 在进入阻塞步骤前检查上下文是否仍然有效。
    pub fn ensure_active(&self) -> Result<(), RodsError> {
        if self.cancellation.is_cancelled() {
            return Err(RodsError::Cancelled);
        }
        if self.deadline.is_expired() {
            return Err(RodsError::Timeout);
        }
        Ok(())
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}

/// [`CallContext`] 的 Builder，按值叠加各约束后一次性固化。
#[derive(Debug, Default)]
pub struct CallContextBuilder {
    cancellation: Option<Cancellation>,
    deadline: Deadline,
}

impl CallContextBuilder {
    /// 指定取消标志；缺省时自动创建独立标志。
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// 指定截止时间。
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// 固化为不可变上下文。
    pub fn build(self) -> CallContext {
        CallContext {
            cancellation: self.cancellation.unwrap_or_default(),
            deadline: self.deadline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_shared_through_children() {
        let parent = Cancellation::new();
        let child = parent.child();
        assert!(!child.is_cancelled());
        assert!(parent.cancel());
        assert!(child.is_cancelled());
        assert!(!parent.cancel(), "第二次取消不应再次翻转");
    }

    #[test]
    fn ensure_active_maps_cancel_and_deadline() {
        let ctx = CallContext::background();
        assert!(ctx.ensure_active().is_ok());
        ctx.cancellation().cancel();
        assert!(matches!(ctx.ensure_active(), Err(RodsError::Cancelled)));

        let expired = CallContext::builder()
            .with_deadline(Deadline::at(Instant::now() - Duration::from_millis(1)))
            .build();
        assert!(matches!(expired.ensure_active(), Err(RodsError::Timeout)));
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let cancellation = Cancellation::new();
        let waiter = cancellation.child();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        cancellation.cancel();
        task.await.expect("等待取消的任务应正常结束");
    }
}
