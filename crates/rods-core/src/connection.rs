//! 连接能力：数据面消费的唯一外部接口。
//!
//! 一条连接对应一个已完成认证握手的 TCP 会话；连接池与握手由实现方
//! 提供。核心保证一条连接在任意时刻只被一个句柄、游标或单次调用独占。

use crate::api::ApiNumber;
use crate::contract::CallContext;
use crate::error::RodsError;
use crate::message::{ReplyBody, RequestBody};
use async_trait::async_trait;
use bytes::Bytes;

/// 紧急关闭回调。
pub type CloseHandler = Box<dyn FnOnce() + Send>;

/// 注销句柄：Drop 或显式 `disarm` 时撤销已注册的关闭回调。
pub struct CloseGuard {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl CloseGuard {
    /// 以撤销闭包构造注销句柄。
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// 显式撤销注册。
    pub fn disarm(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for CloseGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloseGuard").finish_non_exhaustive()
    }
}

/// `Connection` 是核心消费的连接能力。
///
/// # 契约说明（What）
/// - **前置条件**：实现方已完成握手；取消/截止在每次往返边界上生效；
/// - **输出保障**：服务端错误映射为 [`RodsError::Api`]，应答体变体与
///   请求的 API 语义一致；
/// - **后置条件**：`close` 之后连接不再可用（归还连接池或断开）。
#[async_trait]
pub trait Connection: Send + Sync {
    /// 发送一次类型化请求并等待应答。
    async fn request(
        &mut self,
        ctx: &CallContext,
        api: ApiNumber,
        request: RequestBody,
    ) -> Result<ReplyBody, RodsError>;

    /// 携带批量缓冲区的往返。
    ///
    /// `payload` 作为写路径的附加批量载荷随请求发出；`sink` 是读路径的
    /// 调用方缓冲区，应答中的批量字节拷贝进去，实际长度由应答体报告。
    async fn request_with_buffers(
        &mut self,
        ctx: &CallContext,
        api: ApiNumber,
        request: RequestBody,
        payload: Option<Bytes>,
        sink: Option<&mut [u8]>,
    ) -> Result<ReplyBody, RodsError>;

    /// 释放连接（归还连接池或断开）。
    async fn close(self: Box<Self>) -> Result<(), RodsError>;

    /// 注册紧急关闭回调；不支持的实现返回 `None`。
    ///
    /// 重开出来的子句柄用它感知连接被外部强制关闭的事件。
    fn register_close_handler(&mut self, handler: CloseHandler) -> Option<CloseGuard> {
        let _ = handler;
        None
    }
}

/// 连接工厂：按需生产连接，实现方可以在背后做池化。
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// 获取一条独占连接。
    async fn connect(&self, ctx: &CallContext) -> Result<Box<dyn Connection>, RodsError>;
}
