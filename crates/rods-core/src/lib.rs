#![doc = r#"
# rods-core

## 设计动机（Why）
- **定位**：该 crate 定义 iRODS 数据网格客户端在数据面之下共享的最小契约：
  连接能力、调用上下文、稳定错误域、目录数据模型与类型化线上报文。
- **架构角色**：上层的查询引擎、句柄生命周期与并行传输引擎都只依赖这里的
  [`Connection`](connection::Connection) 能力；帧编解码与认证握手由连接实现方
  自行承担，不进入本工作区。
- **设计理念**：强调“上下文传递”与“错误分类”，所有远程操作均感知
  [`CallContext`](contract::CallContext) 的取消与截止约束，并在失败时映射为
  携带稳定语义的 [`RodsError`](error::RodsError)。

## 核心契约（What）
- **输入条件**：调用方为每次操作提供 `CallContext`；连接实现方保证
  `request` 在取消/截止触发时尽快返回；
- **输出保障**：服务端错误以带符号整数码原样携带，核心错误以显式枚举
  暴露，关闭路径的多原因错误以聚合变体保留全部成因；
- **前置约束**：一条连接在任意时刻只被一个句柄、游标或单次调用独占。

## 实现策略（How）
- 报文体以类型化枚举承载（[`message::RequestBody`] / [`message::ReplyBody`]），
  批量载荷通过 `bytes::Bytes` 与调用方缓冲区在
  [`Connection::request_with_buffers`](connection::Connection::request_with_buffers)
  边界交接；
- API 号、关键字与目录列号以命名常量收敛在 [`api`] 模块，避免魔法数散落。
"#]

pub mod api;
pub mod connection;
pub mod contract;
pub mod error;
pub mod message;
pub mod path;
#[cfg(feature = "test-util")]
pub mod test_stubs;
pub mod types;

pub use connection::{Connection, ConnectionFactory};
pub use contract::{CallContext, Cancellation, Deadline};
pub use error::{ApiError, ErrorAccumulator, RodsError};

/// crate 级结果别名，错误默认为 [`RodsError`]。
pub type Result<T, E = RodsError> = core::result::Result<T, E>;
