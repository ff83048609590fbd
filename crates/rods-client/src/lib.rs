#![doc = r#"
# rods-client

## 设计动机（Why）
- **定位**：在 `rods-core` 的连接契约之上提供数据面的高层 API：目录查询、
  层级遍历、数据对象句柄与范围 I/O 适配器。
- **架构角色**：并行传输引擎（`rods-transfer`）只消费本 crate 的门面、
  句柄与范围适配器；本 crate 自身不触碰帧编解码。
- **设计理念**：不可变的 Builder 风格配置（门面克隆、预编译查询），
  连接的独占所有权（每个游标/句柄/单次调用独占一条连接），以及
  显式的错误分支（错误码访问器而非文本匹配）。

## 核心契约（What）
- **门面**：[`Client`] 携带身份、管理员标志与默认资源，派生方法返回
  逻辑独立的副本，原值永不被修改；
- **查询**：[`query::PreparedQuery`] 在续传往返之间保持行序，服务端的
  `CAT_NO_ROWS_FOUND` 被吸收为流结束；
- **句柄**：[`handle::Handle`] 串行化同句柄并发调用，子句柄先于原点
  关闭，延迟截断/touch 在原点关闭时落盘。
"#]

pub mod facade;
pub mod glob;
pub mod handle;
pub mod ops;
pub mod query;
pub mod range;
pub mod walk;

mod catalog;

pub use facade::Client;
pub use ops::AtomicMetadataOp;
pub use glob::{glob, glob_collect, glob_to_like};
pub use handle::{Handle, OpenFlags};
pub use query::{PreparedQuery, QueryResult, Row};
pub use walk::{WalkDecision, WalkExtras, WalkOptions, WalkVisitor, walk};
