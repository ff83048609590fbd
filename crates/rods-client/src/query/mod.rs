//! 分页目录查询引擎。
//!
//! [`PreparedQuery`] 以不可变 Builder 组装选择列与条件，
//! [`QueryResult`] 以续传游标跨往返流式吐行，[`value`] 模块定义行值到
//! Rust 类型的显式转换能力集。

pub mod builder;
pub mod genquery2;
pub mod result;
pub mod value;

pub use builder::{Condition, PreparedQuery};
pub use result::{QueryResult, Row};
pub use value::{ScanTargets, ScanValue};

/// 单次往返的默认行数上限。
pub const DEFAULT_MAX_ROWS: i32 = 500;
