//! 稳定错误域：服务端协议错误、核心校验错误与关闭路径的聚合错误。
//!
//! 对错误码的匹配一律走显式的 `code`/`same_class` 访问器，禁止对错误
//! 文本做字符串匹配。

use std::io;
use thiserror::Error;

/// iRODS 服务端错误码常量。
///
/// 错误码为带符号整数，按千位分桶：同一语义的码值在 `-N000..-N999`
/// 区间内漂移仍视为同类（见 [`ApiError::same_class`]）。
pub mod codes {
    /// 目录查询无结果；查询迭代把它吸收为流结束而非失败。
    pub const CAT_NO_ROWS_FOUND: i32 = -808000;
    /// 无访问权限；管理员模式下触发访问提升重试。
    pub const CAT_NO_ACCESS_PERMISSION: i32 = -818000;
    /// 目录实体类型不匹配；访问提升沿父路径回退时跳过。
    pub const INVALID_OBJECT_TYPE: i32 = -1105000;
    /// 副本层级冲突；上传路径对它做一次性改名重试。
    pub const HIERARCHY_ERROR: i32 = -1803000;
}

/// 千位分桶：`-808000..=-808999` 均归入桶 `-808`。
fn code_class(code: i32) -> i32 {
    code / 1000
}

/// `ApiError` 原样携带服务端返回的带符号错误码。
///
/// # 契约说明（What）
/// - `code` 为协议错误码，语义以 [`codes`] 模块的常量为准；
/// - `message` 仅面向排障人员，不参与任何匹配逻辑。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiError {
    code: i32,
    message: String,
}

impl ApiError {
    /// 以错误码与描述构造协议错误。
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// 读取原始错误码。
    pub fn code(&self) -> i32 {
        self.code
    }

    /// 判断本错误是否与给定码值同桶。
    ///
    /// 服务端各版本间存在个位数级别的码值漂移，按 `-N000..-N999`
    /// 分桶比较可以兼容这种漂移。
    pub fn same_class(&self, code: i32) -> bool {
        code_class(self.code) == code_class(code)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "irods api error {}", self.code)
        } else {
            write!(f, "irods api error {}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for ApiError {}

/// `RodsError` 是工作区共享的稳定错误枚举。
///
/// # 设计背景（Why）
/// - 查询游标、句柄关闭与并行传输各自有本地可恢复的错误（行尾、无行、
///   层级冲突），调用方需要在不解析文本的前提下精确分支；
/// - 关闭路径必须执行完每个清理步骤并保留全部成因，聚合变体承载这一点。
///
/// # 契约说明（What）
/// - [`Api`](Self::Api) 携带服务端协议错误；
/// - [`Aggregate`](Self::Aggregate) 仅由 [`ErrorAccumulator`] 构造，内部
///   保证至少包含两个成因；
/// - 其余变体为核心自身的校验与状态错误，语义在各自文档上注明。
#[derive(Debug, Error)]
pub enum RodsError {
    /// 服务端协议错误，原样携带错误码。
    #[error(transparent)]
    Api(ApiError),

    /// 游标当前不指向任何行。
    #[error("no current row to scan")]
    RowOutOfBound,

    /// Scan 目标数量超过了结果列数。
    #[error("more scan targets than result columns")]
    AttributeOutOfBound,

    /// 响应的列数组没有为当前行携带值。
    #[error("sql result carries no value for the current row")]
    NoSqlResults,

    /// 单行查询没有返回任何行。
    #[error("query returned no row")]
    NoRowFound,

    /// 截断尺寸非法（负数）。
    #[error("truncate size must not be negative")]
    InvalidSize,

    /// 重开传入了与原点相同的连接。
    #[error("reopen requires a distinct connection")]
    SameConnection,

    /// 描述符信息缺少副本令牌、副本号或资源层级。
    #[error("replica access info is incomplete")]
    IncompleteReplicaAccessInfo,

    /// 远端没有可用的校验和。
    #[error("no checksum available for remote data object")]
    ChecksumNotFound,

    /// 本地与远端校验和不一致；两侧摘要均以 base64 编码给出。
    #[error("checksum mismatch: local {local}, remote {remote}")]
    ChecksumMismatch { local: String, remote: String },

    /// 操作要求管理员模式。
    #[error("operation requires admin mode")]
    RequiresAdmin,

    /// 句柄已关闭后继续调用。
    #[error("handle already closed")]
    HandleClosed,

    /// 有界写入越过了区段边界。
    #[error("write exceeds the range section")]
    ShortWrite,

    /// 调用上下文已取消。
    #[error("operation cancelled")]
    Cancelled,

    /// 调用上下文的截止时间已过期。
    #[error("operation deadline exceeded")]
    Timeout,

    /// 连接返回了与请求 API 不匹配的应答变体。
    #[error("unexpected reply body for api {api}")]
    UnexpectedReply { api: u32 },

    /// 本地 IO 错误。
    #[error(transparent)]
    Io(#[from] io::Error),

    /// JSON 编解码错误（描述符信息、genquery2、touch 等 JSON 报文）。
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// 目录字符串值无法解析为目标类型。
    #[error("cannot parse {value:?} as {target}")]
    Parse {
        value: String,
        target: &'static str,
    },

    /// 多步清理路径的聚合错误，保留全部成因。
    #[error("{} errors occurred: {}", .0.len(), format_aggregate(.0))]
    Aggregate(Vec<RodsError>),
}

impl RodsError {
    /// 以错误码与描述构造协议错误变体。
    pub fn api(code: i32, message: impl Into<String>) -> Self {
        Self::Api(ApiError::new(code, message))
    }

    /// 本错误是否为指定码值的协议错误（精确匹配）。
    pub fn is_code(&self, code: i32) -> bool {
        matches!(self, Self::Api(err) if err.code() == code)
    }

    /// 本错误是否与指定码值同桶（千位分桶匹配）。
    pub fn is_code_class(&self, code: i32) -> bool {
        matches!(self, Self::Api(err) if err.same_class(code))
    }
}

fn format_aggregate(errors: &[RodsError]) -> String {
    let parts: Vec<String> = errors.iter().map(|err| err.to_string()).collect();
    parts.join("; ")
}

/// `ErrorAccumulator` 收集多步清理路径上的全部错误。
///
/// 关闭路径的每个步骤（等待子句柄、关闭描述符、截断、touch、归还连接）
/// 无论前序是否失败都必须执行；最终零个错误返回 `Ok`，一个错误原样
/// 返回，多个错误折叠为 [`RodsError::Aggregate`]。
#[derive(Debug, Default)]
pub struct ErrorAccumulator {
    errors: Vec<RodsError>,
}

impl ErrorAccumulator {
    /// 创建空累加器。
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个错误。
    pub fn push(&mut self, error: RodsError) {
        self.errors.push(error);
    }

    /// 追加结果中的错误分支，丢弃成功值。
    pub fn absorb<T>(&mut self, result: Result<T, RodsError>) {
        if let Err(error) = result {
            self.errors.push(error);
        }
    }

    /// 是否尚未收集到任何错误。
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// 折叠为最终结果。
    pub fn finish(mut self) -> Result<(), RodsError> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(RodsError::Aggregate(self.errors)),
        }
    }
}
