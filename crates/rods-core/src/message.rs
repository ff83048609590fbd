//! 类型化线上报文：连接能力两侧交换的请求体与应答体。
//!
//! 帧编解码（header+body+bin 三元组、XML/二进制编组）不属于本工作区，
//! 连接实现方负责把这些值映射到线上格式。所有结构都派生 serde，既服务
//! 于 JSON 体报文，也给实现方留出统一的编组入口。

use crate::api::{ApiNumber, ColumnId};
use crate::error::RodsError;
use serde::{Deserialize, Serialize};

/// 有序键值对选项集。
///
/// 协议的键值对保持插入顺序；重复 `set` 同一键时原位覆盖。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVals {
    entries: Vec<(String, String)>,
}

impl KeyVals {
    /// 空选项集。
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入键值；已存在的键原位覆盖。
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
        self
    }

    /// 读取键对应的值。
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// 是否携带指定键。
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// 迭代全部键值对。
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// 键值对数量。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Seek 基准位置，映射为协议的 whence 整数。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Whence {
    Start,
    Current,
    End,
}

impl Whence {
    /// 协议侧的 whence 编码。
    pub fn wire_value(self) -> i32 {
        match self {
            Self::Start => 0,
            Self::Current => 1,
            Self::End => 2,
        }
    }
}

/// 两路径操作的 oprType 编码。
pub mod opr {
    pub const COPY_DEST: i32 = 9;
    pub const COPY_SRC: i32 = 10;
    pub const RENAME_DATA_OBJ: i32 = 11;
    pub const RENAME_COLL: i32 = 12;
}

/// 数据对象请求（open/create/unlink/truncate/checksum 等共用形状）。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataObjectRequest {
    pub path: String,
    pub open_flags: i32,
    pub create_mode: i32,
    pub opr_type: i32,
    pub data_size: i64,
    pub options: KeyVals,
}

impl DataObjectRequest {
    /// 以路径构造最小请求。
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            data_size: -1,
            ..Self::default()
        }
    }
}

/// 已打开描述符上的请求（read/write/seek/close 共用形状）。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenedDataObjectRequest {
    pub descriptor: i32,
    pub len: i64,
    pub offset: i64,
    pub whence: i32,
    pub options: KeyVals,
}

impl OpenedDataObjectRequest {
    /// 仅携带描述符的请求。
    pub fn with_descriptor(descriptor: i32) -> Self {
        Self {
            descriptor,
            ..Self::default()
        }
    }
}

/// 两路径请求（rename/copy）。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataObjCopyRequest {
    pub src: DataObjectRequest,
    pub dst: DataObjectRequest,
}

/// 分页目录查询请求。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenQueryIn {
    pub max_rows: i32,
    pub continue_index: i64,
    pub options: KeyVals,
    /// 选择列与聚合标志（0 表示普通选择）。
    pub selects: Vec<(ColumnId, i32)>,
    /// 列号到 SQL 条件片段（如 `= '/foo'`）的映射。
    pub conditions: Vec<(ColumnId, String)>,
}

/// 查询应答中的单列值数组。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlResult {
    pub column: ColumnId,
    pub values: Vec<String>,
}

/// 分页目录查询应答页。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenQueryReply {
    pub row_count: i32,
    pub attribute_count: i32,
    pub total_row_count: i32,
    pub continue_index: i64,
    pub columns: Vec<SqlResult>,
}

impl GenQueryReply {
    /// 读取指定行在第 `attr` 列上的值。
    ///
    /// 行号越界返回 [`RodsError::RowOutOfBound`]，列号越界返回
    /// [`RodsError::AttributeOutOfBound`]，列数组未携带该行的值返回
    /// [`RodsError::NoSqlResults`]。
    pub fn value(&self, row: usize, attr: usize) -> Result<&str, RodsError> {
        if row >= self.row_count.max(0) as usize {
            return Err(RodsError::RowOutOfBound);
        }
        let column = self
            .columns
            .get(attr)
            .ok_or(RodsError::AttributeOutOfBound)?;
        column
            .values
            .get(row)
            .map(String::as_str)
            .ok_or(RodsError::NoSqlResults)
    }
}

/// genquery2 自由文本查询请求。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenQuery2In {
    pub query: String,
    pub zone: String,
    /// 只返回服务端生成的 SQL，不执行。
    pub sql_only: bool,
    /// 列出服务端已知的列名，不执行查询。
    pub column_mappings: bool,
}

/// 集合请求（create/remove 共用形状）。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRequest {
    pub path: String,
    pub options: KeyVals,
}

/// 访问控制修改请求。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModAccessRequest {
    pub recursive: bool,
    /// 访问级别；管理员模式下由调用方加 `admin:` 前缀。
    pub access_level: String,
    pub user_name: String,
    pub zone: String,
    pub path: String,
}

/// AVU 元数据修改请求。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModAvuRequest {
    /// `add` / `rm` / `set`。
    pub operation: String,
    /// 实体标志位（`-d`/`-C`/`-R`/`-u`）。
    pub item_type: String,
    pub path: String,
    pub name: String,
    pub value: String,
    pub units: String,
}

/// 通用管理请求，最多十个位置参数。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralAdminRequest {
    pub args: Vec<String>,
}

impl GeneralAdminRequest {
    /// 以位置参数序列构造请求。
    pub fn with_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// 物理副本 stat 请求。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatRequest {
    /// 物理路径。
    pub physical_path: String,
    /// 逻辑路径。
    pub object_path: String,
    pub resource_hierarchy: String,
}

/// 物理副本 stat 应答。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatReply {
    pub size: i64,
    pub file_type: i32,
    pub mode: i32,
    pub created_at_seconds: i64,
    pub modified_at_seconds: i64,
}

/// 副本目录属性修改请求。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModDataObjMetaRequest {
    pub path: String,
    pub replica_number: Option<i32>,
    pub attributes: KeyVals,
}

/// 外部规则执行请求。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRuleRequest {
    pub rule_text: String,
    pub params: KeyVals,
    pub out_param_desc: String,
}

/// 请求体：连接能力的入参联合。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RequestBody {
    DataObj(DataObjectRequest),
    OpenedDataObj(OpenedDataObjectRequest),
    DataObjCopy(DataObjCopyRequest),
    GenQuery(GenQueryIn),
    GenQuery2(GenQuery2In),
    Collection(CollectionRequest),
    ModAccess(ModAccessRequest),
    ModAvu(ModAvuRequest),
    AtomicMetadata(serde_json::Value),
    GeneralAdmin(GeneralAdminRequest),
    /// JSON 体请求（描述符信息、副本关闭、touch 等）。
    Json(serde_json::Value),
    FileStat(FileStatRequest),
    ModDataObjMeta(ModDataObjMetaRequest),
    ExecRule(ExecRuleRequest),
    Empty,
}

/// 应答体：连接能力的出参联合。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ReplyBody {
    Empty,
    /// 服务端签发的文件描述符。
    Descriptor(i32),
    /// 读/写往返处理的字节数。
    Len(i64),
    /// Seek 后的绝对偏移。
    Offset(i64),
    GenQueryOut(GenQueryReply),
    Json(serde_json::Value),
    Checksum(String),
    Stat(FileStatReply),
}

macro_rules! reply_accessor {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        /// 取出对应变体；变体不匹配返回 [`RodsError::UnexpectedReply`]。
        pub fn $fn_name(self, api: ApiNumber) -> Result<$ty, RodsError> {
            match self {
                Self::$variant(inner) => Ok(inner),
                _ => Err(RodsError::UnexpectedReply { api: api.value() }),
            }
        }
    };
}

impl ReplyBody {
    reply_accessor!(into_descriptor, Descriptor, i32);
    reply_accessor!(into_len, Len, i64);
    reply_accessor!(into_offset, Offset, i64);
    reply_accessor!(into_gen_query, GenQueryOut, GenQueryReply);
    reply_accessor!(into_json, Json, serde_json::Value);
    reply_accessor!(into_checksum, Checksum, String);
    reply_accessor!(into_stat, Stat, FileStatReply);

    /// 断言应答为空体。
    pub fn into_empty(self, api: ApiNumber) -> Result<(), RodsError> {
        match self {
            Self::Empty => Ok(()),
            _ => Err(RodsError::UnexpectedReply { api: api.value() }),
        }
    }
}

/// 描述符信息中与副本访问相关的三元组。
///
/// 重开协议与延迟截断都依赖它；任何字段缺失都会返回
/// [`RodsError::IncompleteReplicaAccessInfo`]。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicaAccessInfo {
    pub replica_token: String,
    pub replica_number: i32,
    pub resource_hierarchy: String,
}

impl ReplicaAccessInfo {
    /// 从 `GET_FILE_DESCRIPTOR_INFO` 的 JSON 应答中提取访问三元组。
    pub fn from_descriptor_info(info: &serde_json::Value) -> Result<Self, RodsError> {
        let replica_token = info
            .get("replica_token")
            .and_then(|v| v.as_str())
            .filter(|token| !token.is_empty())
            .ok_or(RodsError::IncompleteReplicaAccessInfo)?;
        let object_info = info
            .get("data_object_info")
            .ok_or(RodsError::IncompleteReplicaAccessInfo)?;
        let replica_number = object_info
            .get("replica_number")
            .and_then(|v| v.as_i64())
            .ok_or(RodsError::IncompleteReplicaAccessInfo)?;
        let resource_hierarchy = object_info
            .get("resource_hierarchy")
            .and_then(|v| v.as_str())
            .filter(|hier| !hier.is_empty())
            .ok_or(RodsError::IncompleteReplicaAccessInfo)?;
        Ok(Self {
            replica_token: replica_token.to_string(),
            replica_number: replica_number as i32,
            resource_hierarchy: resource_hierarchy.to_string(),
        })
    }
}
