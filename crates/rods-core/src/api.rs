//! 协议常量：API 号、请求关键字与目录列号。
//!
//! 这些值对核心而言是不透明命名常量；连接实现方负责把它们映射到线上
//! 帧头。集中收敛在此避免魔法数散落到数据面各处。

use serde::{Deserialize, Serialize};

/// API 号新类型，区分于普通整数。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiNumber(pub u32);

impl ApiNumber {
    /// 读取原始编号。
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ApiNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub const DATA_OBJ_CREATE: ApiNumber = ApiNumber(601);
pub const DATA_OBJ_OPEN: ApiNumber = ApiNumber(602);
pub const DATA_OBJ_UNLINK: ApiNumber = ApiNumber(615);
pub const MOD_DATA_OBJ_META: ApiNumber = ApiNumber(622);
pub const EXEC_MY_RULE: ApiNumber = ApiNumber(625);
pub const DATA_OBJ_RENAME: ApiNumber = ApiNumber(627);
pub const DATA_OBJ_CHKSUM: ApiNumber = ApiNumber(629);
pub const PHY_PATH_REG: ApiNumber = ApiNumber(631);
pub const DATA_OBJ_TRIM: ApiNumber = ApiNumber(632);
pub const DATA_OBJ_CLOSE: ApiNumber = ApiNumber(673);
pub const DATA_OBJ_LSEEK: ApiNumber = ApiNumber(674);
pub const DATA_OBJ_READ: ApiNumber = ApiNumber(675);
pub const DATA_OBJ_WRITE: ApiNumber = ApiNumber(676);
pub const RM_COLL: ApiNumber = ApiNumber(679);
pub const COLL_CREATE: ApiNumber = ApiNumber(681);
pub const PROC_STAT: ApiNumber = ApiNumber(690);
pub const FILE_STAT: ApiNumber = ApiNumber(692);
pub const DATA_OBJ_COPY: ApiNumber = ApiNumber(696);
pub const GENERAL_ADMIN: ApiNumber = ApiNumber(701);
pub const GEN_QUERY: ApiNumber = ApiNumber(702);
pub const MOD_AVU_METADATA: ApiNumber = ApiNumber(706);
pub const MOD_ACCESS_CONTROL: ApiNumber = ApiNumber(707);
pub const REPLICA_TRUNCATE: ApiNumber = ApiNumber(802);
pub const GENQUERY2: ApiNumber = ApiNumber(10221);
pub const GET_FILE_DESCRIPTOR_INFO: ApiNumber = ApiNumber(20000);
pub const ATOMIC_APPLY_METADATA: ApiNumber = ApiNumber(20002);
pub const REPLICA_CLOSE: ApiNumber = ApiNumber(20004);
pub const TOUCH: ApiNumber = ApiNumber(20007);

/// 请求关键字（键值对选项的键名）。
pub mod keywords {
    pub const ADMIN_KW: &str = "irodsAdmin";
    pub const RECURSIVE_OPR_KW: &str = "recursiveOpr";
    pub const FORCE_FLAG_KW: &str = "forceFlag";
    pub const DATA_TYPE_KW: &str = "dataType";
    pub const DEST_RESC_NAME_KW: &str = "destRescName";
    pub const RESC_HIER_STR_KW: &str = "resc_hier";
    pub const REPLICA_TOKEN_KW: &str = "replicaToken";
    pub const REG_REPL_KW: &str = "regRepl";
    pub const FILE_PATH_KW: &str = "filePath";
    pub const COLLECTION_KW: &str = "collection";
    pub const DATA_SIZE_KW: &str = "dataSize";
    pub const CHKSUM_KW: &str = "chksum";
    pub const REPLICA_NUMBER_KW: &str = "replNum";
    pub const SECONDS_SINCE_EPOCH_KW: &str = "seconds_since_epoch";
    pub const ZONE_KW: &str = "zone";
}

/// 目录列号新类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnId(pub u32);

impl ColumnId {
    /// 读取原始列号。
    pub const fn value(self) -> u32 {
        self.0
    }
}

/// 目录列号常量，按实体分组。
pub mod columns {
    use super::ColumnId;

    // 数据对象与副本。
    pub const COL_D_DATA_ID: ColumnId = ColumnId(401);
    pub const COL_D_COLL_ID: ColumnId = ColumnId(402);
    pub const COL_DATA_NAME: ColumnId = ColumnId(403);
    pub const COL_DATA_REPL_NUM: ColumnId = ColumnId(404);
    pub const COL_DATA_TYPE_NAME: ColumnId = ColumnId(406);
    pub const COL_DATA_SIZE: ColumnId = ColumnId(407);
    pub const COL_D_RESC_NAME: ColumnId = ColumnId(409);
    pub const COL_D_DATA_PATH: ColumnId = ColumnId(410);
    pub const COL_D_OWNER_NAME: ColumnId = ColumnId(411);
    pub const COL_D_OWNER_ZONE: ColumnId = ColumnId(412);
    pub const COL_D_REPL_STATUS: ColumnId = ColumnId(413);
    pub const COL_D_DATA_CHECKSUM: ColumnId = ColumnId(415);
    pub const COL_D_CREATE_TIME: ColumnId = ColumnId(419);
    pub const COL_D_MODIFY_TIME: ColumnId = ColumnId(420);
    pub const COL_D_RESC_HIER: ColumnId = ColumnId(422);

    // 集合。
    pub const COL_COLL_ID: ColumnId = ColumnId(500);
    pub const COL_COLL_NAME: ColumnId = ColumnId(501);
    pub const COL_COLL_PARENT_NAME: ColumnId = ColumnId(502);
    pub const COL_COLL_OWNER_NAME: ColumnId = ColumnId(503);
    pub const COL_COLL_OWNER_ZONE: ColumnId = ColumnId(504);
    pub const COL_COLL_INHERITANCE: ColumnId = ColumnId(506);
    pub const COL_COLL_CREATE_TIME: ColumnId = ColumnId(508);
    pub const COL_COLL_MODIFY_TIME: ColumnId = ColumnId(509);

    // 用户。
    pub const COL_USER_ID: ColumnId = ColumnId(201);
    pub const COL_USER_NAME: ColumnId = ColumnId(202);
    pub const COL_USER_TYPE: ColumnId = ColumnId(203);
    pub const COL_USER_ZONE: ColumnId = ColumnId(204);

    // 资源。
    pub const COL_R_RESC_ID: ColumnId = ColumnId(301);
    pub const COL_R_RESC_NAME: ColumnId = ColumnId(302);
    pub const COL_R_ZONE_NAME: ColumnId = ColumnId(303);
    pub const COL_R_TYPE_NAME: ColumnId = ColumnId(304);
    pub const COL_R_LOC: ColumnId = ColumnId(306);
    pub const COL_R_VAULT_PATH: ColumnId = ColumnId(307);
    pub const COL_R_RESC_CONTEXT: ColumnId = ColumnId(315);

    // 元数据三元组。
    pub const COL_META_DATA_ATTR_NAME: ColumnId = ColumnId(600);
    pub const COL_META_DATA_ATTR_VALUE: ColumnId = ColumnId(601);
    pub const COL_META_DATA_ATTR_UNITS: ColumnId = ColumnId(602);
    pub const COL_META_COLL_ATTR_NAME: ColumnId = ColumnId(610);
    pub const COL_META_COLL_ATTR_VALUE: ColumnId = ColumnId(611);
    pub const COL_META_COLL_ATTR_UNITS: ColumnId = ColumnId(612);
    pub const COL_META_RESC_ATTR_NAME: ColumnId = ColumnId(630);
    pub const COL_META_RESC_ATTR_VALUE: ColumnId = ColumnId(631);
    pub const COL_META_RESC_ATTR_UNITS: ColumnId = ColumnId(632);
    pub const COL_META_USER_ATTR_NAME: ColumnId = ColumnId(640);
    pub const COL_META_USER_ATTR_VALUE: ColumnId = ColumnId(641);
    pub const COL_META_USER_ATTR_UNITS: ColumnId = ColumnId(642);

    // 访问控制。
    pub const COL_DATA_ACCESS_TYPE: ColumnId = ColumnId(613);
    pub const COL_DATA_ACCESS_NAME: ColumnId = ColumnId(614);
    pub const COL_DATA_ACCESS_USER_ID: ColumnId = ColumnId(616);
    pub const COL_COLL_ACCESS_TYPE: ColumnId = ColumnId(710);
    pub const COL_COLL_ACCESS_NAME: ColumnId = ColumnId(711);
}
