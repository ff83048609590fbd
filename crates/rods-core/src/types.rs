//! 目录数据模型：集合、数据对象、副本、资源、用户、元数据与访问项。
//!
//! 这些记录都是纯值，不携带共享状态；查询层从列值逐行装配它们。

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 目录实体类别。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectType {
    User,
    Collection,
    DataObject,
    Resource,
}

impl ObjectType {
    /// `imeta` 风格的实体标志位（`-u`/`-C`/`-d`/`-R`）。
    pub fn item_flag(self) -> &'static str {
        match self {
            Self::User => "-u",
            Self::Collection => "-C",
            Self::DataObject => "-d",
            Self::Resource => "-R",
        }
    }
}

/// 访问级别。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessLevel {
    Null,
    Read,
    Write,
    Own,
}

impl AccessLevel {
    /// 协议使用的级别名。
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Read => "read",
            Self::Write => "write",
            Self::Own => "own",
        }
    }
}

/// 集合：目录式分组，路径为绝对路径。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: i64,
    pub path: String,
    pub owner: String,
    pub zone: String,
    pub created_at: SystemTime,
    pub modified_at: SystemTime,
    pub inherit: bool,
}

impl Collection {
    /// 集合名（路径最后一段）。
    pub fn name(&self) -> &str {
        crate::path::base_name(&self.path)
    }
}

/// 副本：数据对象在某个存储资源上的一份物理拷贝。
///
/// `status` 为 `"1"` 表示好副本（最新）；其余状态视为陈旧，尺寸与
/// 校验和比较一律忽略陈旧副本。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    pub number: i32,
    pub size: i64,
    pub owner: String,
    pub owner_zone: String,
    pub checksum: String,
    pub status: String,
    pub resource_name: String,
    pub physical_path: String,
    pub resource_hierarchy: String,
    pub created_at: SystemTime,
    pub modified_at: SystemTime,
}

/// `sha2:` 前缀的 base64 校验和拆分结果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sha2Checksum<'a> {
    pub base64: &'a str,
}

impl Replica {
    /// 是否为好副本。
    pub fn is_current(&self) -> bool {
        self.status == "1"
    }

    /// 解析 `sha2:<base64>` 形式的校验和；其他格式返回 `None`。
    pub fn sha2_checksum(&self) -> Option<Sha2Checksum<'_>> {
        self.checksum
            .strip_prefix("sha2:")
            .filter(|rest| !rest.is_empty())
            .map(|base64| Sha2Checksum { base64 })
    }
}

/// 数据对象：按路径标识的文件，携带有序副本序列。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataObject {
    pub id: i64,
    pub collection_id: i64,
    pub path: String,
    pub data_type: String,
    pub replicas: Vec<Replica>,
}

impl DataObject {
    /// 对象名（路径最后一段）。
    pub fn name(&self) -> &str {
        crate::path::base_name(&self.path)
    }

    /// 第一个好副本。
    pub fn current_replica(&self) -> Option<&Replica> {
        self.replicas.iter().find(|replica| replica.is_current())
    }

    /// 逻辑尺寸：任一好副本的尺寸；没有好副本时回退到首个副本。
    pub fn size(&self) -> i64 {
        self.current_replica()
            .or_else(|| self.replicas.first())
            .map(|replica| replica.size)
            .unwrap_or(0)
    }

    /// 好副本的修改时间。
    pub fn modified_at(&self) -> Option<SystemTime> {
        self.current_replica().map(|replica| replica.modified_at)
    }
}

/// 存储资源的扁平记录。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: i64,
    pub name: String,
    pub zone: String,
    pub kind: String,
    pub location: String,
    pub vault_path: String,
    pub context: String,
}

/// 用户或用户组的扁平记录。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub zone: String,
    pub kind: String,
}

impl User {
    /// 是否为用户组。
    pub fn is_group(&self) -> bool {
        self.kind == "rodsgroup"
    }
}

/// 元数据三元组。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub value: String,
    pub units: String,
}

/// 访问控制项。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    pub level: String,
    pub user: String,
}

/// 解析目录时间串（unix 秒）；`"0"` 或负数映射为零时间（epoch）。
pub fn parse_catalog_time(value: &str) -> SystemTime {
    match value.trim().parse::<i64>() {
        Ok(seconds) if seconds > 0 => UNIX_EPOCH + Duration::from_secs(seconds as u64),
        _ => UNIX_EPOCH,
    }
}

/// 把时间折算为整秒的 unix 时间戳；epoch 之前一律折算为 0。
pub fn unix_seconds(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_time_zero_and_negative_map_to_epoch() {
        assert_eq!(parse_catalog_time("0"), UNIX_EPOCH);
        assert_eq!(parse_catalog_time("-5"), UNIX_EPOCH);
        assert_eq!(parse_catalog_time("garbage"), UNIX_EPOCH);
        assert_eq!(
            parse_catalog_time("1700000000"),
            UNIX_EPOCH + Duration::from_secs(1_700_000_000)
        );
    }

    #[test]
    fn data_object_size_ignores_stale_replicas() {
        let stale = Replica {
            number: 0,
            size: 10,
            owner: "alice".into(),
            owner_zone: "tempZone".into(),
            checksum: String::new(),
            status: "0".into(),
            resource_name: "demoResc".into(),
            physical_path: "/vault/a".into(),
            resource_hierarchy: "demoResc".into(),
            created_at: UNIX_EPOCH,
            modified_at: UNIX_EPOCH,
        };
        let good = Replica {
            number: 1,
            size: 42,
            status: "1".into(),
            checksum: "sha2:q83v".into(),
            ..stale.clone()
        };
        let object = DataObject {
            id: 1,
            collection_id: 2,
            path: "/tempZone/home/alice/a.dat".into(),
            data_type: "generic".into(),
            replicas: vec![stale, good],
        };
        assert_eq!(object.size(), 42);
        let current = object.current_replica().expect("应存在好副本");
        assert_eq!(current.sha2_checksum().map(|c| c.base64), Some("q83v"));
    }
}
