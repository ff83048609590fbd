//! 目录读取器：把分页查询的行装配为目录数据模型。

use crate::facade::Client;
use crate::query::builder::Condition;
use crate::query::result::{QueryResult, Row};
use rods_core::api::columns::*;
use rods_core::contract::CallContext;
use rods_core::error::RodsError;
use rods_core::message::{FileStatRequest, FileStatReply, RequestBody};
use rods_core::path;
use rods_core::types::{Access, Collection, DataObject, Metadata, ObjectType, Replica, Resource, User};
use std::collections::HashMap;

/// 访问类型令牌到级别名的映射；未知令牌原样透出。
fn access_token_to_level(token: &str) -> String {
    match token.trim() {
        "1000" => "null".to_string(),
        "1050" => "read".to_string(),
        "1120" => "write".to_string(),
        "1200" => "own".to_string(),
        other => other.to_string(),
    }
}

async fn drain(result: QueryResult) -> Result<Vec<Row>, RodsError> {
    result.collect_rows().await
}

/// 集合查询的选择列（不含路径本身）。
const COLLECTION_SELECTS: [rods_core::api::ColumnId; 6] = [
    COL_COLL_ID,
    COL_COLL_OWNER_NAME,
    COL_COLL_OWNER_ZONE,
    COL_COLL_CREATE_TIME,
    COL_COLL_MODIFY_TIME,
    COL_COLL_INHERITANCE,
];

fn collection_from_row(row: &Row, coll_path: String) -> Result<Collection, RodsError> {
    Ok(Collection {
        id: row.get(0)?,
        path: coll_path,
        owner: row.get(1)?,
        zone: row.get(2)?,
        created_at: row.get(3)?,
        modified_at: row.get(4)?,
        inherit: row.get::<String>(5)? == "1",
    })
}

/// 数据对象查询的选择列；对象与副本列合并在同一行里。
const DATA_OBJECT_SELECTS: [rods_core::api::ColumnId; 16] = [
    COL_D_DATA_ID,
    COL_D_COLL_ID,
    COL_COLL_NAME,
    COL_DATA_NAME,
    COL_DATA_TYPE_NAME,
    COL_DATA_REPL_NUM,
    COL_DATA_SIZE,
    COL_D_OWNER_NAME,
    COL_D_OWNER_ZONE,
    COL_D_DATA_CHECKSUM,
    COL_D_REPL_STATUS,
    COL_D_RESC_NAME,
    COL_D_DATA_PATH,
    COL_D_RESC_HIER,
    COL_D_CREATE_TIME,
    COL_D_MODIFY_TIME,
];

/// 把副本行归并为数据对象序列；对象按路径字典序、副本按副本号排序。
fn data_objects_from_rows(rows: &[Row]) -> Result<Vec<DataObject>, RodsError> {
    let mut objects: Vec<DataObject> = Vec::new();
    let mut index_by_id: HashMap<i64, usize> = HashMap::new();
    for row in rows {
        let id: i64 = row.get(0)?;
        let replica = Replica {
            number: row.get(5)?,
            size: row.get(6)?,
            owner: row.get(7)?,
            owner_zone: row.get(8)?,
            checksum: row.get(9)?,
            status: row.get(10)?,
            resource_name: row.get(11)?,
            physical_path: row.get(12)?,
            resource_hierarchy: row.get(13)?,
            created_at: row.get(14)?,
            modified_at: row.get(15)?,
        };
        match index_by_id.get(&id) {
            Some(&index) => objects[index].replicas.push(replica),
            None => {
                let coll_path: String = row.get(2)?;
                let name: String = row.get(3)?;
                index_by_id.insert(id, objects.len());
                objects.push(DataObject {
                    id,
                    collection_id: row.get(1)?,
                    path: path::join(&coll_path, &name),
                    data_type: row.get(4)?,
                    replicas: vec![replica],
                });
            }
        }
    }
    for object in &mut objects {
        object.replicas.sort_by_key(|replica| replica.number);
    }
    objects.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(objects)
}

impl Client {
    /// 按绝对路径取集合。
    pub async fn get_collection(
        &self,
        ctx: &CallContext,
        coll_path: &str,
    ) -> Result<Collection, RodsError> {
        let coll_path = path::clean(coll_path);
        let row = self
            .query(COLLECTION_SELECTS.to_vec())
            .with([Condition::equal(COL_COLL_NAME, &coll_path)])
            .fetch_row(ctx)
            .await?;
        collection_from_row(&row, coll_path)
    }

    /// 集合是否存在。
    pub async fn exists_collection(
        &self,
        ctx: &CallContext,
        coll_path: &str,
    ) -> Result<bool, RodsError> {
        match self.get_collection(ctx, coll_path).await {
            Ok(_) => Ok(true),
            Err(RodsError::NoRowFound) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// 列出直接子集合。
    pub async fn list_sub_collections(
        &self,
        ctx: &CallContext,
        parent_path: &str,
    ) -> Result<Vec<Collection>, RodsError> {
        let parent_path = path::clean(parent_path);
        self.list_sub_collections_where(ctx, [Condition::equal(COL_COLL_PARENT_NAME, &parent_path)])
            .await
    }

    /// 以任意条件组合列出子集合（遍历器与 glob 的批式入口）。
    pub(crate) async fn list_sub_collections_where(
        &self,
        ctx: &CallContext,
        conditions: impl IntoIterator<Item = Condition>,
    ) -> Result<Vec<Collection>, RodsError> {
        let mut selects = COLLECTION_SELECTS.to_vec();
        selects.push(COL_COLL_NAME);
        let result = self
            .query(selects)
            .with(conditions)
            .execute(ctx)
            .await?;
        let rows = drain(result).await?;
        rows.iter()
            .map(|row| {
                let coll_path: String = row.get(6)?;
                collection_from_row(row, coll_path)
            })
            .collect()
    }

    /// 按绝对路径取数据对象（含全部副本）。
    pub async fn get_data_object(
        &self,
        ctx: &CallContext,
        obj_path: &str,
    ) -> Result<DataObject, RodsError> {
        let (dir, name) = path::split(obj_path);
        let result = self
            .query(DATA_OBJECT_SELECTS.to_vec())
            .with([
                Condition::equal(COL_COLL_NAME, &dir),
                Condition::equal(COL_DATA_NAME, &name),
            ])
            .execute(ctx)
            .await?;
        let rows = drain(result).await?;
        data_objects_from_rows(&rows)?
            .into_iter()
            .next()
            .ok_or(RodsError::NoRowFound)
    }

    /// 数据对象是否存在。
    pub async fn exists_data_object(
        &self,
        ctx: &CallContext,
        obj_path: &str,
    ) -> Result<bool, RodsError> {
        match self.get_data_object(ctx, obj_path).await {
            Ok(_) => Ok(true),
            Err(RodsError::NoRowFound) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// 列出集合内的数据对象，按名字典序。
    pub async fn list_data_objects(
        &self,
        ctx: &CallContext,
        coll_path: &str,
    ) -> Result<Vec<DataObject>, RodsError> {
        let coll_path = path::clean(coll_path);
        self.list_data_objects_where(ctx, [Condition::equal(COL_COLL_NAME, &coll_path)])
            .await
    }

    /// 以集合 ID 集列出数据对象（遍历器的联接优化入口）。
    pub(crate) async fn list_data_objects_by_collection_ids(
        &self,
        ctx: &CallContext,
        collection_ids: &[i64],
    ) -> Result<Vec<DataObject>, RodsError> {
        if collection_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = collection_ids.iter().map(i64::to_string).collect();
        self.list_data_objects_where(ctx, [Condition::in_list(COL_D_COLL_ID, &ids)])
            .await
    }

    pub(crate) async fn list_data_objects_where(
        &self,
        ctx: &CallContext,
        conditions: impl IntoIterator<Item = Condition>,
    ) -> Result<Vec<DataObject>, RodsError> {
        let result = self
            .query(DATA_OBJECT_SELECTS.to_vec())
            .with(conditions)
            .execute(ctx)
            .await?;
        let rows = drain(result).await?;
        data_objects_from_rows(&rows)
    }

    /// 按名取存储资源。
    pub async fn get_resource(
        &self,
        ctx: &CallContext,
        name: &str,
    ) -> Result<Resource, RodsError> {
        let row = self
            .query(vec![
                COL_R_RESC_ID,
                COL_R_ZONE_NAME,
                COL_R_TYPE_NAME,
                COL_R_LOC,
                COL_R_VAULT_PATH,
                COL_R_RESC_CONTEXT,
            ])
            .with([Condition::equal(COL_R_RESC_NAME, name)])
            .fetch_row(ctx)
            .await?;
        Ok(Resource {
            id: row.get(0)?,
            name: name.to_string(),
            zone: row.get(1)?,
            kind: row.get(2)?,
            location: row.get(3)?,
            vault_path: row.get(4)?,
            context: row.get(5)?,
        })
    }

    /// 按 `name#zone` 取用户；缺省 zone 回退到门面的 zone。
    pub async fn get_user(&self, ctx: &CallContext, user_spec: &str) -> Result<User, RodsError> {
        let spec = path::UserSpec::parse(user_spec, self.zone());
        let row = self
            .query(vec![COL_USER_ID, COL_USER_TYPE])
            .with([
                Condition::equal(COL_USER_NAME, &spec.name),
                Condition::equal(COL_USER_ZONE, &spec.zone),
            ])
            .fetch_row(ctx)
            .await?;
        Ok(User {
            id: row.get(0)?,
            name: spec.name,
            zone: spec.zone,
            kind: row.get(1)?,
        })
    }

    /// 列出实体上的元数据三元组。
    pub async fn list_metadata(
        &self,
        ctx: &CallContext,
        object_type: ObjectType,
        target: &str,
    ) -> Result<Vec<Metadata>, RodsError> {
        let query = match object_type {
            ObjectType::DataObject => {
                let (dir, name) = path::split(target);
                self.query(vec![
                    COL_META_DATA_ATTR_NAME,
                    COL_META_DATA_ATTR_VALUE,
                    COL_META_DATA_ATTR_UNITS,
                ])
                .with([
                    Condition::equal(COL_COLL_NAME, &dir),
                    Condition::equal(COL_DATA_NAME, &name),
                ])
            }
            ObjectType::Collection => self
                .query(vec![
                    COL_META_COLL_ATTR_NAME,
                    COL_META_COLL_ATTR_VALUE,
                    COL_META_COLL_ATTR_UNITS,
                ])
                .with([Condition::equal(COL_COLL_NAME, &path::clean(target))]),
            ObjectType::Resource => self
                .query(vec![
                    COL_META_RESC_ATTR_NAME,
                    COL_META_RESC_ATTR_VALUE,
                    COL_META_RESC_ATTR_UNITS,
                ])
                .with([Condition::equal(COL_R_RESC_NAME, target)]),
            ObjectType::User => {
                let spec = path::UserSpec::parse(target, self.zone());
                self.query(vec![
                    COL_META_USER_ATTR_NAME,
                    COL_META_USER_ATTR_VALUE,
                    COL_META_USER_ATTR_UNITS,
                ])
                .with([Condition::equal(COL_USER_NAME, &spec.name)])
            }
        };
        let rows = drain(query.execute(ctx).await?).await?;
        rows.iter()
            .map(|row| {
                Ok(Metadata {
                    name: row.get(0)?,
                    value: row.get(1)?,
                    units: row.get(2)?,
                })
            })
            .collect()
    }

    /// 列出实体上的访问控制项。
    pub async fn list_access(
        &self,
        ctx: &CallContext,
        object_type: ObjectType,
        target: &str,
    ) -> Result<Vec<Access>, RodsError> {
        let query = match object_type {
            ObjectType::DataObject => {
                let (dir, name) = path::split(target);
                self.query(vec![COL_DATA_ACCESS_TYPE, COL_DATA_ACCESS_NAME])
                    .with([
                        Condition::equal(COL_COLL_NAME, &dir),
                        Condition::equal(COL_DATA_NAME, &name),
                    ])
            }
            ObjectType::Collection => self
                .query(vec![COL_COLL_ACCESS_TYPE, COL_COLL_ACCESS_NAME])
                .with([Condition::equal(COL_COLL_NAME, &path::clean(target))]),
            _ => {
                return Err(RodsError::Parse {
                    value: target.to_string(),
                    target: "access target (collection or data object)",
                });
            }
        };
        let rows = drain(query.execute(ctx).await?).await?;
        rows.iter()
            .map(|row| {
                Ok(Access {
                    level: access_token_to_level(&row.get::<String>(0)?),
                    user: row.get(1)?,
                })
            })
            .collect()
    }

    /// 对好副本的物理文件做 stat（管理员操作）。
    pub async fn stat_physical_replica(
        &self,
        ctx: &CallContext,
        obj_path: &str,
    ) -> Result<FileStatReply, RodsError> {
        self.require_admin()?;
        let object = self.get_data_object(ctx, obj_path).await?;
        let replica = object.current_replica().ok_or(RodsError::NoRowFound)?;
        let request = FileStatRequest {
            physical_path: replica.physical_path.clone(),
            object_path: object.path.clone(),
            resource_hierarchy: replica.resource_hierarchy.clone(),
        };
        let reply = self
            .exec(ctx, rods_core::api::FILE_STAT, RequestBody::FileStat(request))
            .await?;
        reply.into_stat(rods_core::api::FILE_STAT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rods_core::types::parse_catalog_time;

    #[test]
    fn access_tokens_map_to_levels() {
        assert_eq!(access_token_to_level("1050"), "read");
        assert_eq!(access_token_to_level("1200"), "own");
        assert_eq!(access_token_to_level("9999"), "9999");
    }

    #[test]
    fn replica_rows_merge_into_single_object() {
        let row = |repl_num: &str, status: &str| {
            Row::from_values(vec![
                "11".into(),            // data id
                "7".into(),             // coll id
                "/tempZone/home".into(), // coll path
                "a.dat".into(),         // name
                "generic".into(),       // data type
                repl_num.into(),        // replica number
                "300".into(),           // size
                "alice".into(),
                "tempZone".into(),
                String::new(),          // checksum
                status.into(),          // replica status
                "demoResc".into(),
                "/vault/a.dat".into(),
                "demoResc".into(),
                "100".into(),
                "200".into(),
            ])
        };
        let objects =
            data_objects_from_rows(&[row("1", "1"), row("0", "0")]).expect("行应可归并");
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].path, "/tempZone/home/a.dat");
        assert_eq!(objects[0].replicas.len(), 2);
        assert_eq!(objects[0].replicas[0].number, 0, "副本应按副本号排序");
        assert_eq!(
            objects[0].modified_at(),
            Some(parse_catalog_time("200")),
            "修改时间来自好副本"
        );
    }
}
