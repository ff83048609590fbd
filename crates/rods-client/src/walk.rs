//! 层级遍历器：按层批式下探目录树，父先于子、对象名字典序。

use crate::facade::Client;
use crate::query::builder::Condition;
use rods_core::api::columns::*;
use rods_core::contract::CallContext;
use rods_core::error::RodsError;
use rods_core::path;
use rods_core::types::{Access, Collection, DataObject, Metadata, ObjectType};
use async_trait::async_trait;
use std::collections::HashMap;

/// 服务端 `IN (…)` 子句的条件串长度上限；超出的父集合切到下一批。
const CONDITION_LENGTH_LIMIT: usize = 14_000;

/// 回调对遍历的控制码。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkDecision {
    /// 继续下探。
    Continue,
    /// 终止整个遍历。
    SkipAll,
    /// 剪掉当前父集合的所有后代。
    SkipDir,
    /// 直接子集合按空集合对待（仍然上报，但不再向内查询）。
    SkipSubDirs,
}

/// 遍历选项。
#[derive(Clone, Copy, Debug, Default)]
pub struct WalkOptions {
    /// 随层级批量预取元数据。
    pub prefetch_metadata: bool,
    /// 随层级批量预取访问控制。
    pub prefetch_access: bool,
}

/// 随回调携带的预取结果；未开启预取时为空。
#[derive(Clone, Debug, Default)]
pub struct WalkExtras {
    pub metadata: Vec<Metadata>,
    pub access: Vec<Access>,
}

/// 遍历回调。
#[async_trait]
pub trait WalkVisitor: Send {
    /// 访问集合；父集合先于其任何后代被访问。
    async fn collection(
        &mut self,
        collection: &Collection,
        extras: &WalkExtras,
    ) -> Result<WalkDecision, RodsError>;

    /// 访问数据对象；同一集合内按名字典序。
    async fn data_object(
        &mut self,
        object: &DataObject,
        extras: &WalkExtras,
    ) -> Result<WalkDecision, RodsError>;
}

struct LevelEntry {
    coll: Collection,
    /// 为假时本集合的子集合只上报不下探（`SkipSubDirs` 语义）。
    descend: bool,
}

#[derive(Default)]
struct PrefetchMaps {
    data_metadata: HashMap<i64, Vec<Metadata>>,
    data_access: HashMap<i64, Vec<Access>>,
    coll_metadata: HashMap<i64, Vec<Metadata>>,
    coll_access: HashMap<i64, Vec<Access>>,
}

impl PrefetchMaps {
    fn data_extras(&self, id: i64) -> WalkExtras {
        WalkExtras {
            metadata: self.data_metadata.get(&id).cloned().unwrap_or_default(),
            access: self.data_access.get(&id).cloned().unwrap_or_default(),
        }
    }

    fn coll_extras(&self, id: i64) -> WalkExtras {
        WalkExtras {
            metadata: self.coll_metadata.get(&id).cloned().unwrap_or_default(),
            access: self.coll_access.get(&id).cloned().unwrap_or_default(),
        }
    }
}

/// 把一层的父集合切成条件串长度不超上限的批；含单引号的路径独立成批，
/// 用 `=` 替代 `IN`。
fn make_batches(level: &[LevelEntry]) -> Vec<Vec<&Collection>> {
    let mut batches: Vec<Vec<&Collection>> = Vec::new();
    let mut current: Vec<&Collection> = Vec::new();
    let mut current_len = 0;
    for entry in level {
        let coll = &entry.coll;
        if coll.path.contains('\'') {
            batches.push(vec![coll]);
            continue;
        }
        let cost = coll.path.len() + 4;
        if !current.is_empty() && current_len + cost > CONDITION_LENGTH_LIMIT {
            batches.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push(coll);
        current_len += cost;
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn parent_condition(batch: &[&Collection]) -> Condition {
    if batch.len() == 1 {
        Condition::equal(COL_COLL_PARENT_NAME, &batch[0].path)
    } else {
        Condition::in_list(COL_COLL_PARENT_NAME, batch.iter().map(|coll| coll.path.as_str()))
    }
}

async fn prefetch_for_batch(
    ctx: &CallContext,
    client: &Client,
    batch: &[&Collection],
    collection_ids: &[i64],
    options: WalkOptions,
    maps: &mut PrefetchMaps,
) -> Result<(), RodsError> {
    let ids: Vec<String> = collection_ids.iter().map(i64::to_string).collect();
    if options.prefetch_metadata {
        let rows = client
            .query(vec![
                COL_D_DATA_ID,
                COL_META_DATA_ATTR_NAME,
                COL_META_DATA_ATTR_VALUE,
                COL_META_DATA_ATTR_UNITS,
            ])
            .with([Condition::in_list(COL_D_COLL_ID, &ids)])
            .execute(ctx)
            .await?
            .collect_rows()
            .await?;
        for row in rows {
            maps.data_metadata
                .entry(row.get(0)?)
                .or_default()
                .push(Metadata {
                    name: row.get(1)?,
                    value: row.get(2)?,
                    units: row.get(3)?,
                });
        }
        let rows = client
            .query(vec![
                COL_COLL_ID,
                COL_META_COLL_ATTR_NAME,
                COL_META_COLL_ATTR_VALUE,
                COL_META_COLL_ATTR_UNITS,
            ])
            .with([parent_condition(batch)])
            .execute(ctx)
            .await?
            .collect_rows()
            .await?;
        for row in rows {
            maps.coll_metadata
                .entry(row.get(0)?)
                .or_default()
                .push(Metadata {
                    name: row.get(1)?,
                    value: row.get(2)?,
                    units: row.get(3)?,
                });
        }
    }
    if options.prefetch_access {
        let rows = client
            .query(vec![COL_D_DATA_ID, COL_DATA_ACCESS_TYPE, COL_DATA_ACCESS_NAME])
            .with([Condition::in_list(COL_D_COLL_ID, &ids)])
            .execute(ctx)
            .await?
            .collect_rows()
            .await?;
        for row in rows {
            maps.data_access.entry(row.get(0)?).or_default().push(Access {
                level: row.get(1)?,
                user: row.get(2)?,
            });
        }
        let rows = client
            .query(vec![COL_COLL_ID, COL_COLL_ACCESS_TYPE, COL_COLL_ACCESS_NAME])
            .with([parent_condition(batch)])
            .execute(ctx)
            .await?
            .collect_rows()
            .await?;
        for row in rows {
            maps.coll_access.entry(row.get(0)?).or_default().push(Access {
                level: row.get(1)?,
                user: row.get(2)?,
            });
        }
    }
    Ok(())
}

async fn root_extras(
    ctx: &CallContext,
    client: &Client,
    root: &Collection,
    options: WalkOptions,
) -> Result<WalkExtras, RodsError> {
    let mut extras = WalkExtras::default();
    if options.prefetch_metadata {
        extras.metadata = client
            .list_metadata(ctx, ObjectType::Collection, &root.path)
            .await?;
    }
    if options.prefetch_access {
        extras.access = client
            .list_access(ctx, ObjectType::Collection, &root.path)
            .await?;
    }
    Ok(extras)
}

/// 以集合为根广度优先遍历目录层级。
///
/// # 契约说明（What）
/// - 父集合先于其任何后代被访问；同一集合内的数据对象按名字典序；
///   兄弟集合之间的顺序不作保证；
/// - 不同集合的对象可能跨批交错，但不会先于其父集合的回调出现；
/// - 回调控制码语义见 [`WalkDecision`]；回调返回错误立即终止遍历。
pub async fn walk(
    ctx: &CallContext,
    client: &Client,
    root: &str,
    options: WalkOptions,
    visitor: &mut dyn WalkVisitor,
) -> Result<(), RodsError> {
    let root_coll = client.get_collection(ctx, root).await?;
    let extras = root_extras(ctx, client, &root_coll, options).await?;
    let level = match visitor.collection(&root_coll, &extras).await? {
        WalkDecision::SkipAll | WalkDecision::SkipDir => return Ok(()),
        WalkDecision::Continue => vec![LevelEntry {
            coll: root_coll,
            descend: true,
        }],
        WalkDecision::SkipSubDirs => vec![LevelEntry {
            coll: root_coll,
            descend: false,
        }],
    };
    run_levels(ctx, client, level, options, visitor).await
}

async fn run_levels(
    ctx: &CallContext,
    client: &Client,
    mut level: Vec<LevelEntry>,
    options: WalkOptions,
    visitor: &mut dyn WalkVisitor,
) -> Result<(), RodsError> {
    while !level.is_empty() {
        ctx.ensure_active()?;
        let mut subcolls: HashMap<String, Vec<Collection>> = HashMap::new();
        let mut objects: HashMap<i64, Vec<DataObject>> = HashMap::new();
        let mut maps = PrefetchMaps::default();

        for batch in make_batches(&level) {
            let found = client
                .list_sub_collections_where(ctx, [parent_condition(&batch)])
                .await?;
            for coll in found {
                subcolls
                    .entry(path::parent(&coll.path))
                    .or_default()
                    .push(coll);
            }
            let collection_ids: Vec<i64> = batch.iter().map(|coll| coll.id).collect();
            let found = client
                .list_data_objects_by_collection_ids(ctx, &collection_ids)
                .await?;
            for object in found {
                objects.entry(object.collection_id).or_default().push(object);
            }
            prefetch_for_batch(ctx, client, &batch, &collection_ids, options, &mut maps).await?;
        }

        let mut next_level: Vec<LevelEntry> = Vec::new();
        for entry in &level {
            // 对象先于子集合；查询装配时已按路径字典序排好。
            let entry_objects = objects.remove(&entry.coll.id).unwrap_or_default();
            let mut schedule_subcolls = entry.descend;
            let mut prune_rest = false;
            for object in &entry_objects {
                let extras = maps.data_extras(object.id);
                match visitor.data_object(object, &extras).await? {
                    WalkDecision::Continue => {}
                    WalkDecision::SkipAll => return Ok(()),
                    WalkDecision::SkipDir => {
                        prune_rest = true;
                        break;
                    }
                    WalkDecision::SkipSubDirs => schedule_subcolls = false,
                }
            }
            if prune_rest {
                continue;
            }
            let entry_subcolls = subcolls.remove(&entry.coll.path).unwrap_or_default();
            for sub in entry_subcolls {
                let extras = maps.coll_extras(sub.id);
                match visitor.collection(&sub, &extras).await? {
                    WalkDecision::Continue => {
                        if schedule_subcolls {
                            next_level.push(LevelEntry {
                                coll: sub,
                                descend: true,
                            });
                        }
                    }
                    WalkDecision::SkipAll => return Ok(()),
                    WalkDecision::SkipDir => {}
                    WalkDecision::SkipSubDirs => {
                        if schedule_subcolls {
                            next_level.push(LevelEntry {
                                coll: sub,
                                descend: false,
                            });
                        }
                    }
                }
            }
        }
        level = next_level;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn coll(id: i64, coll_path: &str) -> LevelEntry {
        LevelEntry {
            coll: Collection {
                id,
                path: coll_path.to_string(),
                owner: "alice".into(),
                zone: "tempZone".into(),
                created_at: UNIX_EPOCH,
                modified_at: UNIX_EPOCH,
                inherit: false,
            },
            descend: true,
        }
    }

    #[test]
    fn quoted_paths_become_singleton_batches() {
        let level = vec![coll(1, "/a"), coll(2, "/it's"), coll(3, "/b")];
        let batches = make_batches(&level);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].path, "/it's");
        assert_eq!(batches[1].len(), 2);
        let cond = parent_condition(&batches[0]);
        assert!(cond.fragment.starts_with("= '"), "单引号路径应使用 = 条件");
    }

    #[test]
    fn batches_respect_length_cap() {
        let long: Vec<LevelEntry> = (0..200)
            .map(|i| coll(i, &format!("/very/long/collection/path/number/{i:0>120}")))
            .collect();
        let batches = make_batches(&long);
        assert!(batches.len() > 1, "超上限的层应被切批");
        for batch in &batches {
            let total: usize = batch.iter().map(|c| c.path.len() + 4).sum();
            assert!(total <= CONDITION_LENGTH_LIMIT);
        }
        let flattened: usize = batches.iter().map(Vec::len).sum();
        assert_eq!(flattened, 200, "切批不应丢父集合");
    }
}
