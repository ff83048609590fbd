//! 场景测试共用的应答装配工具。
#![allow(dead_code)]

use rods_core::api::ColumnId;
use rods_core::message::{GenQueryReply, ReplyBody, SqlResult};

/// 以列值数组装配一页查询应答。
pub fn gen_query_page(columns: Vec<(ColumnId, Vec<&str>)>, continue_index: i64) -> ReplyBody {
    let row_count = columns.first().map(|(_, values)| values.len()).unwrap_or(0) as i32;
    ReplyBody::GenQueryOut(GenQueryReply {
        row_count,
        attribute_count: columns.len() as i32,
        total_row_count: row_count,
        continue_index,
        columns: columns
            .into_iter()
            .map(|(column, values)| SqlResult {
                column,
                values: values.into_iter().map(str::to_string).collect(),
            })
            .collect(),
    })
}

/// `get_collection` 选择列对应的单行应答。
pub fn collection_page(id: &str) -> ReplyBody {
    use rods_core::api::columns::*;
    gen_query_page(
        vec![
            (COL_COLL_ID, vec![id]),
            (COL_COLL_OWNER_NAME, vec!["alice"]),
            (COL_COLL_OWNER_ZONE, vec!["tempZone"]),
            (COL_COLL_CREATE_TIME, vec!["100"]),
            (COL_COLL_MODIFY_TIME, vec!["200"]),
            (COL_COLL_INHERITANCE, vec!["0"]),
        ],
        0,
    )
}

/// `list_sub_collections` 选择列对应的应答页。
pub fn sub_collections_page(entries: &[(&str, &str)]) -> ReplyBody {
    use rods_core::api::columns::*;
    let ids: Vec<&str> = entries.iter().map(|(id, _)| *id).collect();
    let names: Vec<&str> = entries.iter().map(|(_, name)| *name).collect();
    let n = entries.len();
    gen_query_page(
        vec![
            (COL_COLL_ID, ids),
            (COL_COLL_OWNER_NAME, vec!["alice"; n]),
            (COL_COLL_OWNER_ZONE, vec!["tempZone"; n]),
            (COL_COLL_CREATE_TIME, vec!["100"; n]),
            (COL_COLL_MODIFY_TIME, vec!["200"; n]),
            (COL_COLL_INHERITANCE, vec!["0"; n]),
            (COL_COLL_NAME, names),
        ],
        0,
    )
}

/// 数据对象查询的应答页；每个条目一行（单副本）。
pub fn data_objects_page(entries: &[(&str, &str, &str, &str)]) -> ReplyBody {
    use rods_core::api::columns::*;
    // 条目为 (data_id, coll_id, coll_path, name)。
    let n = entries.len();
    gen_query_page(
        vec![
            (COL_D_DATA_ID, entries.iter().map(|e| e.0).collect()),
            (COL_D_COLL_ID, entries.iter().map(|e| e.1).collect()),
            (COL_COLL_NAME, entries.iter().map(|e| e.2).collect()),
            (COL_DATA_NAME, entries.iter().map(|e| e.3).collect()),
            (COL_DATA_TYPE_NAME, vec!["generic"; n]),
            (COL_DATA_REPL_NUM, vec!["0"; n]),
            (COL_DATA_SIZE, vec!["3"; n]),
            (COL_D_OWNER_NAME, vec!["alice"; n]),
            (COL_D_OWNER_ZONE, vec!["tempZone"; n]),
            (COL_D_DATA_CHECKSUM, vec![""; n]),
            (COL_D_REPL_STATUS, vec!["1"; n]),
            (COL_D_RESC_NAME, vec!["demoResc"; n]),
            (COL_D_DATA_PATH, vec!["/vault/x"; n]),
            (COL_D_RESC_HIER, vec!["demoResc"; n]),
            (COL_D_CREATE_TIME, vec!["100"; n]),
            (COL_D_MODIFY_TIME, vec!["200"; n]),
        ],
        0,
    )
}

/// 完整的描述符信息应答。
pub fn descriptor_info() -> serde_json::Value {
    serde_json::json!({
        "replica_token": "token-1",
        "data_object_info": {
            "replica_number": 0,
            "resource_hierarchy": "root;leaf"
        }
    })
}
