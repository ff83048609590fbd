//! 传输场景测试共用的应答装配工具。
#![allow(dead_code)]

use rods_core::api::ColumnId;
use rods_core::message::{GenQueryReply, ReplyBody, SqlResult};

/// 以列值数组装配一页查询应答。
pub fn gen_query_page(columns: Vec<(ColumnId, Vec<String>)>, continue_index: i64) -> ReplyBody {
    let row_count = columns.first().map(|(_, values)| values.len()).unwrap_or(0) as i32;
    ReplyBody::GenQueryOut(GenQueryReply {
        row_count,
        attribute_count: columns.len() as i32,
        total_row_count: row_count,
        continue_index,
        columns: columns
            .into_iter()
            .map(|(column, values)| SqlResult { column, values })
            .collect(),
    })
}

/// 数据对象行的参数。
pub struct ObjectRow {
    pub data_id: i64,
    pub coll_id: i64,
    pub coll_path: String,
    pub name: String,
    pub size: i64,
    pub checksum: String,
    pub modify_seconds: i64,
}

/// 数据对象查询的应答页。
pub fn data_objects_page(rows: &[ObjectRow]) -> ReplyBody {
    use rods_core::api::columns::*;
    let n = rows.len();
    gen_query_page(
        vec![
            (COL_D_DATA_ID, rows.iter().map(|r| r.data_id.to_string()).collect()),
            (COL_D_COLL_ID, rows.iter().map(|r| r.coll_id.to_string()).collect()),
            (COL_COLL_NAME, rows.iter().map(|r| r.coll_path.clone()).collect()),
            (COL_DATA_NAME, rows.iter().map(|r| r.name.clone()).collect()),
            (COL_DATA_TYPE_NAME, vec!["generic".to_string(); n]),
            (COL_DATA_REPL_NUM, vec!["0".to_string(); n]),
            (COL_DATA_SIZE, rows.iter().map(|r| r.size.to_string()).collect()),
            (COL_D_OWNER_NAME, vec!["alice".to_string(); n]),
            (COL_D_OWNER_ZONE, vec!["tempZone".to_string(); n]),
            (COL_D_DATA_CHECKSUM, rows.iter().map(|r| r.checksum.clone()).collect()),
            (COL_D_REPL_STATUS, vec!["1".to_string(); n]),
            (COL_D_RESC_NAME, vec!["demoResc".to_string(); n]),
            (COL_D_DATA_PATH, vec!["/vault/x".to_string(); n]),
            (COL_D_RESC_HIER, vec!["demoResc".to_string(); n]),
            (COL_D_CREATE_TIME, vec!["100".to_string(); n]),
            (
                COL_D_MODIFY_TIME,
                rows.iter().map(|r| r.modify_seconds.to_string()).collect(),
            ),
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

/// 300 字节的确定性样本内容。
pub fn sample_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
