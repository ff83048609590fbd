//! genquery2：自由文本目录查询。
//!
//! 单次往返返回 JSON 行数组；行值的类型化读取复用 [`Row`] 的 Scan 能力。

use crate::facade::Client;
use crate::query::result::Row;
use rods_core::api;
use rods_core::contract::CallContext;
use rods_core::error::RodsError;
use rods_core::message::{GenQuery2In, RequestBody};

fn json_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl Client {
    /// 执行 genquery2 查询，返回行集合。
    pub async fn genquery2_rows(
        &self,
        ctx: &CallContext,
        query: &str,
    ) -> Result<Vec<Row>, RodsError> {
        let request = GenQuery2In {
            query: query.to_string(),
            zone: self.zone().to_string(),
            sql_only: false,
            column_mappings: false,
        };
        let reply = self
            .exec(ctx, api::GENQUERY2, RequestBody::GenQuery2(request))
            .await?;
        let rows = reply.into_json(api::GENQUERY2)?;
        let rows = rows
            .as_array()
            .ok_or(RodsError::UnexpectedReply {
                api: api::GENQUERY2.value(),
            })?
            .iter()
            .map(|row| {
                let values = row
                    .as_array()
                    .map(|cells| cells.iter().map(json_to_string).collect())
                    .unwrap_or_else(|| vec![json_to_string(row)]);
                Row::from_values(values)
            })
            .collect();
        Ok(rows)
    }

    /// 只生成 SQL 而不执行。
    pub async fn genquery2_sql(&self, ctx: &CallContext, query: &str) -> Result<String, RodsError> {
        let request = GenQuery2In {
            query: query.to_string(),
            zone: self.zone().to_string(),
            sql_only: true,
            column_mappings: false,
        };
        let reply = self
            .exec(ctx, api::GENQUERY2, RequestBody::GenQuery2(request))
            .await?;
        let sql = reply.into_json(api::GENQUERY2)?;
        sql.as_str()
            .map(str::to_string)
            .ok_or(RodsError::UnexpectedReply {
                api: api::GENQUERY2.value(),
            })
    }

    /// 列出服务端已知的列名。
    pub async fn genquery2_columns(&self, ctx: &CallContext) -> Result<Vec<String>, RodsError> {
        let request = GenQuery2In {
            query: String::new(),
            zone: self.zone().to_string(),
            sql_only: false,
            column_mappings: true,
        };
        let reply = self
            .exec(ctx, api::GENQUERY2, RequestBody::GenQuery2(request))
            .await?;
        let mappings = reply.into_json(api::GENQUERY2)?;
        let mut columns: Vec<String> = match &mappings {
            serde_json::Value::Object(map) => map.keys().cloned().collect(),
            serde_json::Value::Array(items) => items.iter().map(json_to_string).collect(),
            _ => {
                return Err(RodsError::UnexpectedReply {
                    api: api::GENQUERY2.value(),
                });
            }
        };
        columns.sort();
        Ok(columns)
    }
}
