//! 预编译查询的不可变 Builder。

use crate::facade::Client;
use crate::query::result::{QueryResult, Row};
use crate::query::DEFAULT_MAX_ROWS;
use rods_core::api::{self, ColumnId, keywords};
use rods_core::contract::CallContext;
use rods_core::error::{ErrorAccumulator, RodsError, codes};
use rods_core::message::{GenQueryIn, KeyVals, RequestBody};

/// 把值嵌入 SQL 片段时转义单引号（`'` 翻倍）。
pub(crate) fn escape_value(value: &str) -> String {
    value.replace('\'', "''")
}

/// 条件：列号加 SQL 条件片段。
///
/// 片段是诸如 `= '/foo'` 的原始 SQL 尾部；构造器负责值转义。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    pub column: ColumnId,
    pub fragment: String,
}

impl Condition {
    /// `=` 条件。
    pub fn equal(column: ColumnId, value: &str) -> Self {
        Self {
            column,
            fragment: format!("= '{}'", escape_value(value)),
        }
    }

    /// `<>` 条件。
    pub fn not_equal(column: ColumnId, value: &str) -> Self {
        Self {
            column,
            fragment: format!("<> '{}'", escape_value(value)),
        }
    }

    /// `IN (…)` 条件。
    pub fn in_list<I, S>(column: ColumnId, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let quoted: Vec<String> = values
            .into_iter()
            .map(|value| format!("'{}'", escape_value(value.as_ref())))
            .collect();
        Self {
            column,
            fragment: format!("IN ({})", quoted.join(",")),
        }
    }

    /// `LIKE` 条件；模式由调用方给出（glob 翻译见 [`crate::glob`]）。
    pub fn like(column: ColumnId, pattern: &str) -> Self {
        Self {
            column,
            fragment: format!("LIKE '{}'", escape_value(pattern)),
        }
    }
}

/// `PreparedQuery` 是不可变的查询配置。
///
/// # 契约说明（What）
/// - Builder 方法均按值消费并返回新副本，基础配置可以被复用；
/// - 同一列的条件后写覆盖先写；
/// - [`limit`](Self::limit) 低于单页上限时同时压低单页行数。
#[derive(Clone)]
pub struct PreparedQuery {
    client: Client,
    selects: Vec<ColumnId>,
    conditions: Vec<(ColumnId, String)>,
    limit: Option<i32>,
    max_rows: i32,
    admin: bool,
}

impl PreparedQuery {
    pub(crate) fn new(client: Client, selects: Vec<ColumnId>) -> Self {
        let admin = client.is_admin();
        Self {
            client,
            selects,
            conditions: Vec::new(),
            limit: None,
            max_rows: DEFAULT_MAX_ROWS,
            admin,
        }
    }

    /// 追加一条原始条件片段；同列覆盖。
    pub fn where_(mut self, column: ColumnId, fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        match self
            .conditions
            .iter_mut()
            .find(|(existing, _)| *existing == column)
        {
            Some(entry) => entry.1 = fragment,
            None => self.conditions.push((column, fragment)),
        }
        self
    }

    /// 以条件构造器追加一批条件。
    pub fn with(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        for condition in conditions {
            self = self.where_(condition.column, condition.fragment);
        }
        self
    }

    /// 设定总行数上限。
    pub fn limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        if limit < self.max_rows {
            self.max_rows = limit;
        }
        self
    }

    /// 仅对本查询启用管理员关键字。
    pub fn admin(mut self) -> Self {
        self.admin = true;
        self
    }

    fn build_request(&self) -> GenQueryIn {
        let mut options = KeyVals::new();
        if self.admin {
            options.set(keywords::ADMIN_KW, "");
        }
        GenQueryIn {
            max_rows: self.max_rows,
            continue_index: 0,
            options,
            selects: self.selects.iter().map(|column| (*column, 0)).collect(),
            conditions: self.conditions.clone(),
        }
    }

    /// 执行查询，返回持有连接的游标。
    ///
    /// 首页即返回 `CAT_NO_ROWS_FOUND` 时得到空游标而非错误。
    pub async fn execute(self, ctx: &CallContext) -> Result<QueryResult, RodsError> {
        ctx.ensure_active()?;
        let request = self.build_request();
        let mut conn = self.client.factory().connect(ctx).await?;
        match conn
            .request(ctx, api::GEN_QUERY, RequestBody::GenQuery(request.clone()))
            .await
        {
            Ok(reply) => {
                let page = reply.into_gen_query(api::GEN_QUERY)?;
                Ok(QueryResult::with_first_page(
                    ctx.child(),
                    conn,
                    request,
                    self.limit,
                    page,
                ))
            }
            Err(err) if err.is_code_class(codes::CAT_NO_ROWS_FOUND) => {
                conn.close().await?;
                Ok(QueryResult::empty())
            }
            Err(err) => {
                let mut acc = ErrorAccumulator::new();
                acc.push(err);
                acc.absorb(conn.close().await);
                Err(acc.finish().expect_err("至少包含请求错误"))
            }
        }
    }

    /// 单行特化：上限压到 1，空结果映射为 [`RodsError::NoRowFound`]。
    pub async fn fetch_row(self, ctx: &CallContext) -> Result<Row, RodsError> {
        let mut result = self.limit(1).execute(ctx).await?;
        if result.next().await? {
            let row = result.snapshot_row()?;
            result.close().await?;
            Ok(row)
        } else {
            Err(RodsError::NoRowFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rods_core::api::columns::{COL_COLL_NAME, COL_DATA_NAME};

    #[test]
    fn conditions_escape_and_overwrite() {
        let cond = Condition::equal(COL_COLL_NAME, "/a'b");
        assert_eq!(cond.fragment, "= '/a''b'");
        let cond = Condition::in_list(COL_DATA_NAME, ["x", "y"]);
        assert_eq!(cond.fragment, "IN ('x','y')");
    }
}
