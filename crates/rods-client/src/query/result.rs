//! 查询游标：跨续传往返流式吐行。

use crate::query::value::{ScanTargets, ScanValue};
use rods_core::api;
use rods_core::connection::Connection;
use rods_core::contract::CallContext;
use rods_core::error::{ErrorAccumulator, RodsError, codes};
use rods_core::message::{GenQueryIn, GenQueryReply, RequestBody};

/// `QueryResult` 是持有连接的分页游标。
///
/// # 设计背景（Why）
/// - 续传索引是服务端游标状态，耗尽前必须在同一连接上发续传请求；
///   游标因此独占连接，直到关闭才归还；
/// - 提前放弃迭代时，非零续传索引要以 `maxRows=0` 的收尾往返通知服务端
///   释放游标，避免服务端状态泄漏。
///
/// # 契约说明（What）
/// - [`next`](Self::next) 返回 `Ok(true)` 期间，[`scan`](Self::scan)
///   读取当前行；
/// - 行序与服务端跨页返回的顺序一致，不重复、不丢行；
/// - [`close`](Self::close) 幂等；`next` 自然耗尽时游标自动关闭。
pub struct QueryResult {
    ctx: CallContext,
    conn: Option<Box<dyn Connection>>,
    request: GenQueryIn,
    page: Option<GenQueryReply>,
    /// 当前行号；`None` 表示尚未落在任何行上。
    row: Option<usize>,
    /// 总行数上限的剩余额度。
    remaining: Option<i32>,
    /// 服务端游标已被对端释放（收到行尾错误），收尾时无需再排水。
    cursor_dead: bool,
    done: bool,
}

impl QueryResult {
    pub(crate) fn with_first_page(
        ctx: CallContext,
        conn: Box<dyn Connection>,
        request: GenQueryIn,
        limit: Option<i32>,
        page: GenQueryReply,
    ) -> Self {
        let remaining = limit.map(|limit| (limit - page.row_count).max(0));
        Self {
            ctx,
            conn: Some(conn),
            request,
            page: Some(page),
            row: None,
            remaining,
            cursor_dead: false,
            done: false,
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            ctx: CallContext::background(),
            conn: None,
            request: GenQueryIn::default(),
            page: None,
            row: None,
            remaining: None,
            cursor_dead: true,
            done: true,
        }
    }

    /// 推进到下一行；返回 `Ok(false)` 表示流结束（游标已释放）。
    pub async fn next(&mut self) -> Result<bool, RodsError> {
        loop {
            if self.done {
                return Ok(false);
            }
            let Some(page) = &self.page else {
                self.finish().await?;
                return Ok(false);
            };
            let rows = page.row_count.max(0) as usize;
            let next_row = self.row.map_or(0, |row| row + 1);
            if next_row < rows {
                self.row = Some(next_row);
                return Ok(true);
            }
            let can_continue = page.continue_index != 0 && self.remaining != Some(0);
            if can_continue {
                self.fetch_continuation().await?;
                continue;
            }
            self.finish().await?;
            return Ok(false);
        }
    }

    async fn fetch_continuation(&mut self) -> Result<(), RodsError> {
        self.ctx.ensure_active()?;
        let continue_index = self
            .page
            .as_ref()
            .map(|page| page.continue_index)
            .unwrap_or(0);
        self.request.continue_index = continue_index;
        if let Some(remaining) = self.remaining {
            self.request.max_rows = self.request.max_rows.min(remaining);
        }
        let conn = self.conn.as_mut().expect("续传要求游标仍持有连接");
        match conn
            .request(
                &self.ctx,
                api::GEN_QUERY,
                RequestBody::GenQuery(self.request.clone()),
            )
            .await
        {
            Ok(reply) => {
                let page = reply.into_gen_query(api::GEN_QUERY)?;
                if let Some(remaining) = &mut self.remaining {
                    *remaining = (*remaining - page.row_count).max(0);
                }
                self.page = Some(page);
                self.row = None;
                Ok(())
            }
            Err(err) if err.is_code_class(codes::CAT_NO_ROWS_FOUND) => {
                // 行尾：服务端已释放游标。
                self.cursor_dead = true;
                self.page = None;
                Ok(())
            }
            Err(err) => {
                self.cursor_dead = true;
                self.page = None;
                let mut acc = ErrorAccumulator::new();
                acc.push(err);
                acc.absorb(self.finish().await);
                Err(acc.finish().expect_err("至少包含续传错误"))
            }
        }
    }

    /// 排空未消费的服务端游标并归还连接。
    async fn finish(&mut self) -> Result<(), RodsError> {
        self.done = true;
        self.row = None;
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        let mut acc = ErrorAccumulator::new();
        let live_cursor = self
            .page
            .as_ref()
            .map(|page| page.continue_index)
            .filter(|_| !self.cursor_dead)
            .filter(|index| *index != 0);
        if let Some(continue_index) = live_cursor {
            self.request.continue_index = continue_index;
            self.request.max_rows = 0;
            match conn
                .request(
                    &self.ctx,
                    api::GEN_QUERY,
                    RequestBody::GenQuery(self.request.clone()),
                )
                .await
            {
                Ok(_) => {}
                Err(err) if err.is_code_class(codes::CAT_NO_ROWS_FOUND) => {}
                Err(err) => acc.push(err),
            }
        }
        self.page = None;
        acc.absorb(conn.close().await);
        acc.finish()
    }

    /// 关闭游标；幂等。
    pub async fn close(&mut self) -> Result<(), RodsError> {
        if self.conn.is_none() {
            self.done = true;
            return Ok(());
        }
        self.finish().await
    }

    /// 把当前行读入目标元组。
    pub fn scan<T: ScanTargets>(&self, targets: T) -> Result<(), RodsError> {
        let page = self.page.as_ref().ok_or(RodsError::RowOutOfBound)?;
        let row = self.row.ok_or(RodsError::RowOutOfBound)?;
        targets.scan_with(&mut |index| page.value(row, index).map(str::to_string))
    }

    /// 读取当前行第 `index` 列并解析为目标类型。
    pub fn value_at<T: ScanValue>(&self, index: usize) -> Result<T, RodsError> {
        let page = self.page.as_ref().ok_or(RodsError::RowOutOfBound)?;
        let row = self.row.ok_or(RodsError::RowOutOfBound)?;
        T::scan(page.value(row, index)?)
    }

    /// 消费游标，把剩余行全部快照收集。
    pub async fn collect_rows(mut self) -> Result<Vec<Row>, RodsError> {
        let mut rows = Vec::new();
        while self.next().await? {
            rows.push(self.snapshot_row()?);
        }
        Ok(rows)
    }

    /// 把当前行快照为脱离游标的 [`Row`]。
    pub(crate) fn snapshot_row(&self) -> Result<Row, RodsError> {
        let page = self.page.as_ref().ok_or(RodsError::RowOutOfBound)?;
        let row = self.row.ok_or(RodsError::RowOutOfBound)?;
        let mut values = Vec::with_capacity(page.columns.len());
        for index in 0..page.columns.len() {
            values.push(page.value(row, index)?.to_string());
        }
        Ok(Row { values })
    }
}

/// 脱离游标的单行快照。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Row {
    values: Vec<String>,
}

impl Row {
    /// 以列值序列构造行。
    pub fn from_values(values: Vec<String>) -> Self {
        Self { values }
    }

    /// 列数。
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 是否没有任何列。
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 读取第 `index` 列并解析为目标类型。
    pub fn get<T: ScanValue>(&self, index: usize) -> Result<T, RodsError> {
        let value = self
            .values
            .get(index)
            .ok_or(RodsError::AttributeOutOfBound)?;
        T::scan(value)
    }

    /// 把整行读入目标元组。
    pub fn scan<T: ScanTargets>(&self, targets: T) -> Result<(), RodsError> {
        targets.scan_with(&mut |index| {
            self.values
                .get(index)
                .cloned()
                .ok_or(RodsError::AttributeOutOfBound)
        })
    }
}
