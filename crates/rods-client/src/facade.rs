//! API 门面：身份、默认资源与连接工厂的薄调度层。

use crate::query::PreparedQuery;
use rods_core::api::ApiNumber;
use rods_core::api::keywords;
use rods_core::connection::ConnectionFactory;
use rods_core::contract::CallContext;
use rods_core::error::{ErrorAccumulator, RodsError, codes};
use rods_core::message::{KeyVals, ReplyBody, RequestBody};
use rods_core::path;
use rods_core::types::AccessLevel;
use std::sync::Arc;

/// 并行传输的默认线程数。
const DEFAULT_NUM_THREADS: usize = 4;

/// `Client` 是数据面的 API 门面。
///
/// # 设计背景（Why）
/// - 门面只携带身份（用户、zone）、管理员标志、默认资源与连接工厂，
///   自身不持有连接，每次操作按需取用并归还；
/// - 派生方法（[`as_admin`](Self::as_admin) 等）返回逻辑独立的副本，
///   基础配置可被无副作用地复用。
///
/// # 契约说明（What）
/// - 管理员标志只改变每个请求附带的关键字集合，绝不改变关键字之外的
///   线上语义；
/// - 管理员门控的操作在标志为假时返回 [`RodsError::RequiresAdmin`]。
#[derive(Clone)]
pub struct Client {
    username: String,
    zone: String,
    admin: bool,
    default_resource: Option<String>,
    threads: usize,
    replica_number: Option<i32>,
    factory: Arc<dyn ConnectionFactory>,
}

impl Client {
    /// 以身份与连接工厂构造门面。
    pub fn new(
        username: impl Into<String>,
        zone: impl Into<String>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        Self {
            username: username.into(),
            zone: zone.into(),
            admin: false,
            default_resource: None,
            threads: DEFAULT_NUM_THREADS,
            replica_number: None,
            factory,
        }
    }

    /// 用户名。
    pub fn username(&self) -> &str {
        &self.username
    }

    /// 所属 zone。
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// 管理员标志。
    pub fn is_admin(&self) -> bool {
        self.admin
    }

    /// 默认存储资源。
    pub fn default_resource(&self) -> Option<&str> {
        self.default_resource.as_deref()
    }

    /// 并行传输线程数。
    pub fn num_threads(&self) -> usize {
        self.threads
    }

    /// 目标副本号。
    pub fn replica_number(&self) -> Option<i32> {
        self.replica_number
    }

    /// 连接工厂。
    pub fn factory(&self) -> &Arc<dyn ConnectionFactory> {
        &self.factory
    }

    /// 用户主目录 `/zone/home/user`。
    pub fn home_path(&self) -> String {
        format!("/{}/home/{}", self.zone, self.username)
    }

    /// 派生管理员副本。
    pub fn as_admin(&self) -> Self {
        let mut clone = self.clone();
        clone.admin = true;
        clone
    }

    /// 派生携带默认资源的副本。
    pub fn with_default_resource(&self, resource: impl Into<String>) -> Self {
        let mut clone = self.clone();
        clone.default_resource = Some(resource.into());
        clone
    }

    /// 派生指定并行线程数的副本。
    pub fn with_num_threads(&self, threads: usize) -> Self {
        let mut clone = self.clone();
        clone.threads = threads.max(1);
        clone
    }

    /// 派生指定副本号的副本。
    pub fn with_replica_number(&self, replica_number: i32) -> Self {
        let mut clone = self.clone();
        clone.replica_number = Some(replica_number);
        clone
    }

    /// 以选择列开启查询 Builder。
    pub fn query(&self, selects: Vec<rods_core::api::ColumnId>) -> PreparedQuery {
        PreparedQuery::new(self.clone(), selects)
    }

    /// 管理员模式下向选项集追加管理员关键字。
    pub(crate) fn apply_admin(&self, options: &mut KeyVals) {
        if self.admin {
            options.set(keywords::ADMIN_KW, "");
        }
    }

    /// 管理员门控：标志为假时拒绝。
    pub(crate) fn require_admin(&self) -> Result<(), RodsError> {
        if self.admin {
            Ok(())
        } else {
            Err(RodsError::RequiresAdmin)
        }
    }

    /// 单请求往返：取连接、发请求、归还连接。
    pub(crate) async fn exec(
        &self,
        ctx: &CallContext,
        api: ApiNumber,
        request: RequestBody,
    ) -> Result<ReplyBody, RodsError> {
        ctx.ensure_active()?;
        let mut conn = self.factory.connect(ctx).await?;
        let reply = conn.request(ctx, api, request).await;
        let close = conn.close().await;
        match (reply, close) {
            (Ok(body), Ok(())) => Ok(body),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                let mut acc = ErrorAccumulator::new();
                acc.push(err);
                acc.push(close_err);
                Err(acc.finish().expect_err("至少包含请求错误"))
            }
        }
    }

    /// 类型化请求的公开直通。
    pub async fn request(
        &self,
        ctx: &CallContext,
        api: ApiNumber,
        request: RequestBody,
    ) -> Result<ReplyBody, RodsError> {
        self.exec(ctx, api, request).await
    }

    /// 携带批量缓冲区的公开直通。
    pub async fn request_with_buffers(
        &self,
        ctx: &CallContext,
        api: ApiNumber,
        request: RequestBody,
        payload: Option<bytes::Bytes>,
        sink: Option<&mut [u8]>,
    ) -> Result<ReplyBody, RodsError> {
        ctx.ensure_active()?;
        let mut conn = self.factory.connect(ctx).await?;
        let reply = conn
            .request_with_buffers(ctx, api, request, payload, sink)
            .await;
        let close = conn.close().await;
        match (reply, close) {
            (Ok(body), Ok(())) => Ok(body),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                let mut acc = ErrorAccumulator::new();
                acc.push(err);
                acc.push(close_err);
                Err(acc.finish().expect_err("至少包含请求错误"))
            }
        }
    }

    /// 访问提升重试：不认管理员关键字的变更操作在权限不足时，先把
    /// 调用者提升为 `own` 再重发一次。
    ///
    /// 仅当管理员标志为真且原始错误为 `CAT_NO_ACCESS_PERMISSION` 时
    /// 触发；授权路径自身不存在（`CAT_NO_ROWS_FOUND`）或实体类型不符
    /// （`INVALID_OBJECT_TYPE`）时沿父路径逐级回退，直到根为止。
    pub(crate) async fn exec_elevated(
        &self,
        ctx: &CallContext,
        api: ApiNumber,
        request: RequestBody,
        target_path: &str,
    ) -> Result<ReplyBody, RodsError> {
        match self.exec(ctx, api, request.clone()).await {
            Err(err) if self.admin && err.is_code_class(codes::CAT_NO_ACCESS_PERMISSION) => {
                tracing::debug!(path = target_path, "access denied, elevating to own");
                self.grant_own_upwards(ctx, target_path).await?;
                self.exec(ctx, api, request).await
            }
            other => other,
        }
    }

    async fn grant_own_upwards(&self, ctx: &CallContext, target_path: &str) -> Result<(), RodsError> {
        let user_spec = format!("{}#{}", self.username, self.zone);
        let mut current = path::clean(target_path);
        loop {
            match self
                .modify_access(ctx, &current, &user_spec, AccessLevel::Own, false)
                .await
            {
                Ok(()) => return Ok(()),
                Err(err)
                    if err.is_code_class(codes::CAT_NO_ROWS_FOUND)
                        || err.is_code_class(codes::INVALID_OBJECT_TYPE) =>
                {
                    let parent = path::parent(&current);
                    if parent == current {
                        return Err(err);
                    }
                    current = parent;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
