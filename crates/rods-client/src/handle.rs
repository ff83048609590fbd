//! 数据对象句柄：读写寻址、延迟截断/touch、第二连接重开与原点/子协同关闭。

use crate::facade::Client;
use rods_core::api::{self, keywords};
use rods_core::connection::{CloseGuard, Connection};
use rods_core::contract::CallContext;
use rods_core::error::{ErrorAccumulator, RodsError};
use rods_core::message::{
    DataObjectRequest, OpenedDataObjectRequest, ReplicaAccessInfo, RequestBody, Whence,
};
use rods_core::path;
use rods_core::types::unix_seconds;
use std::ops::BitOr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::SystemTime;
use tokio::sync::{Mutex as AsyncMutex, Notify};

/// POSIX 风格的打开标志。
///
/// iRODS 不支持 `O_APPEND`，打开路径把它从线上标志中剔除并改以
/// 打开后 seek 到末尾来实现；见 [`OpenFlags::without_append`]。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenFlags(i32);

impl OpenFlags {
    pub const READ_ONLY: Self = Self(0o0);
    pub const WRITE_ONLY: Self = Self(0o1);
    pub const READ_WRITE: Self = Self(0o2);
    pub const CREATE: Self = Self(0o100);
    pub const EXCLUSIVE: Self = Self(0o200);
    pub const TRUNCATE: Self = Self(0o1000);
    pub const APPEND: Self = Self(0o2000);

    /// 原始标志位。
    pub const fn bits(self) -> i32 {
        self.0
    }

    /// 是否设置了 `O_APPEND`。
    pub fn has_append(self) -> bool {
        self.0 & Self::APPEND.0 != 0
    }

    /// 剔除 `O_APPEND` 后的线上标志。
    pub fn without_append(self) -> Self {
        Self(self.0 & !Self::APPEND.0)
    }
}

impl BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// 延迟 touch 的时间语义。
#[derive(Clone, Copy, Debug)]
enum TouchTime {
    /// 关闭时取当时时刻。
    AtClose,
    At(SystemTime),
}

#[derive(Debug, Default)]
struct Deferred {
    truncate: Option<i64>,
    touch: Option<TouchTime>,
}

impl Deferred {
    fn is_set(&self) -> bool {
        self.truncate.is_some() || self.touch.is_some()
    }
}

/// 原点与子句柄共享的协同状态。
///
/// 延迟截断/touch 只存在于这份共享状态上（子句柄的记录即转发）；
/// 子计数加通知构成原点关闭前的栅栏。
#[derive(Debug, Default)]
struct OriginState {
    children: AtomicUsize,
    fence: Notify,
    deferred: StdMutex<Deferred>,
}

impl OriginState {
    fn truncate_size(&self) -> Option<i64> {
        self.deferred.lock().expect("deferred lock poisoned").truncate
    }

    fn set_truncate(&self, size: i64) {
        self.deferred.lock().expect("deferred lock poisoned").truncate = Some(size);
    }

    /// 写越过延迟截断边界时把边界推到新的写尾。
    fn extend_truncate(&self, offset: i64) {
        let mut deferred = self.deferred.lock().expect("deferred lock poisoned");
        if let Some(size) = &mut deferred.truncate {
            if offset > *size {
                *size = offset;
            }
        }
    }

    fn set_touch(&self, touch: TouchTime) {
        self.deferred.lock().expect("deferred lock poisoned").touch = Some(touch);
    }

    fn take_deferred(&self) -> Deferred {
        std::mem::take(&mut *self.deferred.lock().expect("deferred lock poisoned"))
    }

    fn acquire_child(&self) {
        self.children.fetch_add(1, Ordering::AcqRel);
    }

    fn release_child(&self) {
        self.children.fetch_sub(1, Ordering::AcqRel);
        self.fence.notify_waiters();
    }

    async fn wait_children(&self) {
        loop {
            let notified = self.fence.notified();
            if self.children.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct Inner {
    conn: Option<Box<dyn Connection>>,
    descriptor: i32,
    offset: i64,
    close_guard: Option<CloseGuard>,
    closed: bool,
}

/// `Handle` 是有状态的已打开数据对象。
///
/// # 设计背景（Why）
/// - 并行 I/O 依赖“第二连接重开”协议：原点句柄先打开，随后以副本令牌
///   在别的连接上重开出子句柄，各写各的字节区间；
/// - 延迟截断与 touch 必须活过连接错误，因此只在关闭时落盘，且关闭的
///   每个清理步骤无论前序成败都要执行。
///
/// # 契约说明（What）
/// - 同一句柄上的并发调用被内部互斥锁串行化，调用方观察不到重排；
/// - 子句柄必须先于原点关闭；原点关闭在子计数归零前阻塞；
/// - 读在服务端短读时返回实际字节数，零字节即数据尾；
/// - seek 目的地等于当前偏移时不发线上请求。
pub struct Handle {
    path: String,
    flags: OpenFlags,
    admin: bool,
    ctx: CallContext,
    shared: Arc<OriginState>,
    is_child: bool,
    inner: AsyncMutex<Inner>,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("path", &self.path)
            .field("flags", &self.flags)
            .field("admin", &self.admin)
            .field("is_child", &self.is_child)
            .finish_non_exhaustive()
    }
}

async fn fetch_access_info(
    ctx: &CallContext,
    conn: &mut dyn Connection,
    descriptor: i32,
) -> Result<ReplicaAccessInfo, RodsError> {
    let body = serde_json::json!({ "fd": descriptor });
    let reply = conn
        .request(ctx, api::GET_FILE_DESCRIPTOR_INFO, RequestBody::Json(body))
        .await?;
    let info = reply.into_json(api::GET_FILE_DESCRIPTOR_INFO)?;
    ReplicaAccessInfo::from_descriptor_info(&info)
}

impl Handle {
    fn new_origin(
        path: String,
        flags: OpenFlags,
        admin: bool,
        ctx: CallContext,
        conn: Box<dyn Connection>,
        descriptor: i32,
    ) -> Self {
        Self {
            path,
            flags,
            admin,
            ctx,
            shared: Arc::new(OriginState::default()),
            is_child: false,
            inner: AsyncMutex::new(Inner {
                conn: Some(conn),
                descriptor,
                offset: 0,
                close_guard: None,
                closed: false,
            }),
        }
    }

    /// 逻辑路径。
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 对象名。
    pub fn name(&self) -> &str {
        path::base_name(&self.path)
    }

    /// 是否为重开出来的子句柄。
    pub fn is_child(&self) -> bool {
        self.is_child
    }

    /// 读取最多 `buf.len()` 字节到缓冲区，返回实际读取数。
    ///
    /// 延迟截断边界之后的读一律返回 0（数据尾）；越过边界的读被裁剪。
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, RodsError> {
        self.ctx.ensure_active()?;
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(RodsError::HandleClosed);
        }
        let mut len = buf.len() as i64;
        if let Some(truncate) = self.shared.truncate_size() {
            if truncate <= inner.offset {
                return Ok(0);
            }
            len = len.min(truncate - inner.offset);
        }
        if len == 0 {
            return Ok(0);
        }
        let request = OpenedDataObjectRequest {
            descriptor: inner.descriptor,
            len,
            ..Default::default()
        };
        let conn = inner.conn.as_mut().ok_or(RodsError::HandleClosed)?;
        let reply = conn
            .request_with_buffers(
                &self.ctx,
                api::DATA_OBJ_READ,
                RequestBody::OpenedDataObj(request),
                None,
                Some(&mut buf[..len as usize]),
            )
            .await?;
        let read = reply.into_len(api::DATA_OBJ_READ)?;
        inner.offset += read;
        Ok(read as usize)
    }

    /// 写出整个缓冲区，返回写出的字节数。
    pub async fn write(&self, data: &[u8]) -> Result<usize, RodsError> {
        self.ctx.ensure_active()?;
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(RodsError::HandleClosed);
        }
        let request = OpenedDataObjectRequest {
            descriptor: inner.descriptor,
            len: data.len() as i64,
            ..Default::default()
        };
        let conn = inner.conn.as_mut().ok_or(RodsError::HandleClosed)?;
        let reply = conn
            .request_with_buffers(
                &self.ctx,
                api::DATA_OBJ_WRITE,
                RequestBody::OpenedDataObj(request),
                Some(bytes::Bytes::copy_from_slice(data)),
                None,
            )
            .await?;
        let written = match reply {
            rods_core::message::ReplyBody::Len(written) => written,
            rods_core::message::ReplyBody::Empty => data.len() as i64,
            _ => {
                return Err(RodsError::UnexpectedReply {
                    api: api::DATA_OBJ_WRITE.value(),
                });
            }
        };
        inner.offset += written;
        self.shared.extend_truncate(inner.offset);
        Ok(written as usize)
    }

    /// 移动逻辑偏移；目的地等于当前偏移的 seek 不发线上请求。
    pub async fn seek(&self, offset: i64, whence: Whence) -> Result<i64, RodsError> {
        self.ctx.ensure_active()?;
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(RodsError::HandleClosed);
        }
        match whence {
            Whence::Start if offset == inner.offset => return Ok(inner.offset),
            Whence::Current if offset == 0 => return Ok(inner.offset),
            _ => {}
        }
        let request = OpenedDataObjectRequest {
            descriptor: inner.descriptor,
            offset,
            whence: whence.wire_value(),
            ..Default::default()
        };
        let conn = inner.conn.as_mut().ok_or(RodsError::HandleClosed)?;
        let reply = conn
            .request(&self.ctx, api::DATA_OBJ_LSEEK, RequestBody::OpenedDataObj(request))
            .await?;
        let position = reply.into_offset(api::DATA_OBJ_LSEEK)?;
        inner.offset = position;
        Ok(position)
    }

    /// 记录延迟截断；线上调用推迟到原点关闭。
    pub fn truncate(&self, size: i64) -> Result<(), RodsError> {
        if size < 0 {
            return Err(RodsError::InvalidSize);
        }
        self.shared.set_truncate(size);
        Ok(())
    }

    /// 记录延迟 touch；`time` 为空表示在关闭时取当时时刻。
    ///
    /// 子句柄的记录即向原点转发（二者共享同一份延迟状态）。
    pub fn touch(&self, time: Option<SystemTime>) {
        self.shared
            .set_touch(time.map_or(TouchTime::AtClose, TouchTime::At));
    }

    /// 在另一条连接上重开同一副本，返回子句柄。
    ///
    /// # 契约说明（What）
    /// - **前置条件**：`conn` 不得是原点自身的连接，否则返回
    ///   [`RodsError::SameConnection`]；
    /// - **后置条件**：成功后原点的子计数加一；子句柄不继承延迟状态，
    ///   其截断/touch 记录直接落在共享的原点状态上。
    pub async fn reopen(&self, mut conn: Box<dyn Connection>) -> Result<Handle, RodsError> {
        self.ctx.ensure_active()?;
        let info = {
            let mut inner = self.inner.lock().await;
            let fetched = async {
                if inner.closed {
                    return Err(RodsError::HandleClosed);
                }
                let descriptor = inner.descriptor;
                let existing = inner.conn.as_deref_mut().ok_or(RodsError::HandleClosed)?;
                if std::ptr::addr_eq(
                    existing as *const dyn Connection,
                    conn.as_ref() as *const dyn Connection,
                ) {
                    return Err(RodsError::SameConnection);
                }
                fetch_access_info(&self.ctx, existing, descriptor).await
            }
            .await;
            match fetched {
                Ok(info) => info,
                Err(err) => {
                    let mut acc = ErrorAccumulator::new();
                    acc.push(err);
                    acc.absorb(conn.close().await);
                    return Err(acc.finish().expect_err("至少包含访问信息错误"));
                }
            }
        };

        let mut request = DataObjectRequest::with_path(self.path.clone());
        request.open_flags = self.flags.without_append().bits();
        request
            .options
            .set(keywords::RESC_HIER_STR_KW, info.resource_hierarchy.clone());
        request
            .options
            .set(keywords::REPLICA_TOKEN_KW, info.replica_token.clone());
        if self.admin {
            request.options.set(keywords::ADMIN_KW, "");
        }
        let descriptor = match conn
            .request(&self.ctx, api::DATA_OBJ_OPEN, RequestBody::DataObj(request))
            .await
            .and_then(|reply| reply.into_descriptor(api::DATA_OBJ_OPEN))
        {
            Ok(descriptor) => descriptor,
            Err(err) => {
                let mut acc = ErrorAccumulator::new();
                acc.push(err);
                acc.absorb(conn.close().await);
                return Err(acc.finish().expect_err("至少包含重开错误"));
            }
        };

        tracing::debug!(path = %self.path, descriptor, "reopened data object on a second connection");
        self.shared.acquire_child();
        let emergency = Arc::clone(&self.shared);
        let close_guard = conn.register_close_handler(Box::new(move || emergency.release_child()));
        let child = Handle {
            path: self.path.clone(),
            flags: self.flags,
            admin: self.admin,
            ctx: self.ctx.child(),
            shared: Arc::clone(&self.shared),
            is_child: true,
            inner: AsyncMutex::new(Inner {
                conn: Some(conn),
                descriptor,
                offset: 0,
                close_guard,
                closed: false,
            }),
        };
        if self.flags.has_append() {
            if let Err(err) = child.seek(0, Whence::End).await {
                let mut acc = ErrorAccumulator::new();
                acc.push(err);
                acc.absorb(child.close().await);
                return Err(acc.finish().expect_err("至少包含 seek 错误"));
            }
        }
        Ok(child)
    }

    /// 关闭句柄；幂等。
    ///
    /// 子句柄：`REPLICA_CLOSE` 描述符、归还连接、原点子计数减一。
    /// 原点：先等子计数归零（服务端在子描述符仍开着时会拒绝截断与
    /// touch），有延迟工作则先取副本访问信息，再关描述符，再依次应用
    /// `REPLICA_TRUNCATE` 与 `TOUCH`；每一步的错误都累入聚合错误，
    /// 连接总会被归还。
    pub async fn close(&self) -> Result<(), RodsError> {
        if self.is_child {
            self.close_child().await
        } else {
            self.close_origin().await
        }
    }

    async fn close_child(&self) -> Result<(), RodsError> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Ok(());
        }
        inner.closed = true;
        let mut acc = ErrorAccumulator::new();
        let descriptor = inner.descriptor;
        if let Some(conn) = inner.conn.as_mut() {
            let body = serde_json::json!({ "fd": descriptor });
            if let Err(err) = conn
                .request(&self.ctx, api::REPLICA_CLOSE, RequestBody::Json(body))
                .await
            {
                acc.push(err);
            }
        }
        inner.close_guard.take();
        if let Some(conn) = inner.conn.take() {
            acc.absorb(conn.close().await);
        }
        drop(inner);
        self.shared.release_child();
        acc.finish()
    }

    async fn close_origin(&self) -> Result<(), RodsError> {
        self.shared.wait_children().await;
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Ok(());
        }
        inner.closed = true;
        let mut acc = ErrorAccumulator::new();
        let deferred = self.shared.take_deferred();
        let descriptor = inner.descriptor;

        let mut access_info = None;
        if deferred.is_set() {
            if let Some(conn) = inner.conn.as_mut() {
                match fetch_access_info(&self.ctx, conn.as_mut(), descriptor).await {
                    Ok(info) => access_info = Some(info),
                    Err(err) => acc.push(err),
                }
            }
        }

        if let Some(conn) = inner.conn.as_mut() {
            let request = OpenedDataObjectRequest::with_descriptor(descriptor);
            if let Err(err) = conn
                .request(&self.ctx, api::DATA_OBJ_CLOSE, RequestBody::OpenedDataObj(request))
                .await
            {
                acc.push(err);
            }
        }

        if let (Some(size), Some(info)) = (deferred.truncate, access_info.as_ref()) {
            if let Some(conn) = inner.conn.as_mut() {
                tracing::debug!(path = %self.path, size, "applying deferred truncate");
                let mut request = DataObjectRequest::with_path(self.path.clone());
                request.data_size = size;
                request
                    .options
                    .set(keywords::RESC_HIER_STR_KW, info.resource_hierarchy.clone());
                request
                    .options
                    .set(keywords::REPLICA_TOKEN_KW, info.replica_token.clone());
                if self.admin {
                    request.options.set(keywords::ADMIN_KW, "");
                }
                if let Err(err) = conn
                    .request(&self.ctx, api::REPLICA_TRUNCATE, RequestBody::DataObj(request))
                    .await
                {
                    acc.push(err);
                }
            }
        }

        if let (Some(touch), Some(info)) = (deferred.touch, access_info.as_ref()) {
            if let Some(conn) = inner.conn.as_mut() {
                let time = match touch {
                    TouchTime::AtClose => SystemTime::now(),
                    TouchTime::At(time) => time,
                };
                let body = serde_json::json!({
                    "logical_path": self.path,
                    "options": {
                        "no_create": true,
                        "replica_number": info.replica_number,
                        "seconds_since_epoch": unix_seconds(time),
                    },
                });
                if let Err(err) = conn
                    .request(&self.ctx, api::TOUCH, RequestBody::Json(body))
                    .await
                {
                    acc.push(err);
                }
            }
        }

        if let Some(conn) = inner.conn.take() {
            acc.absorb(conn.close().await);
        }
        acc.finish()
    }
}

impl Client {
    async fn open_handle(
        &self,
        ctx: &CallContext,
        api_number: rods_core::api::ApiNumber,
        flags: OpenFlags,
        request: DataObjectRequest,
        obj_path: String,
    ) -> Result<Handle, RodsError> {
        ctx.ensure_active()?;
        let mut conn = self.factory().connect(ctx).await?;
        let descriptor = match conn
            .request(ctx, api_number, RequestBody::DataObj(request))
            .await
            .and_then(|reply| reply.into_descriptor(api_number))
        {
            Ok(descriptor) => descriptor,
            Err(err) => {
                let mut acc = ErrorAccumulator::new();
                acc.push(err);
                acc.absorb(conn.close().await);
                return Err(acc.finish().expect_err("至少包含打开错误"));
            }
        };
        let handle = Handle::new_origin(
            obj_path,
            flags,
            self.is_admin(),
            ctx.child(),
            conn,
            descriptor,
        );
        if flags.has_append() {
            if let Err(err) = handle.seek(0, Whence::End).await {
                let mut acc = ErrorAccumulator::new();
                acc.push(err);
                acc.absorb(handle.close().await);
                return Err(acc.finish().expect_err("至少包含 seek 错误"));
            }
        }
        Ok(handle)
    }

    /// 创建数据对象并返回写句柄（`O_CREAT|O_WRONLY|O_TRUNC`）。
    pub async fn create_data_object(
        &self,
        ctx: &CallContext,
        obj_path: &str,
        exclusive: bool,
    ) -> Result<Handle, RodsError> {
        let mut flags = OpenFlags::CREATE | OpenFlags::WRITE_ONLY | OpenFlags::TRUNCATE;
        if exclusive {
            flags = flags | OpenFlags::EXCLUSIVE;
        }
        let obj_path = path::clean(obj_path);
        let mut request = DataObjectRequest::with_path(obj_path.clone());
        request.open_flags = flags.without_append().bits();
        request.create_mode = 0o644;
        request.options.set(keywords::DATA_TYPE_KW, "generic");
        if let Some(resource) = self.default_resource() {
            request.options.set(keywords::DEST_RESC_NAME_KW, resource);
        }
        self.apply_admin(&mut request.options);
        self.open_handle(ctx, api::DATA_OBJ_CREATE, flags, request, obj_path)
            .await
    }

    /// 打开已有数据对象。
    pub async fn open_data_object(
        &self,
        ctx: &CallContext,
        obj_path: &str,
        flags: OpenFlags,
    ) -> Result<Handle, RodsError> {
        let obj_path = path::clean(obj_path);
        let mut request = DataObjectRequest::with_path(obj_path.clone());
        request.open_flags = flags.without_append().bits();
        if let Some(resource) = self.default_resource() {
            request.options.set(keywords::DEST_RESC_NAME_KW, resource);
        }
        self.apply_admin(&mut request.options);
        self.open_handle(ctx, api::DATA_OBJ_OPEN, flags, request, obj_path)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_flags_compose_and_strip_append() {
        let flags = OpenFlags::CREATE | OpenFlags::WRITE_ONLY | OpenFlags::APPEND;
        assert!(flags.has_append());
        assert!(!flags.without_append().has_append());
        assert_eq!(
            flags.without_append().bits(),
            (OpenFlags::CREATE | OpenFlags::WRITE_ONLY).bits()
        );
    }

    #[test]
    fn deferred_truncate_extends_only_forward() {
        let state = OriginState::default();
        assert!(state.truncate_size().is_none());
        state.set_truncate(20);
        state.extend_truncate(10);
        assert_eq!(state.truncate_size(), Some(20), "更小的写尾不应回缩边界");
        state.extend_truncate(50);
        assert_eq!(state.truncate_size(), Some(50));
    }
}
