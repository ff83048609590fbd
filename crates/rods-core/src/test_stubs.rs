//! 脚本化连接测试桩（`test-util` Feature）。
//!
//! 下游 crate 的场景测试用它扮演服务端：按脚本顺序核对 API 号、生成
//! 应答、记录请求轨迹。脚本与实际请求不符时直接 panic，让测试在第一
//! 个偏差处失败。

use crate::api::ApiNumber;
use crate::connection::{Connection, ConnectionFactory};
use crate::contract::CallContext;
use crate::error::RodsError;
use crate::message::{ReplyBody, RequestBody};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// 一次被记录的请求。
#[derive(Clone, Debug)]
pub struct TraceEntry {
    pub api: ApiNumber,
    pub request: RequestBody,
    /// 写路径的批量载荷。
    pub payload: Option<Vec<u8>>,
    /// 读路径调用方缓冲区的容量。
    pub sink_capacity: Option<usize>,
}

/// 脚本步骤的应答：报文体，外加要拷入调用方缓冲区的批量字节。
pub struct ScriptedReply {
    pub body: ReplyBody,
    pub sink_bytes: Vec<u8>,
}

impl ScriptedReply {
    /// 纯报文体应答。
    pub fn body(body: ReplyBody) -> Self {
        Self {
            body,
            sink_bytes: Vec::new(),
        }
    }

    /// 携带批量字节的应答（读路径）。
    pub fn with_sink_bytes(body: ReplyBody, sink_bytes: Vec<u8>) -> Self {
        Self { body, sink_bytes }
    }
}

type Responder = Box<dyn FnOnce(&TraceEntry) -> Result<ScriptedReply, RodsError> + Send>;

/// 共享的请求轨迹，测试侧在连接被移动后仍可检查。
pub type Trace = Arc<Mutex<Vec<TraceEntry>>>;

/// 脚本化连接。
pub struct ScriptedConnection {
    label: String,
    steps: Mutex<VecDeque<(ApiNumber, Responder)>>,
    trace: Trace,
    closed: Arc<AtomicBool>,
}

impl ScriptedConnection {
    /// 以标签构造空脚本连接。
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            steps: Mutex::new(VecDeque::new()),
            trace: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 追加一个脚本步骤。
    pub fn expect(
        self,
        api: ApiNumber,
        responder: impl FnOnce(&TraceEntry) -> Result<ScriptedReply, RodsError> + Send + 'static,
    ) -> Self {
        self.steps.lock().push_back((api, Box::new(responder)));
        self
    }

    /// 追加一个固定应答步骤。
    pub fn reply(self, api: ApiNumber, body: ReplyBody) -> Self {
        self.expect(api, move |_| Ok(ScriptedReply::body(body)))
    }

    /// 追加一个固定错误步骤。
    pub fn fail(self, api: ApiNumber, code: i32) -> Self {
        self.expect(api, move |_| Err(RodsError::api(code, "scripted failure")))
    }

    /// 取请求轨迹句柄。
    pub fn trace(&self) -> Trace {
        Arc::clone(&self.trace)
    }

    /// 取关闭标志句柄。
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    fn run_step(&mut self, entry: TraceEntry, sink: Option<&mut [u8]>) -> Result<ReplyBody, RodsError> {
        let (expected_api, responder) = self
            .steps
            .lock()
            .pop_front()
            .unwrap_or_else(|| panic!("[{}] 脚本步骤已耗尽，却收到 api {}", self.label, entry.api));
        assert_eq!(
            expected_api, entry.api,
            "[{}] 脚本期望 api {expected_api}，实际收到 {}",
            self.label, entry.api
        );
        let reply = responder(&entry);
        self.trace.lock().push(entry);
        let reply = reply?;
        if let Some(sink) = sink {
            let n = reply.sink_bytes.len().min(sink.len());
            sink[..n].copy_from_slice(&reply.sink_bytes[..n]);
        }
        Ok(reply.body)
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn request(
        &mut self,
        ctx: &CallContext,
        api: ApiNumber,
        request: RequestBody,
    ) -> Result<ReplyBody, RodsError> {
        ctx.ensure_active()?;
        let entry = TraceEntry {
            api,
            request,
            payload: None,
            sink_capacity: None,
        };
        self.run_step(entry, None)
    }

    async fn request_with_buffers(
        &mut self,
        ctx: &CallContext,
        api: ApiNumber,
        request: RequestBody,
        payload: Option<Bytes>,
        sink: Option<&mut [u8]>,
    ) -> Result<ReplyBody, RodsError> {
        ctx.ensure_active()?;
        let entry = TraceEntry {
            api,
            request,
            payload: payload.map(|bytes| bytes.to_vec()),
            sink_capacity: sink.as_ref().map(|buf| buf.len()),
        };
        self.run_step(entry, sink)
    }

    async fn close(self: Box<Self>) -> Result<(), RodsError> {
        let remaining = self.steps.lock().len();
        assert_eq!(
            remaining, 0,
            "[{}] 连接关闭时仍有 {remaining} 个脚本步骤未消费",
            self.label
        );
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// 脚本化连接工厂：按顺序交付预置连接。
pub struct ScriptedFactory {
    connections: Mutex<VecDeque<ScriptedConnection>>,
    handed_out: AtomicUsize,
    close_flags: Mutex<Vec<Arc<AtomicBool>>>,
}

impl ScriptedFactory {
    /// 以连接序列构造工厂。
    pub fn new(connections: impl IntoIterator<Item = ScriptedConnection>) -> Self {
        let connections: VecDeque<ScriptedConnection> = connections.into_iter().collect();
        let close_flags = connections
            .iter()
            .map(ScriptedConnection::closed_flag)
            .collect();
        Self {
            connections: Mutex::new(connections),
            handed_out: AtomicUsize::new(0),
            close_flags: Mutex::new(close_flags),
        }
    }

    /// 已交付的连接数。
    pub fn handed_out(&self) -> usize {
        self.handed_out.load(Ordering::Acquire)
    }

    /// 断言所有已交付的连接都已关闭。
    pub fn assert_all_closed(&self) {
        let handed_out = self.handed_out();
        let flags = self.close_flags.lock();
        for (index, flag) in flags.iter().take(handed_out).enumerate() {
            assert!(flag.load(Ordering::Acquire), "第 {index} 条连接未被关闭");
        }
    }
}

#[async_trait]
impl ConnectionFactory for ScriptedFactory {
    async fn connect(&self, ctx: &CallContext) -> Result<Box<dyn Connection>, RodsError> {
        ctx.ensure_active()?;
        let connection = self
            .connections
            .lock()
            .pop_front()
            .expect("脚本工厂没有剩余连接");
        self.handed_out.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(connection))
    }
}
