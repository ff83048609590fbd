//! 范围 I/O 适配器：把句柄或本地文件映射为有界的区段读写器。
//!
//! 并行传输只通过这层接口寻址数据：每个区段 `(offset, len)` 是一个
//! 独立的读者/写者，区段间互不共享连接。

use crate::handle::Handle;
use async_trait::async_trait;
use futures::future::BoxFuture;
use rods_core::error::{ErrorAccumulator, RodsError};
use rods_core::message::Whence;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// 一个有界区段的流式读者。
#[async_trait]
pub trait SectionReader: Send {
    /// 读取最多 `buf.len()` 字节；返回 0 表示区段结束。
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, RodsError>;

    /// 关闭区段并释放其独占资源。
    async fn close(self: Box<Self>) -> Result<(), RodsError>;
}

/// 一个有界区段的流式写者。
#[async_trait]
pub trait SectionWriter: Send {
    /// 写出整个缓冲区；越过区段边界返回 [`RodsError::ShortWrite`]。
    async fn write(&mut self, data: &[u8]) -> Result<usize, RodsError>;

    /// 关闭区段并释放其独占资源。
    async fn close(self: Box<Self>) -> Result<(), RodsError>;
}

/// 把 `(offset, len)` 映射为区段读者的工厂。
#[async_trait]
pub trait RangeReader: Send {
    async fn range(&mut self, offset: i64, len: i64) -> Result<Box<dyn SectionReader>, RodsError>;

    /// 关闭工厂残余持有的资源。
    async fn close(self: Box<Self>) -> Result<(), RodsError>;
}

/// 把 `(offset, len)` 映射为区段写者的工厂。
#[async_trait]
pub trait RangeWriter: Send {
    async fn range(&mut self, offset: i64, len: i64) -> Result<Box<dyn SectionWriter>, RodsError>;

    /// 关闭工厂残余持有的资源。
    async fn close(self: Box<Self>) -> Result<(), RodsError>;
}

/// 重开工厂：为后续区段产出新的子句柄（各自独占一条连接）。
pub type ReopenFn = Box<dyn FnMut() -> BoxFuture<'static, Result<Handle, RodsError>> + Send>;

/// 区段内的句柄引用：第一个区段借用原点，其余区段拥有重开出的子句柄。
enum HandleRef {
    /// 原点句柄由传输调度方负责关闭（延迟截断/touch 在那里落盘）。
    Shared(Arc<Handle>),
    Owned(Option<Handle>),
}

impl HandleRef {
    fn handle(&self) -> &Handle {
        match self {
            Self::Shared(handle) => handle,
            Self::Owned(handle) => handle.as_ref().expect("区段句柄在关闭后不再被使用"),
        }
    }

    async fn close(&mut self) -> Result<(), RodsError> {
        match self {
            Self::Shared(_) => Ok(()),
            Self::Owned(handle) => match handle.take() {
                Some(handle) => handle.close().await,
                None => Ok(()),
            },
        }
    }
}

/// 基于 seek-关闭-重开协议的范围读者。
///
/// 第一个区段复用原点句柄，后续区段调用重开工厂；越过对象末尾的
/// 区段自然读到 0。
pub struct ReopenRangeReader {
    base: Option<Arc<Handle>>,
    reopen: ReopenFn,
}

impl ReopenRangeReader {
    /// 以原点句柄与重开工厂构造。
    pub fn new(base: Arc<Handle>, reopen: ReopenFn) -> Self {
        Self {
            base: Some(base),
            reopen,
        }
    }
}

#[async_trait]
impl RangeReader for ReopenRangeReader {
    async fn range(&mut self, offset: i64, len: i64) -> Result<Box<dyn SectionReader>, RodsError> {
        let handle = match self.base.take() {
            Some(base) => HandleRef::Shared(base),
            None => HandleRef::Owned(Some((self.reopen)().await?)),
        };
        if let Err(err) = handle.handle().seek(offset, Whence::Start).await {
            let mut handle = handle;
            let mut acc = ErrorAccumulator::new();
            acc.push(err);
            acc.absorb(handle.close().await);
            return Err(acc.finish().expect_err("至少包含 seek 错误"));
        }
        Ok(Box::new(HandleSectionReader {
            handle,
            remaining: len,
        }))
    }

    async fn close(self: Box<Self>) -> Result<(), RodsError> {
        Ok(())
    }
}

struct HandleSectionReader {
    handle: HandleRef,
    remaining: i64,
}

#[async_trait]
impl SectionReader for HandleSectionReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, RodsError> {
        if self.remaining <= 0 || buf.is_empty() {
            return Ok(0);
        }
        let len = (buf.len() as i64).min(self.remaining) as usize;
        let read = self.handle.handle().read(&mut buf[..len]).await?;
        if read == 0 {
            self.remaining = 0;
        } else {
            self.remaining -= read as i64;
        }
        Ok(read)
    }

    async fn close(mut self: Box<Self>) -> Result<(), RodsError> {
        self.handle.close().await
    }
}

/// 基于 seek-写-关闭-重开协议的范围写者。
pub struct ReopenRangeWriter {
    base: Option<Arc<Handle>>,
    reopen: ReopenFn,
}

impl ReopenRangeWriter {
    /// 以原点句柄与重开工厂构造。
    pub fn new(base: Arc<Handle>, reopen: ReopenFn) -> Self {
        Self {
            base: Some(base),
            reopen,
        }
    }
}

#[async_trait]
impl RangeWriter for ReopenRangeWriter {
    async fn range(&mut self, offset: i64, len: i64) -> Result<Box<dyn SectionWriter>, RodsError> {
        let handle = match self.base.take() {
            Some(base) => HandleRef::Shared(base),
            None => HandleRef::Owned(Some((self.reopen)().await?)),
        };
        if let Err(err) = handle.handle().seek(offset, Whence::Start).await {
            let mut handle = handle;
            let mut acc = ErrorAccumulator::new();
            acc.push(err);
            acc.absorb(handle.close().await);
            return Err(acc.finish().expect_err("至少包含 seek 错误"));
        }
        Ok(Box::new(HandleSectionWriter {
            handle,
            remaining: len,
        }))
    }

    async fn close(self: Box<Self>) -> Result<(), RodsError> {
        Ok(())
    }
}

struct HandleSectionWriter {
    handle: HandleRef,
    remaining: i64,
}

#[async_trait]
impl SectionWriter for HandleSectionWriter {
    async fn write(&mut self, data: &[u8]) -> Result<usize, RodsError> {
        if data.is_empty() {
            return Ok(0);
        }
        if (data.len() as i64) > self.remaining {
            return Err(RodsError::ShortWrite);
        }
        let written = self.handle.handle().write(data).await?;
        self.remaining -= written as i64;
        Ok(written)
    }

    async fn close(mut self: Box<Self>) -> Result<(), RodsError> {
        self.handle.close().await
    }
}

/// 本地文件的范围读者：每个区段独立打开一次文件并定位。
pub struct LocalRangeReader {
    local_path: PathBuf,
}

impl LocalRangeReader {
    /// 以本地路径构造。
    pub fn new(local_path: impl AsRef<Path>) -> Self {
        Self {
            local_path: local_path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl RangeReader for LocalRangeReader {
    async fn range(&mut self, offset: i64, len: i64) -> Result<Box<dyn SectionReader>, RodsError> {
        let mut file = tokio::fs::File::open(&self.local_path).await?;
        file.seek(SeekFrom::Start(offset as u64)).await?;
        Ok(Box::new(FileSectionReader {
            file,
            remaining: len,
        }))
    }

    async fn close(self: Box<Self>) -> Result<(), RodsError> {
        Ok(())
    }
}

struct FileSectionReader {
    file: tokio::fs::File,
    remaining: i64,
}

#[async_trait]
impl SectionReader for FileSectionReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, RodsError> {
        if self.remaining <= 0 || buf.is_empty() {
            return Ok(0);
        }
        let len = (buf.len() as i64).min(self.remaining) as usize;
        let read = self.file.read(&mut buf[..len]).await?;
        if read == 0 {
            self.remaining = 0;
        } else {
            self.remaining -= read as i64;
        }
        Ok(read)
    }

    async fn close(self: Box<Self>) -> Result<(), RodsError> {
        Ok(())
    }
}

/// 本地文件的范围写者：每个区段独立打开一次文件并定位写。
pub struct LocalRangeWriter {
    local_path: PathBuf,
}

impl LocalRangeWriter {
    /// 以本地路径构造；文件须已存在（调度方负责创建）。
    pub fn new(local_path: impl AsRef<Path>) -> Self {
        Self {
            local_path: local_path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl RangeWriter for LocalRangeWriter {
    async fn range(&mut self, offset: i64, len: i64) -> Result<Box<dyn SectionWriter>, RodsError> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&self.local_path)
            .await?;
        file.seek(SeekFrom::Start(offset as u64)).await?;
        Ok(Box::new(FileSectionWriter {
            file,
            remaining: len,
        }))
    }

    async fn close(self: Box<Self>) -> Result<(), RodsError> {
        Ok(())
    }
}

struct FileSectionWriter {
    file: tokio::fs::File,
    remaining: i64,
}

#[async_trait]
impl SectionWriter for FileSectionWriter {
    async fn write(&mut self, data: &[u8]) -> Result<usize, RodsError> {
        if data.is_empty() {
            return Ok(0);
        }
        if (data.len() as i64) > self.remaining {
            return Err(RodsError::ShortWrite);
        }
        self.file.write_all(data).await?;
        self.remaining -= data.len() as i64;
        Ok(data.len())
    }

    async fn close(mut self: Box<Self>) -> Result<(), RodsError> {
        self.file.flush().await?;
        Ok(())
    }
}
