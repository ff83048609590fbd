//! 传输调度器：单文件的多连接范围拷贝。

use crate::options::{ErrorDisposition, TransferOptions};
use crate::progress::{ProgressTracker, TransferAction, notify};
use crate::sizing::range_size_with;
use rods_client::facade::Client;
use rods_client::handle::{Handle, OpenFlags};
use rods_client::range::{
    LocalRangeReader, LocalRangeWriter, RangeReader, RangeWriter, ReopenFn, ReopenRangeReader,
    ReopenRangeWriter, SectionReader, SectionWriter,
};
use rods_core::contract::CallContext;
use rods_core::error::{ErrorAccumulator, RodsError, codes};
use rods_core::message::Whence;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::task::JoinSet;

/// `TransferWorker` 把门面、选项与进度/错误回调绑在一起。
///
/// # 契约说明（What）
/// - 并行度取 [`TransferOptions::max_threads`]，为 0 时沿用门面配置；
/// - 所有错误先经错误处理器（目录同步路径），再并入聚合错误；
/// - 进度处理器从任意拷贝任务并发调用。
#[derive(Clone)]
pub struct TransferWorker {
    client: Client,
    options: TransferOptions,
}

impl TransferWorker {
    /// 以门面与选项构造调度器。
    pub fn new(client: Client, options: TransferOptions) -> Self {
        Self { client, options }
    }

    /// 门面。
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// 选项。
    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    pub(crate) fn threads(&self) -> usize {
        if self.options.max_threads == 0 {
            self.client.num_threads()
        } else {
            self.options.max_threads
        }
    }

    pub(crate) fn handle_error(&self, label: &str, err: &RodsError) -> ErrorDisposition {
        match &self.options.error_handler {
            Some(handler) => handler(label, err),
            None => ErrorDisposition::Abort,
        }
    }

    /// 为给定原点构造重开工厂：每次调用取一条新连接并重开。
    pub(crate) fn reopen_fn(&self, ctx: &CallContext, origin: &Arc<Handle>) -> ReopenFn {
        let client = self.client.clone();
        let ctx = ctx.child();
        let origin = Arc::clone(origin);
        Box::new(move || {
            let client = client.clone();
            let ctx = ctx.child();
            let origin = Arc::clone(&origin);
            let reopened: futures::future::BoxFuture<'static, Result<Handle, RodsError>> =
                Box::pin(async move {
                    let conn = client.factory().connect(&ctx).await?;
                    origin.reopen(conn).await
                });
            reopened
        })
    }

    /// 上传单个本地文件到远端数据对象。
    ///
    /// 服务端报层级冲突时，把既有对象改名为 `<path>.bad` 并以
    /// `O_EXCL` 重试一次；任何失败都会强制删除半成品远端对象。
    pub async fn upload(
        &self,
        ctx: &CallContext,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<(), RodsError> {
        ctx.ensure_active()?;
        let metadata = tokio::fs::metadata(local_path).await?;
        let size = metadata.len() as i64;
        let mtime = metadata.modified().ok();

        let origin = match self
            .client
            .create_data_object(ctx, remote_path, self.options.exclusive)
            .await
        {
            Ok(handle) => handle,
            Err(err) if err.is_code_class(codes::HIERARCHY_ERROR) => {
                tracing::warn!(path = remote_path, "hierarchy error, renaming existing object");
                self.client
                    .rename_data_object(ctx, remote_path, &format!("{remote_path}.bad"))
                    .await?;
                self.client.create_data_object(ctx, remote_path, true).await?
            }
            Err(err) => return Err(err),
        };
        let origin = Arc::new(origin);

        let tracker = Arc::new(ProgressTracker::new(
            remote_path,
            size,
            TransferAction::TransferFile,
            self.options.progress_handler.clone(),
        ));
        let reader: Box<dyn RangeReader> = Box::new(LocalRangeReader::new(local_path));
        let writer: Box<dyn RangeWriter> =
            Box::new(ReopenRangeWriter::new(Arc::clone(&origin), self.reopen_fn(ctx, &origin)));

        let mut acc = ErrorAccumulator::new();
        acc.absorb(
            self.run_parallel_copy(ctx, reader, writer, size, &tracker)
                .await,
        );
        if acc.is_empty() {
            if self.options.sync_mod_time {
                if let Some(mtime) = mtime {
                    origin.touch(Some(mtime));
                }
            }
        }
        acc.absorb(origin.close().await);

        match acc.finish() {
            Ok(()) => {
                tracker.finish();
                Ok(())
            }
            Err(err) => {
                tracing::warn!(path = remote_path, error = %err, "upload failed, removing partial object");
                let mut acc = ErrorAccumulator::new();
                acc.push(err);
                acc.absorb(self.client.delete_data_object(ctx, remote_path, true).await);
                acc.finish()
            }
        }
    }

    /// 下载远端数据对象到本地文件。
    pub async fn download(
        &self,
        ctx: &CallContext,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), RodsError> {
        ctx.ensure_active()?;
        let remote_mtime = if self.options.sync_mod_time {
            self.client
                .get_data_object(ctx, remote_path)
                .await?
                .modified_at()
        } else {
            None
        };

        let origin = self
            .client
            .open_data_object(ctx, remote_path, OpenFlags::READ_ONLY)
            .await?;
        // seek 到末尾再回退，探出对象尺寸。
        let size = match async {
            let size = origin.seek(0, Whence::End).await?;
            origin.seek(0, Whence::Start).await?;
            Ok::<i64, RodsError>(size)
        }
        .await
        {
            Ok(size) => size,
            Err(err) => {
                let mut acc = ErrorAccumulator::new();
                acc.push(err);
                acc.absorb(origin.close().await);
                return Err(acc.finish().expect_err("至少包含 seek 错误"));
            }
        };
        let origin = Arc::new(origin);

        let file = tokio::fs::File::create(local_path).await?;
        file.set_len(size as u64).await?;
        drop(file);

        let tracker = Arc::new(ProgressTracker::new(
            remote_path,
            size,
            TransferAction::TransferFile,
            self.options.progress_handler.clone(),
        ));
        let reader: Box<dyn RangeReader> =
            Box::new(ReopenRangeReader::new(Arc::clone(&origin), self.reopen_fn(ctx, &origin)));
        let writer: Box<dyn RangeWriter> = Box::new(LocalRangeWriter::new(local_path));

        let mut acc = ErrorAccumulator::new();
        acc.absorb(
            self.run_parallel_copy(ctx, reader, writer, size, &tracker)
                .await,
        );
        acc.absorb(origin.close().await);

        match acc.finish() {
            Ok(()) => {
                if let Some(mtime) = remote_mtime {
                    set_local_mtime(local_path, mtime).await?;
                    notify(
                        &self.options.progress_handler,
                        remote_path,
                        TransferAction::SetModificationTime,
                    );
                }
                tracker.finish();
                Ok(())
            }
            Err(err) => {
                tracing::warn!(path = remote_path, error = %err, "download failed, removing partial file");
                let mut acc = ErrorAccumulator::new();
                acc.push(err);
                if let Err(remove_err) = tokio::fs::remove_file(local_path).await {
                    acc.push(remove_err.into());
                }
                acc.finish()
            }
        }
    }

    /// 把文件切成范围并发拷贝：先串行开出全部区段，再并发执行。
    async fn run_parallel_copy(
        &self,
        ctx: &CallContext,
        mut reader: Box<dyn RangeReader>,
        mut writer: Box<dyn RangeWriter>,
        size: i64,
        tracker: &Arc<ProgressTracker>,
    ) -> Result<(), RodsError> {
        let range_size = range_size_with(
            size,
            self.threads(),
            self.options.buffer_size as i64,
            self.options.min_range_size,
        );
        let mut sections: Vec<(Box<dyn SectionReader>, Box<dyn SectionWriter>)> = Vec::new();
        let mut offset = 0;
        let mut creation_error = None;
        while offset < size {
            if let Err(err) = ctx.ensure_active() {
                creation_error = Some(err);
                break;
            }
            let len = range_size.min(size - offset);
            let section_reader = match reader.range(offset, len).await {
                Ok(section) => section,
                Err(err) => {
                    creation_error = Some(err);
                    break;
                }
            };
            match writer.range(offset, len).await {
                Ok(section_writer) => sections.push((section_reader, section_writer)),
                Err(err) => {
                    creation_error = Some(err);
                    let mut acc = ErrorAccumulator::new();
                    acc.absorb(section_reader.close().await);
                    if let Err(close_err) = acc.finish() {
                        tracing::debug!(error = %close_err, "closing reader section after failure");
                    }
                    break;
                }
            }
            offset += len;
        }

        if let Some(err) = creation_error {
            // 已开出的区段必须关闭，否则原点会在子句柄栅栏上悬挂。
            let mut acc = ErrorAccumulator::new();
            acc.push(err);
            for (section_reader, section_writer) in sections {
                acc.absorb(section_writer.close().await);
                acc.absorb(section_reader.close().await);
            }
            acc.absorb(reader.close().await);
            acc.absorb(writer.close().await);
            return acc.finish();
        }

        let mut join = JoinSet::new();
        for (section_reader, section_writer) in sections {
            let ctx = ctx.child();
            let tracker = Arc::clone(tracker);
            let buffer_size = self.options.buffer_size;
            join.spawn(async move {
                copy_section(&ctx, section_reader, section_writer, buffer_size, tracker).await
            });
        }
        let mut acc = ErrorAccumulator::new();
        while let Some(joined) = join.join_next().await {
            match joined {
                Ok(step) => acc.absorb(step),
                Err(join_err) => acc.push(std::io::Error::other(join_err).into()),
            }
        }
        acc.absorb(reader.close().await);
        acc.absorb(writer.close().await);
        acc.finish()
    }
}

/// 单个区段的拷贝循环；进度经 tee 计数器上报。
async fn copy_section(
    ctx: &CallContext,
    mut reader: Box<dyn SectionReader>,
    mut writer: Box<dyn SectionWriter>,
    buffer_size: usize,
    tracker: Arc<ProgressTracker>,
) -> Result<(), RodsError> {
    let mut buf = vec![0_u8; buffer_size.max(1)];
    let copy_result = async {
        loop {
            ctx.ensure_active()?;
            let read = reader.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            let mut written = 0;
            while written < read {
                ctx.ensure_active()?;
                let n = writer.write(&buf[written..read]).await?;
                if n == 0 {
                    return Err(RodsError::ShortWrite);
                }
                written += n;
                tracker.add(n as i64);
            }
        }
        Ok(())
    }
    .await;
    let mut acc = ErrorAccumulator::new();
    acc.absorb(copy_result);
    acc.absorb(writer.close().await);
    acc.absorb(reader.close().await);
    acc.finish()
}

/// 把远端修改时间写回本地文件。
async fn set_local_mtime(local_path: &Path, mtime: SystemTime) -> Result<(), RodsError> {
    let local_path = local_path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(), RodsError> {
        let file = std::fs::OpenOptions::new().write(true).open(&local_path)?;
        file.set_modified(mtime)?;
        Ok(())
    })
    .await
    .map_err(|err| RodsError::Io(std::io::Error::other(err)))?
}
