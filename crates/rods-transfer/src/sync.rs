//! 目录级同步：本地漫游、远端扫描与传输分发的三任务协作。
//!
//! 两侧都以“兄弟按名排序、目录就地递归”的深度优先次序产出条目，
//! 游标按同一次序归并推进；跳过策略按既定顺序判定：对端缺失先传、
//! 独占先跳、尺寸不符先传、校验和相等跳过、修改时间相等跳过。

use crate::options::ErrorDisposition;
use crate::progress::{TransferAction, notify};
use crate::verify::{decode_sha2_checksum, local_sha256};
use crate::worker::TransferWorker;
use futures::future::BoxFuture;
use rods_client::facade::Client;
use rods_core::contract::CallContext;
use rods_core::error::{ErrorAccumulator, RodsError};
use rods_core::path;
use rods_core::types::{Collection, DataObject, unix_seconds};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::mpsc;

/// 深度优先次序下的路径比较：逐段比较，目录前缀先于更长的兄弟名。
fn dfs_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.split('/').filter(|segment| !segment.is_empty());
    let mut right = b.split('/').filter(|segment| !segment.is_empty());
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match x.cmp(y) {
                Ordering::Equal => {}
                other => return other,
            },
        }
    }
}

/// 远端树的一个节点。
enum RemoteNode {
    Collection(Collection),
    Object(DataObject),
}

impl RemoteNode {
    fn name(&self) -> &str {
        match self {
            Self::Collection(coll) => path::base_name(&coll.path),
            Self::Object(object) => object.name(),
        }
    }
}

struct RemoteEntry {
    rel: String,
    node: RemoteNode,
}

/// 本地树的一个节点。
enum LocalNode {
    Directory,
    File {
        size: i64,
        mtime: Option<SystemTime>,
        local_path: PathBuf,
    },
}

struct LocalEntry {
    rel: String,
    node: LocalNode,
}

/// 扫描流上的归并游标。
struct Cursor<T> {
    rx: mpsc::Receiver<T>,
    current: Option<T>,
}

impl<T> Cursor<T> {
    fn new(rx: mpsc::Receiver<T>) -> Self {
        Self { rx, current: None }
    }

    async fn advance_past(&mut self, target_rel: &str, rel_of: impl Fn(&T) -> &str) {
        loop {
            if self.current.is_none() {
                self.current = self.rx.recv().await;
                if self.current.is_none() {
                    return;
                }
            }
            let behind = {
                let entry = self.current.as_ref().expect("上一步已填充当前条目");
                dfs_cmp(rel_of(entry), target_rel) == Ordering::Less
            };
            if behind {
                self.current = None;
            } else {
                return;
            }
        }
    }

    fn take_if(&mut self, rel: &str, rel_of: impl Fn(&T) -> &str) -> Option<T> {
        let matched = self
            .current
            .as_ref()
            .is_some_and(|entry| rel_of(entry) == rel);
        if matched { self.current.take() } else { None }
    }
}

fn child_rel(rel: &str, name: &str) -> String {
    if rel.is_empty() {
        name.to_string()
    } else {
        format!("{rel}/{name}")
    }
}

/// 列出集合的直接子节点并按名归并排序。
async fn list_merged(
    client: &Client,
    ctx: &CallContext,
    coll_path: &str,
) -> Result<Vec<RemoteNode>, RodsError> {
    let subs = client.list_sub_collections(ctx, coll_path).await?;
    let objects = client.list_data_objects(ctx, coll_path).await?;
    let mut nodes: Vec<RemoteNode> = subs
        .into_iter()
        .map(RemoteNode::Collection)
        .chain(objects.into_iter().map(RemoteNode::Object))
        .collect();
    nodes.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(nodes)
}

/// 远端扫描器：深度优先地把树灌进通道；接收端关闭即视为正常退出。
fn scan_remote(
    client: Client,
    ctx: CallContext,
    coll_path: String,
    rel: String,
    tx: mpsc::Sender<RemoteEntry>,
) -> BoxFuture<'static, Result<(), RodsError>> {
    Box::pin(async move {
        ctx.ensure_active()?;
        for node in list_merged(&client, &ctx, &coll_path).await? {
            let entry_rel = child_rel(&rel, node.name());
            match node {
                RemoteNode::Collection(coll) => {
                    let sub_path = coll.path.clone();
                    if tx
                        .send(RemoteEntry {
                            rel: entry_rel.clone(),
                            node: RemoteNode::Collection(coll),
                        })
                        .await
                        .is_err()
                    {
                        return Ok(());
                    }
                    scan_remote(client.clone(), ctx.child(), sub_path, entry_rel, tx.clone())
                        .await?;
                }
                RemoteNode::Object(object) => {
                    if tx
                        .send(RemoteEntry {
                            rel: entry_rel,
                            node: RemoteNode::Object(object),
                        })
                        .await
                        .is_err()
                    {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    })
}

/// 本地扫描器：与远端扫描器同构的深度优先产出。
fn scan_local(
    dir: PathBuf,
    rel: String,
    tx: mpsc::Sender<LocalEntry>,
) -> BoxFuture<'static, Result<(), RodsError>> {
    Box::pin(async move {
        let mut names = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        for name in names {
            let child = dir.join(&name);
            let entry_rel = child_rel(&rel, &name);
            let metadata = tokio::fs::metadata(&child).await?;
            if metadata.is_dir() {
                if tx
                    .send(LocalEntry {
                        rel: entry_rel.clone(),
                        node: LocalNode::Directory,
                    })
                    .await
                    .is_err()
                {
                    return Ok(());
                }
                scan_local(child, entry_rel, tx.clone()).await?;
            } else {
                if tx
                    .send(LocalEntry {
                        rel: entry_rel,
                        node: LocalNode::File {
                            size: metadata.len() as i64,
                            mtime: metadata.modified().ok(),
                            local_path: child,
                        },
                    })
                    .await
                    .is_err()
                {
                    return Ok(());
                }
            }
        }
        Ok(())
    })
}

/// 分发队列里的一个同步动作。
enum SyncJob {
    Upload { local: PathBuf, remote: String },
    Download { remote: String, local: PathBuf },
    Copy { src: String, dst: String },
    RemoveObject { path: String },
    RemoveCollection { path: String },
}

impl SyncJob {
    fn label(&self) -> &str {
        match self {
            Self::Upload { remote, .. } => remote,
            Self::Download { remote, .. } => remote,
            Self::Copy { dst, .. } => dst,
            Self::RemoveObject { path } => path,
            Self::RemoveCollection { path } => path,
        }
    }
}

/// 分发器：顺序消费队列，错误经错误处理器决定续行或终止。
async fn dispatch_jobs(
    worker: TransferWorker,
    ctx: CallContext,
    mut rx: mpsc::Receiver<SyncJob>,
) -> Result<(), RodsError> {
    let mut acc = ErrorAccumulator::new();
    while let Some(job) = rx.recv().await {
        if ctx.ensure_active().is_err() {
            break;
        }
        let label = job.label().to_string();
        if let Err(err) = worker.run_job(&ctx, job).await {
            let disposition = worker.handle_error(&label, &err);
            acc.push(err);
            if disposition == ErrorDisposition::Abort {
                break;
            }
        }
    }
    acc.finish()
}

impl TransferWorker {
    async fn run_job(&self, ctx: &CallContext, job: SyncJob) -> Result<(), RodsError> {
        match job {
            SyncJob::Upload { local, remote } => self.upload(ctx, &local, &remote).await,
            SyncJob::Download { remote, local } => self.download(ctx, &remote, &local).await,
            SyncJob::Copy { src, dst } => {
                self.client().copy_data_object(ctx, &src, &dst).await?;
                notify(
                    &self.options().progress_handler,
                    &dst,
                    TransferAction::RegisterFile,
                );
                Ok(())
            }
            SyncJob::RemoveObject { path } => {
                self.client().delete_data_object(ctx, &path, true).await?;
                notify(
                    &self.options().progress_handler,
                    &path,
                    TransferAction::RemoveFile,
                );
                Ok(())
            }
            SyncJob::RemoveCollection { path } => {
                self.client().delete_collection(ctx, &path, false, true).await?;
                notify(
                    &self.options().progress_handler,
                    &path,
                    TransferAction::RemoveDirectory,
                );
                Ok(())
            }
        }
    }

    /// 依策略判定本地文件是否需要上传。
    async fn should_upload(
        &self,
        ctx: &CallContext,
        local_path: &Path,
        size: i64,
        mtime: Option<SystemTime>,
        remote: Option<&DataObject>,
    ) -> Result<bool, RodsError> {
        let Some(remote) = remote else {
            return Ok(true);
        };
        if self.options().exclusive {
            return Ok(false);
        }
        if remote.size() != size {
            return Ok(true);
        }
        if self.options().verify_checksums {
            if let Some(remote_digest) = remote
                .current_replica()
                .and_then(|replica| replica.sha2_checksum())
                .and_then(|checksum| decode_sha2_checksum(checksum.base64).ok())
            {
                let local_digest = local_sha256(ctx, local_path).await?;
                return Ok(local_digest != remote_digest);
            }
        }
        let remote_secs = remote.modified_at().map(unix_seconds);
        let local_secs = mtime.map(unix_seconds);
        match (local_secs, remote_secs) {
            (Some(local), Some(remote)) if local == remote => Ok(false),
            _ => Ok(true),
        }
    }

    /// 依策略判定远端对象是否需要下载。
    async fn should_download(
        &self,
        ctx: &CallContext,
        remote: &DataObject,
        local: Option<&LocalEntry>,
    ) -> Result<bool, RodsError> {
        let Some(LocalEntry {
            node:
                LocalNode::File {
                    size,
                    mtime,
                    local_path,
                },
            ..
        }) = local
        else {
            return Ok(true);
        };
        if self.options().exclusive {
            return Ok(false);
        }
        if remote.size() != *size {
            return Ok(true);
        }
        if self.options().verify_checksums {
            if let Some(remote_digest) = remote
                .current_replica()
                .and_then(|replica| replica.sha2_checksum())
                .and_then(|checksum| decode_sha2_checksum(checksum.base64).ok())
            {
                let local_digest = local_sha256(ctx, local_path).await?;
                return Ok(local_digest != remote_digest);
            }
        }
        let remote_secs = remote.modified_at().map(unix_seconds);
        let local_secs = mtime.map(unix_seconds);
        match (local_secs, remote_secs) {
            (Some(local), Some(remote)) if local == remote => Ok(false),
            _ => Ok(true),
        }
    }

    fn walk_local_against_remote<'a>(
        &'a self,
        ctx: &'a CallContext,
        local_dir: PathBuf,
        rel: String,
        remote_root: &'a str,
        cursor: &'a mut Cursor<RemoteEntry>,
        jobs: &'a mpsc::Sender<SyncJob>,
    ) -> BoxFuture<'a, Result<(), RodsError>> {
        Box::pin(async move {
            let mut names = Vec::new();
            let mut read_dir = tokio::fs::read_dir(&local_dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
            names.sort();
            for name in names {
                ctx.ensure_active()?;
                let local_child = local_dir.join(&name);
                let entry_rel = child_rel(&rel, &name);
                let remote_path = path::join(remote_root, &entry_rel);
                cursor.advance_past(&entry_rel, |entry| entry.rel.as_str()).await;
                let metadata = tokio::fs::metadata(&local_child).await?;
                if metadata.is_dir() {
                    let matched = cursor.take_if(&entry_rel, |entry| entry.rel.as_str());
                    let exists = matches!(
                        matched,
                        Some(RemoteEntry {
                            node: RemoteNode::Collection(_),
                            ..
                        })
                    );
                    if !exists {
                        self.client().create_collection_all(ctx, &remote_path).await?;
                        notify(
                            &self.options().progress_handler,
                            &remote_path,
                            TransferAction::CreateDirectory,
                        );
                    }
                    self.walk_local_against_remote(
                        ctx,
                        local_child,
                        entry_rel,
                        remote_root,
                        cursor,
                        jobs,
                    )
                    .await?;
                } else {
                    let matched = cursor.take_if(&entry_rel, |entry| entry.rel.as_str());
                    let remote_object = match &matched {
                        Some(RemoteEntry {
                            node: RemoteNode::Object(object),
                            ..
                        }) => Some(object),
                        _ => None,
                    };
                    let transfer = self
                        .should_upload(
                            ctx,
                            &local_child,
                            metadata.len() as i64,
                            metadata.modified().ok(),
                            remote_object,
                        )
                        .await?;
                    if transfer {
                        let job = SyncJob::Upload {
                            local: local_child,
                            remote: remote_path,
                        };
                        if jobs.send(job).await.is_err() {
                            // 分发器已终止；其错误在汇合处返回。
                            return Ok(());
                        }
                    }
                }
            }
            Ok(())
        })
    }

    /// 把本地目录树同步上传到远端集合树。
    pub async fn upload_dir(
        &self,
        ctx: &CallContext,
        local_root: &Path,
        remote_root: &str,
    ) -> Result<(), RodsError> {
        ctx.ensure_active()?;
        let remote_root = path::clean(remote_root);
        self.client().create_collection_all(ctx, &remote_root).await?;

        let queue = self.options().max_queued.max(1);
        let (remote_tx, remote_rx) = mpsc::channel(queue);
        let scanner = tokio::spawn(scan_remote(
            self.client().clone(),
            ctx.child(),
            remote_root.clone(),
            String::new(),
            remote_tx,
        ));
        let (job_tx, job_rx) = mpsc::channel(queue);
        let dispatcher = tokio::spawn(dispatch_jobs(self.clone(), ctx.child(), job_rx));

        let mut cursor = Cursor::new(remote_rx);
        let walk_result = self
            .walk_local_against_remote(
                ctx,
                local_root.to_path_buf(),
                String::new(),
                &remote_root,
                &mut cursor,
                &job_tx,
            )
            .await;
        drop(job_tx);
        drop(cursor);

        let mut acc = ErrorAccumulator::new();
        acc.absorb(walk_result);
        match dispatcher.await {
            Ok(result) => acc.absorb(result),
            Err(join_err) => acc.push(std::io::Error::other(join_err).into()),
        }
        match scanner.await {
            Ok(result) => acc.absorb(result),
            Err(join_err) => acc.push(std::io::Error::other(join_err).into()),
        }
        acc.finish()
    }

    fn walk_remote_against_local<'a>(
        &'a self,
        ctx: &'a CallContext,
        coll_path: String,
        rel: String,
        local_root: &'a Path,
        cursor: &'a mut Cursor<LocalEntry>,
        jobs: &'a mpsc::Sender<SyncJob>,
    ) -> BoxFuture<'a, Result<(), RodsError>> {
        Box::pin(async move {
            for node in list_merged(self.client(), ctx, &coll_path).await? {
                ctx.ensure_active()?;
                let entry_rel = child_rel(&rel, node.name());
                let local_path = local_root.join(&entry_rel);
                cursor.advance_past(&entry_rel, |entry| entry.rel.as_str()).await;
                match node {
                    RemoteNode::Collection(coll) => {
                        let matched = cursor.take_if(&entry_rel, |entry| entry.rel.as_str());
                        let exists =
                            matches!(matched, Some(LocalEntry { node: LocalNode::Directory, .. }));
                        if !exists {
                            create_local_dir(&local_path).await?;
                            notify(
                                &self.options().progress_handler,
                                &local_path.to_string_lossy(),
                                TransferAction::CreateDirectory,
                            );
                        }
                        self.walk_remote_against_local(
                            ctx,
                            coll.path.clone(),
                            entry_rel,
                            local_root,
                            cursor,
                            jobs,
                        )
                        .await?;
                    }
                    RemoteNode::Object(object) => {
                        let matched = cursor.take_if(&entry_rel, |entry| entry.rel.as_str());
                        let transfer = self.should_download(ctx, &object, matched.as_ref()).await?;
                        if transfer {
                            let job = SyncJob::Download {
                                remote: object.path.clone(),
                                local: local_path,
                            };
                            if jobs.send(job).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                }
            }
            Ok(())
        })
    }

    /// 把远端集合树同步下载到本地目录树。
    pub async fn download_dir(
        &self,
        ctx: &CallContext,
        remote_root: &str,
        local_root: &Path,
    ) -> Result<(), RodsError> {
        ctx.ensure_active()?;
        let remote_root = path::clean(remote_root);
        create_local_dir(local_root).await?;

        let queue = self.options().max_queued.max(1);
        let (local_tx, local_rx) = mpsc::channel(queue);
        let scanner = tokio::spawn(scan_local(local_root.to_path_buf(), String::new(), local_tx));
        let (job_tx, job_rx) = mpsc::channel(queue);
        let dispatcher = tokio::spawn(dispatch_jobs(self.clone(), ctx.child(), job_rx));

        let mut cursor = Cursor::new(local_rx);
        let walk_result = self
            .walk_remote_against_local(
                ctx,
                remote_root,
                String::new(),
                local_root,
                &mut cursor,
                &job_tx,
            )
            .await;
        drop(job_tx);
        drop(cursor);

        let mut acc = ErrorAccumulator::new();
        acc.absorb(walk_result);
        match dispatcher.await {
            Ok(result) => acc.absorb(result),
            Err(join_err) => acc.push(std::io::Error::other(join_err).into()),
        }
        match scanner.await {
            Ok(result) => acc.absorb(result),
            Err(join_err) => acc.push(std::io::Error::other(join_err).into()),
        }
        acc.finish()
    }

    fn walk_copy<'a>(
        &'a self,
        ctx: &'a CallContext,
        src_dir: String,
        rel: String,
        dst_root: &'a str,
        cursor: &'a mut Cursor<RemoteEntry>,
        jobs: &'a mpsc::Sender<SyncJob>,
    ) -> BoxFuture<'a, Result<(), RodsError>> {
        Box::pin(async move {
            for node in list_merged(self.client(), ctx, &src_dir).await? {
                ctx.ensure_active()?;
                let entry_rel = child_rel(&rel, node.name());
                let dst_path = path::join(dst_root, &entry_rel);
                cursor.advance_past(&entry_rel, |entry| entry.rel.as_str()).await;
                let matched = cursor.take_if(&entry_rel, |entry| entry.rel.as_str());
                match node {
                    RemoteNode::Collection(coll) => {
                        let exists = matches!(
                            matched,
                            Some(RemoteEntry {
                                node: RemoteNode::Collection(_),
                                ..
                            })
                        );
                        if !exists {
                            self.client().create_collection_all(ctx, &dst_path).await?;
                            notify(
                                &self.options().progress_handler,
                                &dst_path,
                                TransferAction::CreateDirectory,
                            );
                        }
                        self.walk_copy(ctx, coll.path.clone(), entry_rel, dst_root, cursor, jobs)
                            .await?;
                    }
                    RemoteNode::Object(object) => {
                        let copy = match &matched {
                            Some(RemoteEntry {
                                node: RemoteNode::Object(existing),
                                ..
                            }) => {
                                if self.options().exclusive {
                                    false
                                } else {
                                    existing.size() != object.size()
                                }
                            }
                            _ => true,
                        };
                        if copy {
                            let job = SyncJob::Copy {
                                src: object.path.clone(),
                                dst: dst_path,
                            };
                            if jobs.send(job).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                }
            }
            Ok(())
        })
    }

    /// 远端到远端的目录树拷贝。
    pub async fn copy_dir(
        &self,
        ctx: &CallContext,
        src_root: &str,
        dst_root: &str,
    ) -> Result<(), RodsError> {
        ctx.ensure_active()?;
        let src_root = path::clean(src_root);
        let dst_root = path::clean(dst_root);
        self.client().create_collection_all(ctx, &dst_root).await?;

        let queue = self.options().max_queued.max(1);
        let (dst_tx, dst_rx) = mpsc::channel(queue);
        let scanner = tokio::spawn(scan_remote(
            self.client().clone(),
            ctx.child(),
            dst_root.clone(),
            String::new(),
            dst_tx,
        ));
        let (job_tx, job_rx) = mpsc::channel(queue);
        let dispatcher = tokio::spawn(dispatch_jobs(self.clone(), ctx.child(), job_rx));

        let mut cursor = Cursor::new(dst_rx);
        let walk_result = self
            .walk_copy(ctx, src_root, String::new(), &dst_root, &mut cursor, &job_tx)
            .await;
        drop(job_tx);
        drop(cursor);

        let mut acc = ErrorAccumulator::new();
        acc.absorb(walk_result);
        match dispatcher.await {
            Ok(result) => acc.absorb(result),
            Err(join_err) => acc.push(std::io::Error::other(join_err).into()),
        }
        match scanner.await {
            Ok(result) => acc.absorb(result),
            Err(join_err) => acc.push(std::io::Error::other(join_err).into()),
        }
        acc.finish()
    }

    fn walk_remove<'a>(
        &'a self,
        ctx: &'a CallContext,
        coll_path: String,
        jobs: &'a mpsc::Sender<SyncJob>,
    ) -> BoxFuture<'a, Result<(), RodsError>> {
        Box::pin(async move {
            for node in list_merged(self.client(), ctx, &coll_path).await? {
                ctx.ensure_active()?;
                match node {
                    RemoteNode::Collection(coll) => {
                        self.walk_remove(ctx, coll.path.clone(), jobs).await?;
                    }
                    RemoteNode::Object(object) => {
                        let job = SyncJob::RemoveObject {
                            path: object.path.clone(),
                        };
                        if jobs.send(job).await.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
            // 内容的删除任务都已入队，FIFO 保证先于本集合执行。
            let job = SyncJob::RemoveCollection { path: coll_path };
            let _ = jobs.send(job).await;
            Ok(())
        })
    }

    /// 递归删除远端集合树（含根集合自身）。
    pub async fn remove_dir(&self, ctx: &CallContext, remote_root: &str) -> Result<(), RodsError> {
        ctx.ensure_active()?;
        let remote_root = path::clean(remote_root);
        let queue = self.options().max_queued.max(1);
        let (job_tx, job_rx) = mpsc::channel(queue);
        let dispatcher = tokio::spawn(dispatch_jobs(self.clone(), ctx.child(), job_rx));

        let walk_result = self.walk_remove(ctx, remote_root, &job_tx).await;
        drop(job_tx);

        let mut acc = ErrorAccumulator::new();
        acc.absorb(walk_result);
        match dispatcher.await {
            Ok(result) => acc.absorb(result),
            Err(join_err) => acc.push(std::io::Error::other(join_err).into()),
        }
        acc.finish()
    }
}

async fn create_local_dir(dir: &Path) -> Result<(), RodsError> {
    tokio::fs::create_dir_all(dir).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o755)).await?;
    }
    Ok(())
}
