//! 并行上传的场景测试。

mod common;

use common::{descriptor_info, sample_bytes};
use rods_client::Client;
use rods_core::api::{self, keywords};
use rods_core::contract::CallContext;
use rods_core::error::codes;
use rods_core::message::{ReplyBody, RequestBody};
use rods_core::test_stubs::{ScriptedConnection, ScriptedFactory, TraceEntry};
use rods_transfer::{TransferOptions, TransferWorker};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

fn write_payload(entry: &TraceEntry) -> Vec<u8> {
    match &entry.request {
        RequestBody::OpenedDataObj(_) => entry.payload.clone().expect("写请求应携带批量载荷"),
        other => panic!("应为描述符请求，实际为 {other:?}"),
    }
}

#[tokio::test]
async fn parallel_upload_reopens_on_second_connection() {
    let content = sample_bytes(300);

    let origin_conn = ScriptedConnection::new("origin")
        .reply(api::DATA_OBJ_CREATE, ReplyBody::Descriptor(3))
        .reply(api::GET_FILE_DESCRIPTOR_INFO, ReplyBody::Json(descriptor_info()))
        .reply(api::DATA_OBJ_WRITE, ReplyBody::Len(100))
        .reply(api::DATA_OBJ_WRITE, ReplyBody::Len(100))
        .reply(api::DATA_OBJ_CLOSE, ReplyBody::Empty);
    let origin_trace = origin_conn.trace();
    let child_conn = ScriptedConnection::new("child")
        .reply(api::DATA_OBJ_OPEN, ReplyBody::Descriptor(4))
        .reply(api::DATA_OBJ_LSEEK, ReplyBody::Offset(200))
        .reply(api::DATA_OBJ_WRITE, ReplyBody::Len(100))
        .reply(api::REPLICA_CLOSE, ReplyBody::Empty);
    let child_trace = child_conn.trace();
    let factory = Arc::new(ScriptedFactory::new([origin_conn, child_conn]));

    let dir = tempfile::tempdir().expect("应能创建临时目录");
    let local_path = dir.path().join("source.bin");
    std::fs::write(&local_path, &content).expect("应能写入样本文件");

    let transferred = Arc::new(AtomicI64::new(0));
    let counter = Arc::clone(&transferred);
    let options = TransferOptions {
        max_threads: 2,
        buffer_size: 100,
        min_range_size: 200,
        sync_mod_time: false,
        progress_handler: Some(Arc::new(move |event| {
            counter.fetch_add(event.increment, Ordering::AcqRel);
        })),
        ..TransferOptions::default()
    };
    let client = Client::new("alice", "tempZone", factory.clone());
    let worker = TransferWorker::new(client, options);
    let ctx = CallContext::background();

    worker
        .upload(&ctx, &local_path, "/tempZone/home/target.bin")
        .await
        .expect("并行上传应成功");

    let origin_trace = origin_trace.lock();
    // 原点连接：创建、重开所需的描述符信息、范围 [0,200) 的两次写、关闭。
    assert_eq!(origin_trace.len(), 5);
    assert_eq!(write_payload(&origin_trace[2]), &content[0..100]);
    assert_eq!(write_payload(&origin_trace[3]), &content[100..200]);
    drop(origin_trace);

    let child_trace = child_trace.lock();
    // 子连接：带令牌重开、seek 到 200、范围 [200,300) 的写、副本关闭。
    assert_eq!(child_trace.len(), 4);
    match &child_trace[0].request {
        RequestBody::DataObj(request) => {
            assert_eq!(request.options.get(keywords::REPLICA_TOKEN_KW), Some("token-1"));
        }
        other => panic!("应为数据对象请求，实际为 {other:?}"),
    }
    assert_eq!(write_payload(&child_trace[2]), &content[200..300]);
    drop(child_trace);

    assert_eq!(transferred.load(Ordering::Acquire), 300, "进度总量应为文件尺寸");
    factory.assert_all_closed();
}

#[tokio::test]
async fn hierarchy_error_renames_and_retries_exclusively() {
    let content = b"abc".to_vec();
    let failing = ScriptedConnection::new("first").fail(api::DATA_OBJ_CREATE, codes::HIERARCHY_ERROR);
    let rename = ScriptedConnection::new("rename").expect(api::DATA_OBJ_RENAME, |entry| {
        match &entry.request {
            RequestBody::DataObjCopy(request) => {
                assert_eq!(request.dst.path, "/tempZone/home/t.bin.bad");
            }
            other => panic!("应为两路径请求，实际为 {other:?}"),
        }
        Ok(rods_core::test_stubs::ScriptedReply::body(ReplyBody::Empty))
    });
    let retry = ScriptedConnection::new("retry")
        .expect(api::DATA_OBJ_CREATE, |entry| {
            match &entry.request {
                RequestBody::DataObj(request) => {
                    assert_eq!(request.open_flags & 0o200, 0o200, "重试必须带 O_EXCL");
                }
                other => panic!("应为数据对象请求，实际为 {other:?}"),
            }
            Ok(rods_core::test_stubs::ScriptedReply::body(
                ReplyBody::Descriptor(5),
            ))
        })
        .reply(api::DATA_OBJ_WRITE, ReplyBody::Len(3))
        .reply(api::DATA_OBJ_CLOSE, ReplyBody::Empty);
    let factory = Arc::new(ScriptedFactory::new([failing, rename, retry]));

    let dir = tempfile::tempdir().expect("应能创建临时目录");
    let local_path = dir.path().join("small.bin");
    std::fs::write(&local_path, &content).expect("应能写入样本文件");

    let options = TransferOptions {
        sync_mod_time: false,
        ..TransferOptions::default()
    };
    let client = Client::new("alice", "tempZone", factory.clone());
    let worker = TransferWorker::new(client, options);
    let ctx = CallContext::background();

    worker
        .upload(&ctx, &local_path, "/tempZone/home/t.bin")
        .await
        .expect("改名重试后上传应成功");
    factory.assert_all_closed();
}

#[tokio::test]
async fn failed_upload_removes_partial_object() {
    let origin = ScriptedConnection::new("origin")
        .reply(api::DATA_OBJ_CREATE, ReplyBody::Descriptor(3))
        .fail(api::DATA_OBJ_WRITE, -116000)
        .reply(api::DATA_OBJ_CLOSE, ReplyBody::Empty);
    let cleanup = ScriptedConnection::new("cleanup").expect(api::DATA_OBJ_UNLINK, |entry| {
        match &entry.request {
            RequestBody::DataObj(request) => {
                assert!(
                    request.options.contains(keywords::FORCE_FLAG_KW),
                    "清理删除必须带强制标志"
                );
            }
            other => panic!("应为数据对象请求，实际为 {other:?}"),
        }
        Ok(rods_core::test_stubs::ScriptedReply::body(ReplyBody::Empty))
    });
    let factory = Arc::new(ScriptedFactory::new([origin, cleanup]));

    let dir = tempfile::tempdir().expect("应能创建临时目录");
    let local_path = dir.path().join("bad.bin");
    std::fs::write(&local_path, b"abc").expect("应能写入样本文件");

    let options = TransferOptions {
        sync_mod_time: false,
        ..TransferOptions::default()
    };
    let client = Client::new("alice", "tempZone", factory.clone());
    let worker = TransferWorker::new(client, options);
    let ctx = CallContext::background();

    worker
        .upload(&ctx, &local_path, "/tempZone/home/bad.bin")
        .await
        .expect_err("写失败应向上传播");
    factory.assert_all_closed();
}
