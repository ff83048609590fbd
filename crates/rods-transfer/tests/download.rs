//! 并行下载的场景测试。

mod common;

use common::{descriptor_info, sample_bytes};
use rods_client::Client;
use rods_core::api;
use rods_core::contract::CallContext;
use rods_core::message::{ReplyBody, RequestBody};
use rods_core::test_stubs::{ScriptedConnection, ScriptedFactory, ScriptedReply};
use rods_transfer::{TransferOptions, TransferWorker};
use std::sync::Arc;

fn read_reply(content: &[u8], offset: usize, len: usize) -> ScriptedReply {
    let chunk = content[offset..offset + len].to_vec();
    ScriptedReply::with_sink_bytes(ReplyBody::Len(len as i64), chunk)
}

#[tokio::test]
async fn parallel_download_reassembles_ranges() {
    let content = sample_bytes(300);

    let origin_content = content.clone();
    let origin_tail = content.clone();
    let origin_conn = ScriptedConnection::new("origin")
        .reply(api::DATA_OBJ_OPEN, ReplyBody::Descriptor(3))
        .reply(api::DATA_OBJ_LSEEK, ReplyBody::Offset(300))
        .reply(api::DATA_OBJ_LSEEK, ReplyBody::Offset(0))
        .reply(api::GET_FILE_DESCRIPTOR_INFO, ReplyBody::Json(descriptor_info()))
        .expect(api::DATA_OBJ_READ, move |entry| {
            match &entry.request {
                RequestBody::OpenedDataObj(request) => assert_eq!(request.len, 100),
                other => panic!("应为描述符请求，实际为 {other:?}"),
            }
            Ok(read_reply(&origin_content, 0, 100))
        })
        .expect(api::DATA_OBJ_READ, move |_| Ok(read_reply(&origin_tail, 100, 100)))
        .reply(api::DATA_OBJ_CLOSE, ReplyBody::Empty);
    let child_content = content.clone();
    let child_conn = ScriptedConnection::new("child")
        .reply(api::DATA_OBJ_OPEN, ReplyBody::Descriptor(4))
        .reply(api::DATA_OBJ_LSEEK, ReplyBody::Offset(200))
        .expect(api::DATA_OBJ_READ, move |_| Ok(read_reply(&child_content, 200, 100)))
        .reply(api::REPLICA_CLOSE, ReplyBody::Empty);
    let factory = Arc::new(ScriptedFactory::new([origin_conn, child_conn]));

    let dir = tempfile::tempdir().expect("应能创建临时目录");
    let local_path = dir.path().join("restored.bin");

    let options = TransferOptions {
        max_threads: 2,
        buffer_size: 100,
        min_range_size: 200,
        sync_mod_time: false,
        ..TransferOptions::default()
    };
    let client = Client::new("alice", "tempZone", factory.clone());
    let worker = TransferWorker::new(client, options);
    let ctx = CallContext::background();

    worker
        .download(&ctx, "/tempZone/home/source.bin", &local_path)
        .await
        .expect("并行下载应成功");

    let restored = std::fs::read(&local_path).expect("应能读回本地文件");
    assert_eq!(restored, content, "并行区段必须重组出原始内容");
    factory.assert_all_closed();
}

#[tokio::test]
async fn failed_download_removes_partial_file() {
    let origin_conn = ScriptedConnection::new("origin")
        .reply(api::DATA_OBJ_OPEN, ReplyBody::Descriptor(3))
        .reply(api::DATA_OBJ_LSEEK, ReplyBody::Offset(10))
        .reply(api::DATA_OBJ_LSEEK, ReplyBody::Offset(0))
        .fail(api::DATA_OBJ_READ, -116000)
        .reply(api::DATA_OBJ_CLOSE, ReplyBody::Empty);
    let factory = Arc::new(ScriptedFactory::new([origin_conn]));

    let dir = tempfile::tempdir().expect("应能创建临时目录");
    let local_path = dir.path().join("partial.bin");

    let options = TransferOptions {
        sync_mod_time: false,
        ..TransferOptions::default()
    };
    let client = Client::new("alice", "tempZone", factory.clone());
    let worker = TransferWorker::new(client, options);
    let ctx = CallContext::background();

    worker
        .download(&ctx, "/tempZone/home/gone.bin", &local_path)
        .await
        .expect_err("读失败应向上传播");
    assert!(!local_path.exists(), "失败的下载必须删除半成品文件");
    factory.assert_all_closed();
}
