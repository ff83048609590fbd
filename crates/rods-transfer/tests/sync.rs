//! 目录同步的场景测试。

mod common;

use common::{ObjectRow, data_objects_page};
use rods_client::Client;
use rods_core::api::{self, keywords};
use rods_core::contract::CallContext;
use rods_core::error::codes;
use rods_core::message::{ReplyBody, RequestBody};
use rods_core::test_stubs::{ScriptedConnection, ScriptedFactory, ScriptedReply};
use rods_core::types::unix_seconds;
use rods_transfer::{TransferOptions, TransferWorker};
use std::sync::Arc;

#[tokio::test]
async fn upload_dir_transfers_missing_file() {
    let factory = Arc::new(ScriptedFactory::new([
        ScriptedConnection::new("ensure-root").expect(api::COLL_CREATE, |entry| {
            match &entry.request {
                RequestBody::Collection(request) => {
                    assert!(
                        request.options.contains(keywords::RECURSIVE_OPR_KW),
                        "确保根集合应使用递归创建"
                    );
                }
                other => panic!("应为集合请求，实际为 {other:?}"),
            }
            Ok(ScriptedReply::body(ReplyBody::Empty))
        }),
        // 远端扫描：空树。
        ScriptedConnection::new("scan-subs").fail(api::GEN_QUERY, codes::CAT_NO_ROWS_FOUND),
        ScriptedConnection::new("scan-objs").fail(api::GEN_QUERY, codes::CAT_NO_ROWS_FOUND),
        // 唯一缺失文件的上传。
        ScriptedConnection::new("upload")
            .reply(api::DATA_OBJ_CREATE, ReplyBody::Descriptor(3))
            .reply(api::DATA_OBJ_WRITE, ReplyBody::Len(3))
            .reply(api::DATA_OBJ_CLOSE, ReplyBody::Empty),
    ]));

    let dir = tempfile::tempdir().expect("应能创建临时目录");
    std::fs::write(dir.path().join("a.txt"), b"abc").expect("应能写入样本文件");

    let options = TransferOptions {
        sync_mod_time: false,
        max_threads: 1,
        ..TransferOptions::default()
    };
    let client = Client::new("alice", "tempZone", factory.clone());
    let worker = TransferWorker::new(client, options);
    let ctx = CallContext::background();

    worker
        .upload_dir(&ctx, dir.path(), "/tempZone/home/dest")
        .await
        .expect("目录上传应成功");
    factory.assert_all_closed();
}

#[tokio::test]
async fn upload_dir_skips_file_with_matching_size_and_mtime() {
    let dir = tempfile::tempdir().expect("应能创建临时目录");
    let local_file = dir.path().join("a.txt");
    std::fs::write(&local_file, b"abc").expect("应能写入样本文件");
    let mtime_seconds = unix_seconds(
        std::fs::metadata(&local_file)
            .expect("应能读取元数据")
            .modified()
            .expect("应能读取修改时间"),
    );

    let factory = Arc::new(ScriptedFactory::new([
        ScriptedConnection::new("ensure-root").reply(api::COLL_CREATE, ReplyBody::Empty),
        ScriptedConnection::new("scan-subs").fail(api::GEN_QUERY, codes::CAT_NO_ROWS_FOUND),
        ScriptedConnection::new("scan-objs").reply(
            api::GEN_QUERY,
            data_objects_page(&[ObjectRow {
                data_id: 11,
                coll_id: 1,
                coll_path: "/tempZone/home/dest".to_string(),
                name: "a.txt".to_string(),
                size: 3,
                checksum: String::new(),
                modify_seconds: mtime_seconds,
            }]),
        ),
        // 尺寸与修改时间都一致：不应出现第四条连接。
    ]));

    let options = TransferOptions {
        sync_mod_time: false,
        max_threads: 1,
        ..TransferOptions::default()
    };
    let client = Client::new("alice", "tempZone", factory.clone());
    let worker = TransferWorker::new(client, options);
    let ctx = CallContext::background();

    worker
        .upload_dir(&ctx, dir.path(), "/tempZone/home/dest")
        .await
        .expect("同步应成功且无需传输");
    assert_eq!(factory.handed_out(), 3, "一致的文件不应触发上传");
    factory.assert_all_closed();
}

#[tokio::test]
async fn remove_dir_deletes_contents_before_collection() {
    let factory = Arc::new(ScriptedFactory::new([
        ScriptedConnection::new("list-subs").fail(api::GEN_QUERY, codes::CAT_NO_ROWS_FOUND),
        ScriptedConnection::new("list-objs").reply(
            api::GEN_QUERY,
            data_objects_page(&[ObjectRow {
                data_id: 11,
                coll_id: 1,
                coll_path: "/tempZone/home/gone".to_string(),
                name: "x.dat".to_string(),
                size: 3,
                checksum: String::new(),
                modify_seconds: 100,
            }]),
        ),
        ScriptedConnection::new("rm-obj").expect(api::DATA_OBJ_UNLINK, |entry| {
            match &entry.request {
                RequestBody::DataObj(request) => {
                    assert_eq!(request.path, "/tempZone/home/gone/x.dat");
                    assert!(request.options.contains(keywords::FORCE_FLAG_KW));
                }
                other => panic!("应为数据对象请求，实际为 {other:?}"),
            }
            Ok(ScriptedReply::body(ReplyBody::Empty))
        }),
        ScriptedConnection::new("rm-coll").expect(api::RM_COLL, |entry| {
            match &entry.request {
                RequestBody::Collection(request) => {
                    assert_eq!(request.path, "/tempZone/home/gone");
                }
                other => panic!("应为集合请求，实际为 {other:?}"),
            }
            Ok(ScriptedReply::body(ReplyBody::Empty))
        }),
    ]));

    let client = Client::new("alice", "tempZone", factory.clone());
    let worker = TransferWorker::new(client, TransferOptions::default());
    let ctx = CallContext::background();

    worker
        .remove_dir(&ctx, "/tempZone/home/gone")
        .await
        .expect("递归删除应成功");
    factory.assert_all_closed();
}

#[tokio::test]
async fn download_dir_creates_directories_and_fetches_files() {
    let factory = Arc::new(ScriptedFactory::new([
        // 远端树：一个子集合。
        ScriptedConnection::new("subs-root").reply(
            api::GEN_QUERY,
            {
                use rods_core::api::columns::*;
                common::gen_query_page(
                    vec![
                        (COL_COLL_ID, vec!["2".to_string()]),
                        (COL_COLL_OWNER_NAME, vec!["alice".to_string()]),
                        (COL_COLL_OWNER_ZONE, vec!["tempZone".to_string()]),
                        (COL_COLL_CREATE_TIME, vec!["100".to_string()]),
                        (COL_COLL_MODIFY_TIME, vec!["200".to_string()]),
                        (COL_COLL_INHERITANCE, vec!["0".to_string()]),
                        (COL_COLL_NAME, vec!["/tempZone/home/src/sub".to_string()]),
                    ],
                    0,
                )
            },
        ),
        ScriptedConnection::new("objs-root").fail(api::GEN_QUERY, codes::CAT_NO_ROWS_FOUND),
        ScriptedConnection::new("subs-sub").fail(api::GEN_QUERY, codes::CAT_NO_ROWS_FOUND),
        ScriptedConnection::new("objs-sub").reply(
            api::GEN_QUERY,
            data_objects_page(&[ObjectRow {
                data_id: 21,
                coll_id: 2,
                coll_path: "/tempZone/home/src/sub".to_string(),
                name: "f.bin".to_string(),
                size: 4,
                checksum: String::new(),
                modify_seconds: 100,
            }]),
        ),
        // 单文件下载。
        ScriptedConnection::new("download")
            .reply(api::DATA_OBJ_OPEN, ReplyBody::Descriptor(3))
            .reply(api::DATA_OBJ_LSEEK, ReplyBody::Offset(4))
            .reply(api::DATA_OBJ_LSEEK, ReplyBody::Offset(0))
            .expect(api::DATA_OBJ_READ, |_| {
                Ok(ScriptedReply::with_sink_bytes(
                    ReplyBody::Len(4),
                    b"data".to_vec(),
                ))
            })
            .reply(api::DATA_OBJ_CLOSE, ReplyBody::Empty),
    ]));

    let dir = tempfile::tempdir().expect("应能创建临时目录");
    let local_root = dir.path().join("mirror");

    let options = TransferOptions {
        sync_mod_time: false,
        max_threads: 1,
        ..TransferOptions::default()
    };
    let client = Client::new("alice", "tempZone", factory.clone());
    let worker = TransferWorker::new(client, options);
    let ctx = CallContext::background();

    worker
        .download_dir(&ctx, "/tempZone/home/src", &local_root)
        .await
        .expect("目录下载应成功");

    assert!(local_root.join("sub").is_dir(), "缺失的本地目录应被创建");
    assert_eq!(
        std::fs::read(local_root.join("sub/f.bin")).expect("应能读回文件"),
        b"data"
    );
    factory.assert_all_closed();
}
