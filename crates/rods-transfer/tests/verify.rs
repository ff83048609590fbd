//! 校验和验证的场景测试。

mod common;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rods_client::Client;
use rods_core::api;
use rods_core::contract::CallContext;
use rods_core::error::RodsError;
use rods_core::message::ReplyBody;
use rods_core::test_stubs::{ScriptedConnection, ScriptedFactory};
use rods_core::types::{DataObject, Replica};
use rods_transfer::{TransferOptions, TransferWorker};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

fn remote_object(checksum: &str) -> DataObject {
    DataObject {
        id: 11,
        collection_id: 1,
        path: "/tempZone/home/a.dat".to_string(),
        data_type: "generic".to_string(),
        replicas: vec![Replica {
            number: 0,
            size: 1600,
            owner: "alice".to_string(),
            owner_zone: "tempZone".to_string(),
            checksum: checksum.to_string(),
            status: "1".to_string(),
            resource_name: "demoResc".to_string(),
            physical_path: "/vault/a.dat".to_string(),
            resource_hierarchy: "demoResc".to_string(),
            created_at: UNIX_EPOCH,
            modified_at: UNIX_EPOCH,
        }],
    }
}

fn worker_with(factory: Arc<ScriptedFactory>) -> TransferWorker {
    let client = Client::new("alice", "tempZone", factory);
    TransferWorker::new(client, TransferOptions::default())
}

#[tokio::test]
async fn cached_sha2_checksum_short_circuits_server_request() {
    let content = "test".repeat(400);
    let digest = Sha256::digest(content.as_bytes());
    let encoded = BASE64.encode(digest);

    let dir = tempfile::tempdir().expect("应能创建临时目录");
    let local_path = dir.path().join("a.dat");
    std::fs::write(&local_path, &content).expect("应能写入样本文件");

    // 空工厂：任何连接请求都会立即失败，证明没有发校验和请求。
    let factory = Arc::new(ScriptedFactory::new([]));
    let worker = worker_with(factory);
    let ctx = CallContext::background();

    worker
        .verify_object(&ctx, &local_path, &remote_object(&format!("sha2:{encoded}")))
        .await
        .expect("缓存校验和一致时应直接通过");
}

#[tokio::test]
async fn checksum_mismatch_reports_both_digests() {
    let dir = tempfile::tempdir().expect("应能创建临时目录");
    let local_path = dir.path().join("a.dat");
    std::fs::write(&local_path, b"local-bytes").expect("应能写入样本文件");

    let remote_digest = Sha256::digest(b"remote-bytes");
    let encoded = BASE64.encode(remote_digest);
    let factory = Arc::new(ScriptedFactory::new([]));
    let worker = worker_with(factory);
    let ctx = CallContext::background();

    let err = worker
        .verify_object(&ctx, &local_path, &remote_object(&format!("sha2:{encoded}")))
        .await
        .expect_err("摘要不一致应报错");
    match err {
        RodsError::ChecksumMismatch { local, remote } => {
            assert_eq!(local, BASE64.encode(Sha256::digest(b"local-bytes")));
            assert_eq!(remote, encoded);
        }
        other => panic!("应为校验和不一致错误，实际为 {other:?}"),
    }
}

#[tokio::test]
async fn missing_cached_checksum_falls_back_to_server() {
    let content = b"fallback";
    let digest = Sha256::digest(content);
    let encoded = BASE64.encode(digest);

    let dir = tempfile::tempdir().expect("应能创建临时目录");
    let local_path = dir.path().join("a.dat");
    std::fs::write(&local_path, content).expect("应能写入样本文件");

    let conn = ScriptedConnection::new("checksum").reply(
        api::DATA_OBJ_CHKSUM,
        ReplyBody::Checksum(format!("sha2:{encoded}")),
    );
    let factory = Arc::new(ScriptedFactory::new([conn]));
    let worker = worker_with(factory.clone());
    let ctx = CallContext::background();

    worker
        .verify_object(&ctx, &local_path, &remote_object(""))
        .await
        .expect("服务端校验和一致时应通过");
    factory.assert_all_closed();
}
