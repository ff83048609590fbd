//! 分页查询引擎的场景测试。

mod common;

use common::gen_query_page;
use rods_client::Client;
use rods_core::api;
use rods_core::api::columns::COL_COLL_NAME;
use rods_core::contract::CallContext;
use rods_core::error::{RodsError, codes};
use rods_core::message::RequestBody;
use rods_core::test_stubs::{ScriptedConnection, ScriptedFactory};
use std::sync::Arc;

fn client_with(factory: ScriptedFactory) -> (Client, Arc<ScriptedFactory>) {
    let factory = Arc::new(factory);
    let client = Client::new("alice", "tempZone", factory.clone());
    (client, factory)
}

#[tokio::test]
async fn three_pages_deliver_rows_in_order() {
    let conn = ScriptedConnection::new("query")
        .reply(
            api::GEN_QUERY,
            gen_query_page(vec![(COL_COLL_NAME, vec!["r1"])], 7),
        )
        .reply(
            api::GEN_QUERY,
            gen_query_page(vec![(COL_COLL_NAME, vec!["r2"])], 9),
        )
        .reply(
            api::GEN_QUERY,
            gen_query_page(vec![(COL_COLL_NAME, vec!["r3"])], 0),
        );
    let trace = conn.trace();
    let (client, factory) = client_with(ScriptedFactory::new([conn]));

    let ctx = CallContext::background();
    let mut result = client
        .query(vec![COL_COLL_NAME])
        .execute(&ctx)
        .await
        .expect("查询应成功");

    let mut rows = Vec::new();
    while result.next().await.expect("翻页应成功") {
        let mut value = String::new();
        result.scan((&mut value,)).expect("扫描应成功");
        rows.push(value);
    }
    assert_eq!(rows, vec!["r1", "r2", "r3"]);
    // 自然耗尽后再关闭不应再发续传请求。
    result.close().await.expect("关闭应幂等");

    let trace = trace.lock();
    assert_eq!(trace.len(), 3);
    let continue_indexes: Vec<i64> = trace
        .iter()
        .map(|entry| match &entry.request {
            RequestBody::GenQuery(query) => query.continue_index,
            other => panic!("应为查询请求，实际为 {other:?}"),
        })
        .collect();
    assert_eq!(continue_indexes, vec![0, 7, 9]);
    drop(trace);
    factory.assert_all_closed();
}

#[tokio::test]
async fn no_rows_found_is_end_of_results() {
    let conn = ScriptedConnection::new("empty").fail(api::GEN_QUERY, codes::CAT_NO_ROWS_FOUND);
    let (client, factory) = client_with(ScriptedFactory::new([conn]));

    let ctx = CallContext::background();
    let mut result = client
        .query(vec![COL_COLL_NAME])
        .execute(&ctx)
        .await
        .expect("无行错误应被吸收为空游标");
    assert!(!result.next().await.expect("空游标翻页不应报错"));
    assert!(matches!(result.scan((&mut 0_i64,)), Err(RodsError::RowOutOfBound)));
    factory.assert_all_closed();
}

#[tokio::test]
async fn query_row_maps_empty_result_to_no_row_found() {
    let conn = ScriptedConnection::new("row").fail(api::GEN_QUERY, codes::CAT_NO_ROWS_FOUND);
    let (client, factory) = client_with(ScriptedFactory::new([conn]));

    let ctx = CallContext::background();
    let err = client
        .query(vec![COL_COLL_NAME])
        .fetch_row(&ctx)
        .await
        .expect_err("空结果应映射为 NoRowFound");
    assert!(matches!(err, RodsError::NoRowFound));
    factory.assert_all_closed();
}

#[tokio::test]
async fn early_close_drains_live_cursor() {
    let conn = ScriptedConnection::new("drain")
        .reply(
            api::GEN_QUERY,
            gen_query_page(vec![(COL_COLL_NAME, vec!["r1", "r2"])], 5),
        )
        .reply(api::GEN_QUERY, gen_query_page(vec![(COL_COLL_NAME, vec![])], 0));
    let trace = conn.trace();
    let (client, factory) = client_with(ScriptedFactory::new([conn]));

    let ctx = CallContext::background();
    let mut result = client
        .query(vec![COL_COLL_NAME])
        .execute(&ctx)
        .await
        .expect("查询应成功");
    assert!(result.next().await.expect("第一行应可用"));
    result.close().await.expect("提前关闭应排空游标");

    let trace = trace.lock();
    match &trace[1].request {
        RequestBody::GenQuery(query) => {
            assert_eq!(query.continue_index, 5, "排空请求应回传续传索引");
            assert_eq!(query.max_rows, 0, "排空请求行数上限应为 0");
        }
        other => panic!("应为查询请求，实际为 {other:?}"),
    }
    drop(trace);
    factory.assert_all_closed();
}

#[tokio::test]
async fn limit_lowers_per_page_cap_and_scan_checks_width() {
    let conn = ScriptedConnection::new("limit").reply(
        api::GEN_QUERY,
        gen_query_page(vec![(COL_COLL_NAME, vec!["only"])], 0),
    );
    let trace = conn.trace();
    let (client, factory) = client_with(ScriptedFactory::new([conn]));

    let ctx = CallContext::background();
    let mut result = client
        .query(vec![COL_COLL_NAME])
        .limit(1)
        .execute(&ctx)
        .await
        .expect("查询应成功");
    assert!(result.next().await.expect("应有一行"));
    let mut a = String::new();
    let mut b = String::new();
    assert!(matches!(
        result.scan((&mut a, &mut b)),
        Err(RodsError::AttributeOutOfBound)
    ));
    result.scan((&mut a,)).expect("单列扫描应成功");
    assert_eq!(a, "only");
    assert!(!result.next().await.expect("应自然耗尽"));

    match &trace.lock()[0].request {
        RequestBody::GenQuery(query) => assert_eq!(query.max_rows, 1, "limit 应压低单页行数"),
        other => panic!("应为查询请求，实际为 {other:?}"),
    }
    factory.assert_all_closed();
}
