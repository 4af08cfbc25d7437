use actix_web::{http::StatusCode, test::TestRequest};
use chrono::{Duration, Utc};
use ledger_engine::{
    db_types::{StoreType, Usd},
    test_utils::fixtures::create_delivered_order,
};

use super::helpers::{TestSystem, CRON_SECRET};
use crate::helpers::CRON_SECRET_HEADER;

fn cron(job: &str) -> TestRequest {
    TestRequest::post().uri(&format!("/cron/{job}")).insert_header((CRON_SECRET_HEADER, CRON_SECRET))
}

#[actix_web::test]
async fn health() {
    let system = TestSystem::new().await;
    let (status, body) = system.send(TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
}

#[actix_web::test]
async fn cron_routes_need_the_secret() {
    let system = TestSystem::new().await;
    let (status, body) = system.send(TestRequest::post().uri("/cron/escrow-payouts")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"Missing or invalid x-cron-secret header"}"#);

    let req = TestRequest::post().uri("/cron/escrow-payouts").insert_header((CRON_SECRET_HEADER, "guess"));
    let (status, _) = system.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn unknown_jobs_are_not_found() {
    let system = TestSystem::new().await;
    let (status, json) = system.send_json(cron("make-money")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("make-money"));
}

#[actix_web::test]
async fn escrow_payouts_release_due_orders() {
    let system = TestSystem::new().await;
    let m = system.market;
    let delivered_at = Utc::now() - Duration::hours(25);
    let groups = [(m.general_seller, StoreType::General, Usd::from_dollars(10))];
    create_delivered_order(&system.db, &m, &groups, Usd::from_dollars(2), delivered_at).await;

    let (status, json) = system.send_json(cron("escrow-payouts")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["skipped"], false);
    assert_eq!(json["processed"], 1);
    assert_eq!(json["failed"], 0);
    assert_eq!(system.balance(m.general_seller).await, Usd::from_dollars(9));
    assert_eq!(system.balance(m.rider).await, Usd::from_dollars(2));

    let (status, json) = system.send_json(cron("escrow-payouts")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["skipped"], true);
    assert_eq!(json["reason"], "no jobs due");
    assert_eq!(system.balance(m.general_seller).await, Usd::from_dollars(9));
}

#[actix_web::test]
async fn all_runs_every_worker() {
    let system = TestSystem::new().await;
    let (status, json) = system.send_json(cron("all")).await;
    assert_eq!(status, StatusCode::OK);
    let workers = json
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["worker"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(workers, vec![
        "finalize-delivered",
        "escrow-payouts",
        "seller-groups",
        "rider-payouts",
        "hub-timeouts",
        "escrow-snapshot"
    ]);
    // Only the snapshot has something to do on an empty marketplace
    assert_eq!(json[5]["processed"], 1);
    assert!(json.as_array().unwrap()[..5].iter().all(|r| r["skipped"] == true));
}
