use actix_web::{http::StatusCode, test::TestRequest};
use ledger_engine::{db_types::Usd, test_utils::mock_transfer::MockTransferProvider};
use serde_json::{json, Value};

use super::helpers::{TestSystem, ADMIN_SECRET};
use crate::helpers::ADMIN_SECRET_HEADER;

fn admin_post(uri: &str) -> TestRequest {
    TestRequest::post().uri(uri).insert_header((ADMIN_SECRET_HEADER, ADMIN_SECRET))
}

async fn request(system: &TestSystem, kind: &str, user_id: i64, amount: &str) -> (StatusCode, Value) {
    let req = admin_post(&format!("/withdrawals/{kind}")).set_json(json!({ "user_id": user_id, "amount": amount }));
    system.send_json(req).await
}

#[actix_web::test]
async fn withdrawal_routes_need_the_admin_secret() {
    let system = TestSystem::new().await;
    let req = TestRequest::post()
        .uri("/withdrawals/seller")
        .set_json(json!({ "user_id": system.market.general_seller, "amount": "25.00" }));
    let (status, json) = system.send_json(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "Missing or invalid x-admin-secret header");

    let req = TestRequest::get().uri(&format!("/withdrawals/user/{}", system.market.general_seller));
    let (status, _) = system.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn requesting_a_withdrawal_reserves_the_funds() {
    let system = TestSystem::new().await;
    let seller = system.market.general_seller;
    system.credit(seller, Usd::from_dollars(40)).await;

    let (status, json) = request(&system, "seller", seller, "25.00").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["status"], "PENDING");
    assert_eq!(json["data"]["kind"], "SELLER");
    assert_eq!(json["data"]["amount"], 2500);
    assert_eq!(system.balance(seller).await, Usd::from_dollars(15));

    // The reserved funds cannot be requested a second time
    let (status, json) = request(&system, "seller", seller, "25.00").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["code"], "INSUFFICIENT_BALANCE");
    assert_eq!(system.balance(seller).await, Usd::from_dollars(15));
}

#[actix_web::test]
async fn bad_amounts_are_refused() {
    let system = TestSystem::new().await;
    let seller = system.market.general_seller;
    system.credit(seller, Usd::from_dollars(40)).await;

    let (status, json) = request(&system, "seller", seller, "10.005").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_AMOUNT");

    let (status, json) = request(&system, "seller", seller, "-5").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_AMOUNT");

    let (status, json) = request(&system, "seller", seller, "9.99").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BELOW_MINIMUM");
    assert_eq!(system.balance(seller).await, Usd::from_dollars(40));
}

#[actix_web::test]
async fn malformed_requests_are_refused() {
    let system = TestSystem::new().await;
    let seller = system.market.general_seller;

    let (status, json) = request(&system, "buyer", seller, "25.00").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("buyer"));

    let req = admin_post("/withdrawals/seller")
        .insert_header(("content-type", "application/json"))
        .set_payload(r#"{"user_id": "#);
    let (status, json) = system.send_json(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().starts_with("Could not read request body"));

    let (status, json) = request(&system, "seller", 9999, "25.00").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[actix_web::test]
async fn approving_pays_out_through_the_provider() {
    let system = TestSystem::new().await;
    let rider = system.market.rider;
    system.credit(rider, Usd::from_dollars(30)).await;
    let (_, json) = request(&system, "rider", rider, "20").await;
    let id = json["data"]["id"].as_i64().unwrap();

    let (status, json) = system.send_json(admin_post(&format!("/withdrawals/rider/{id}/approve"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "COMPLETED");
    let requests = system.transfers.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].amount_cents, 2000);
    assert_eq!(requests[0].destination, "acct_rider");
    assert_eq!(system.balance(rider).await, Usd::from_dollars(10));

    // Approving again does not pay twice
    let (status, json) = system.send_json(admin_post(&format!("/withdrawals/rider/{id}/approve"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "COMPLETED");
    assert_eq!(system.transfers.requests().len(), 1);

    // A rider withdrawal is not a seller withdrawal
    let (status, json) = system.send_json(admin_post(&format!("/withdrawals/seller/{id}/approve"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[actix_web::test]
async fn a_declined_transfer_returns_the_funds() {
    let system = TestSystem::with_transfers(MockTransferProvider::declining("Account is restricted")).await;
    let seller = system.market.food_seller;
    system.credit(seller, Usd::from_dollars(50)).await;
    let (_, json) = request(&system, "seller", seller, "50").await;
    let id = json["data"]["id"].as_i64().unwrap();
    assert_eq!(system.balance(seller).await, Usd::from(0));

    let (status, json) = system.send_json(admin_post(&format!("/withdrawals/seller/{id}/approve"))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["success"], false);
    assert_eq!(json["code"], "TRANSFER_FAILED");
    assert!(json["message"].as_str().unwrap().contains("Account is restricted"));
    assert_eq!(json["data"]["status"], "REJECTED");
    assert_eq!(system.balance(seller).await, Usd::from_dollars(50));
}

#[actix_web::test]
async fn an_unreachable_provider_can_be_retried() {
    let system = TestSystem::with_transfers(MockTransferProvider::unavailable_for(1, "Stripe is down")).await;
    let seller = system.market.general_seller;
    system.credit(seller, Usd::from_dollars(30)).await;
    let (_, json) = request(&system, "seller", seller, "30").await;
    let id = json["data"]["id"].as_i64().unwrap();

    let (status, json) = system.send_json(admin_post(&format!("/withdrawals/seller/{id}/approve"))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "TRANSFER_PENDING");
    assert_eq!(json["data"]["status"], "PROCESSING");
    assert_eq!(system.balance(seller).await, Usd::from(0));

    let req =
        admin_post(&format!("/withdrawals/seller/{id}/reject")).set_json(json!({ "reason": "Provider outage" }));
    let (status, json) = system.send_json(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_STATE");

    let (status, json) = system.send_json(admin_post(&format!("/withdrawals/seller/{id}/approve"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "COMPLETED");
    assert_eq!(system.transfers.requests().len(), 2);
    assert_eq!(system.balance(seller).await, Usd::from(0));
}

#[actix_web::test]
async fn rejecting_and_listing_withdrawals() {
    let system = TestSystem::new().await;
    let seller = system.market.general_seller;
    system.credit(seller, Usd::from_dollars(60)).await;
    let (_, first) = request(&system, "seller", seller, "20").await;
    let (_, _second) = request(&system, "seller", seller, "30").await;
    let id = first["data"]["id"].as_i64().unwrap();
    assert_eq!(system.balance(seller).await, Usd::from_dollars(10));

    let req =
        admin_post(&format!("/withdrawals/seller/{id}/reject")).set_json(json!({ "reason": "Duplicate request" }));
    let (status, json) = system.send_json(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "REJECTED");
    assert_eq!(system.balance(seller).await, Usd::from_dollars(30));
    assert!(system.transfers.requests().is_empty());

    let req = TestRequest::get()
        .uri(&format!("/withdrawals/user/{seller}"))
        .insert_header((ADMIN_SECRET_HEADER, ADMIN_SECRET));
    let (status, json) = system.send_json(req).await;
    assert_eq!(status, StatusCode::OK);
    let list = json.as_array().unwrap();
    assert_eq!(list.len(), 2);
    let statuses = list.iter().map(|w| w["status"].as_str().unwrap()).collect::<Vec<_>>();
    assert!(statuses.contains(&"REJECTED"));
    assert!(statuses.contains(&"PENDING"));
}
