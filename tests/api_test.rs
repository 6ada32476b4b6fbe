mod common;

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Duration;
use clubhouse::{api::create_app, auth::TokenService};
use common::*;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn app(env: &TestEnv) -> Router {
    create_app(env.ctx.clone(), Arc::new(Settings::default()))
}

fn bearer(account_id: Uuid) -> String {
    let token = TokenService::new(&Settings::default().auth.jwt_secret)
        .issue(account_id, Duration::hours(1))
        .unwrap();
    format!("Bearer {}", token)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn health_check_is_public() {
    let env = setup().await;

    let response = app(&env)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn api_requires_bearer_token() {
    let env = setup().await;

    let response = app(&env)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/clubs/{}/requests", env.club.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn request_approve_and_link_over_http() {
    let env = setup().await;

    let response = app(&env)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/clubs/{}/requests", env.club.id))
                .header(header::AUTHORIZATION, bearer(env.student_id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "reason": "I sing" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let request = json_body(response).await;
    assert_eq!(request["status"], "pending");

    let duplicate = app(&env)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/clubs/{}/requests", env.club.id))
                .header(header::AUTHORIZATION, bearer(env.student_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let forbidden = app(&env)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/requests/{}/approve", request["id"].as_str().unwrap()))
                .header(header::AUTHORIZATION, bearer(env.student_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let approved = app(&env)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/requests/{}/approve", request["id"].as_str().unwrap()))
                .header(header::AUTHORIZATION, bearer(env.leader_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(approved.status(), StatusCode::OK);
    let approval = json_body(approved).await;
    assert_eq!(approval["payment"]["amount"], CLUB_FEE);
    assert_eq!(approval["membership"]["status"], "pending_payment");

    let link = app(&env)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/payments/{}/link", approval["payment"]["id"].as_str().unwrap()))
                .header(header::AUTHORIZATION, bearer(env.student_id))
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-forwarded-for", "203.0.113.7")
                .body(Body::from(json!({ "gateway": "vnpay" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(link.status(), StatusCode::OK);
    let link = json_body(link).await;
    let url = link["checkout_url"].as_str().unwrap();
    assert!(url.contains("vnp_IpAddr=203.0.113.7"));
    assert_eq!(link["order_code"], approval["payment"]["order_code"]);
}

#[tokio::test]
async fn ipn_confirms_and_acknowledges_redelivery() {
    let env = setup().await;
    let payment = env.approved_payment().await;
    let query = query_string(&signed_vnpay_params(payment.order_code, CLUB_FEE, "00"));

    for _ in 0..2 {
        let response = app(&env)
            .oneshot(
                Request::builder()
                    .uri(format!("/payments/vnpay/ipn?{}", query))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["RspCode"], "00");
    }

    assert_eq!(env.payment(payment.id).await.status, PaymentStatus::Paid);
}

#[tokio::test]
async fn ipn_accepts_form_encoded_post() {
    let env = setup().await;
    let payment = env.approved_payment().await;
    let body = query_string(&signed_vnpay_params(payment.order_code, CLUB_FEE, "00"));

    let response = app(&env)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/payments/vnpay/ipn")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["RspCode"], "00");
    assert_eq!(env.payment(payment.id).await.status, PaymentStatus::Paid);
    assert_eq!(
        env.membership(payment.membership_id).await.status,
        MembershipStatus::Active
    );
}

#[tokio::test]
async fn ipn_reports_bad_signature_and_unknown_order() {
    let env = setup().await;
    let payment = env.approved_payment().await;

    let mut tampered = signed_vnpay_params(payment.order_code, CLUB_FEE, "00");
    tampered.insert("vnp_ResponseCode".to_string(), "24".to_string());
    let response = app(&env)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/payments/vnpay/ipn?{}", query_string(&tampered)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["RspCode"], "97");

    let unknown = OrderCode::new(42).unwrap();
    let response = app(&env)
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/payments/vnpay/ipn?{}",
                    query_string(&signed_vnpay_params(unknown, CLUB_FEE, "00"))
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(json_body(response).await["RspCode"], "01");

    let response = app(&env)
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/payments/vnpay/ipn?{}",
                    query_string(&signed_vnpay_params(payment.order_code, 5_000, "00"))
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(json_body(response).await["RspCode"], "04");

    assert_eq!(env.payment(payment.id).await.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn vnpay_return_redirects_by_outcome() {
    let env = setup().await;
    let payment = env.approved_payment().await;
    let pages = Settings::default().pages;

    let tampered = {
        let mut params = signed_vnpay_params(payment.order_code, CLUB_FEE, "00");
        params.insert("vnp_SecureHash".to_string(), "00".repeat(64));
        params
    };
    let response = app(&env)
        .oneshot(
            Request::builder()
                .uri(format!("/payments/vnpay/return?{}", query_string(&tampered)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_redirection());
    assert!(location(&response).starts_with(&pages.failure_url));
    assert_eq!(env.payment(payment.id).await.status, PaymentStatus::Pending);

    let response = app(&env)
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/payments/vnpay/return?{}",
                    query_string(&signed_vnpay_params(payment.order_code, CLUB_FEE, "00"))
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        location(&response),
        format!("{}?orderCode={}", pages.success_url, payment.order_code)
    );
}

#[tokio::test]
async fn webhook_acknowledges_with_http_200() {
    let env = setup().await;
    let payment = env.approved_payment().await;

    let mut forged = signed_payos_webhook(payment.order_code, CLUB_FEE, "00");
    forged["data"]["amount"] = json!(1);
    let response = app(&env)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/payments/payos/webhook")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(forged.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["error"], -1);
    assert_eq!(env.payment(payment.id).await.status, PaymentStatus::Pending);

    let genuine = signed_payos_webhook(payment.order_code, CLUB_FEE, "00").to_string();
    for _ in 0..2 {
        let response = app(&env)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/payments/payos/webhook")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(genuine.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["error"], 0);
    }

    assert_eq!(env.payment(payment.id).await.status, PaymentStatus::Paid);
    assert_eq!(
        env.membership(payment.membership_id).await.status,
        MembershipStatus::Active
    );
}

#[tokio::test]
async fn payos_return_settles_from_polled_status() {
    let env = setup().await;
    let payment = env.approved_payment().await;
    let pages = Settings::default().pages;
    let uri = format!(
        "/payments/payos/return?code=00&id=a1b2c3d4&cancel=false&status=PAID&orderCode={}",
        payment.order_code
    );

    // Query string alone is not trusted.
    let response = app(&env)
        .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(location(&response).starts_with(&pages.pending_url));
    assert_eq!(env.payment(payment.id).await.status, PaymentStatus::Pending);

    env.checkout
        .set_status(ProviderStatus::Paid { amount: CLUB_FEE })
        .await;
    let response = app(&env)
        .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(location(&response).starts_with(&pages.success_url));
    assert_eq!(env.payment(payment.id).await.status, PaymentStatus::Paid);
}

#[tokio::test]
async fn notifications_follow_the_lifecycle() {
    let env = setup().await;
    let payment = env.approved_payment().await;
    env.ctx
        .coordinator
        .confirm_manual(env.leader_id, payment.id)
        .await
        .unwrap();

    let response = app(&env)
        .oneshot(
            Request::builder()
                .uri("/api/notifications")
                .header(header::AUTHORIZATION, bearer(env.student_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let titles: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Welcome to the club", "Membership request approved"]);
}
