//! Integration tests for the API server.

use std::sync::OnceLock;

use audit_log::{AuditRecorder, InMemoryAuditLogStore, outbox};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

const ORGANIZER: (&str, &str) = ("organizer-1", "organizer");
const BUYER: (&str, &str) = ("buyer-1", "buyer");
const ADMIN: (&str, &str) = ("admin-1", "admin");

struct TestApp {
    app: Router,
    recorder: AuditRecorder<InMemoryAuditLogStore>,
}

fn setup() -> TestApp {
    let store = InMemoryAuditLogStore::new();
    let (audit, inbox) = outbox();
    let state = api::create_default_state(audit, store.clone());
    TestApp {
        app: api::create_app(state, get_metrics_handle()),
        recorder: AuditRecorder::new(inbox, store),
    }
}

impl TestApp {
    async fn send(
        &self,
        method: &str,
        uri: &str,
        actor: Option<(&str, &str)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some((id, role)) = actor {
            request = request
                .header("x-actor-id", id)
                .header("x-actor-role", role);
        }
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn create_group(&self) -> String {
        let (status, body) = self
            .send(
                "POST",
                "/groups",
                Some(ORGANIZER),
                Some(json!({
                    "title": "Jeju tangerines",
                    "menu_items": [{
                        "product_id": "P-1",
                        "name": "Tangerines 5kg",
                        "sale_price": 10000,
                        "list_price": 12000
                    }]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn order(
        &self,
        group_id: &str,
        actor: (&str, &str),
        quantity: u32,
    ) -> (StatusCode, Value) {
        self.send(
            "POST",
            "/orders",
            Some(actor),
            Some(json!({
                "lines": [{
                    "group_id": group_id,
                    "product_id": "P-1",
                    "quantity": quantity,
                    "unit_price": 10000
                }]
            })),
        )
        .await
    }

    async fn post(&self, uri: &str, actor: (&str, &str)) -> (StatusCode, Value) {
        self.send("POST", uri, Some(actor), None).await
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();
    let (status, body) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    let response = app
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_missing_actor_is_unauthorized() {
    let app = setup();
    let (status, body) = app
        .send("POST", "/groups", None, Some(json!({"title": "x", "menu_items": []})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("x-actor-id"));
}

#[tokio::test]
async fn test_buyer_cannot_create_group() {
    let app = setup();
    let (status, body) = app
        .send(
            "POST",
            "/groups",
            Some(BUYER),
            Some(json!({
                "title": "Apples",
                "menu_items": [{"product_id": "P-1", "name": "Apple", "sale_price": 5000}]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden");
}

#[tokio::test]
async fn test_create_and_get_group() {
    let app = setup();
    let id = app.create_group().await;

    let (status, body) = app.send("GET", &format!("/groups/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "진행중");
    assert_eq!(body["current_total"], 0);
    assert_eq!(body["minimum_total"], 40000);
    assert_eq!(body["organizer_id"], ORGANIZER.0);
    assert_eq!(body["menu_items"][0]["discount_rate"], 16);

    let (status, body) = app.send("GET", "/groups", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_and_unknown_group_ids() {
    let app = setup();
    let (status, _) = app.send("GET", "/groups/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            "GET",
            "/groups/00000000-0000-4000-8000-000000000000",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_user_minimum_on_cancellation() {
    let app = setup();
    let id = app.create_group().await;

    let (status, body) = app
        .send(
            "POST",
            "/orders",
            Some(BUYER),
            Some(json!({
                "lines": [{"group_id": id, "product_id": "P-1", "quantity": 0, "unit_price": 10000}]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, _) = app.order(&id, BUYER, 1).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send("GET", &format!("/groups/{id}/my-orders"), Some(BUYER), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let order_id = body[0]["lines"][0]["id"].as_str().unwrap().to_string();

    // A single-line cancel may not drop the buyer below the minimum...
    let (status, body) = app
        .send("DELETE", &format!("/orders/{order_id}"), Some(BUYER), None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "threshold_violation");

    // ...but withdrawing the whole transaction is allowed.
    let (status, _) = app
        .send(
            "POST",
            "/orders/cancel-transaction",
            Some(BUYER),
            Some(json!({"order_ids": [order_id]})),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, group) = app.send("GET", &format!("/groups/{id}"), None, None).await;
    assert_eq!(group["current_total"], 0);
}

#[tokio::test]
async fn test_goal_reached_then_confirmed_blocks_edits() {
    let app = setup();
    let id = app.create_group().await;

    let (status, body) = app.order(&id, BUYER, 4).await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = body["order_ids"][0].as_str().unwrap().to_string();

    let (_, group) = app.send("GET", &format!("/groups/{id}"), None, None).await;
    assert_eq!(group["status"], "달성");
    assert_eq!(group["current_total"], 40000);

    let (status, _) = app.post(&format!("/groups/{id}/confirm"), BUYER).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, group) = app.post(&format!("/groups/{id}/confirm"), ORGANIZER).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(group["status"], "확정");

    let (status, body) = app
        .send(
            "PATCH",
            &format!("/orders/{order_id}"),
            Some(BUYER),
            Some(json!({"quantity": 5, "unit_price": 10000})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_state");

    let (status, _) = app.order(&id, ("buyer-2", "buyer"), 2).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_delivery_and_settlement() {
    let app = setup();
    let id = app.create_group().await;
    app.order(&id, BUYER, 4).await;

    app.post(&format!("/groups/{id}/confirm"), ORGANIZER).await;
    let (status, _) = app.post(&format!("/groups/{id}/shipping"), ORGANIZER).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, group) = app.post(&format!("/groups/{id}/shipping"), ADMIN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(group["status"], "배송중");
    assert_eq!(group["delivery_stage"], "입금안내");

    let (status, group) = app
        .send(
            "PUT",
            &format!("/groups/{id}/delivery-stage"),
            Some(ADMIN),
            Some(json!({"stage": "상품준비"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(group["delivery_stage"], "상품준비");

    let (status, _) = app.send("GET", &format!("/groups/{id}/settlement"), None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, group) = app.post(&format!("/groups/{id}/complete"), ADMIN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(group["status"], "완료");

    let (status, settlement) = app
        .send("GET", &format!("/groups/{id}/settlement"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settlement["order_total"], 40000);
    assert_eq!(settlement["commission"], 4000);
    assert_eq!(settlement["rate_source"], "default");

    let (status, rate) = app
        .send(
            "PUT",
            &format!("/commissions/{}", ORGANIZER.0),
            Some(ADMIN),
            Some(json!({"rate_percent": 5.0})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rate["source"], "override");

    let (_, settlement) = app
        .send("GET", &format!("/groups/{id}/settlement"), None, None)
        .await;
    assert_eq!(settlement["commission"], 2000);
    assert_eq!(settlement["rate_source"], "override");
}

#[tokio::test]
async fn test_settings_are_admin_only() {
    let app = setup();

    let (status, body) = app.send("GET", "/settings/commission", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rate_percent"], 10.0);

    let (status, _) = app
        .send(
            "PUT",
            "/settings/commission",
            Some(ORGANIZER),
            Some(json!({"rate_percent": 3.0})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            "PUT",
            "/settings/commission",
            Some(ADMIN),
            Some(json!({"rate_percent": 150.0})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(
            "PUT",
            "/settings/recruitment",
            Some(ADMIN),
            Some(json!({"open": false})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["open"], false);

    let (_, body) = app.send("GET", "/settings/recruitment", None, None).await;
    assert_eq!(body["open"], false);

    let (status, body) = app
        .send("DELETE", "/commissions/organizer-9", Some(ADMIN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], false);
}

#[tokio::test]
async fn test_overflowing_order_total_is_bad_request() {
    let app = setup();
    let id = app.create_group().await;

    let (status, body) = app
        .send(
            "POST",
            "/orders",
            Some(BUYER),
            Some(json!({
                "lines": [{
                    "group_id": id,
                    "product_id": "P-1",
                    "quantity": 4,
                    "unit_price": i64::MAX / 2
                }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = app.send("GET", &format!("/groups/{id}"), Some(BUYER), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_total"], 0);
}

#[tokio::test]
async fn test_visits_always_no_content() {
    let app = setup();
    let id = app.create_group().await;

    for _ in 0..2 {
        let (status, _) = app.post(&format!("/groups/{id}/visits"), BUYER).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let (status, _) = app.post("/groups/not-a-uuid/visits", BUYER).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_audit_log_is_admin_only() {
    let mut app = setup();
    let id = app.create_group().await;
    app.order(&id, BUYER, 4).await;
    app.recorder.drain().await;

    let uri = format!("/audit-logs?target_type=group&target_id={id}");
    let (status, _) = app.send("GET", &uri, Some(BUYER), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.send("GET", &uri, Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    let types: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["log_type"].as_str().unwrap())
        .collect();
    assert_eq!(types, ["group_created", "group_status_changed"]);
}
