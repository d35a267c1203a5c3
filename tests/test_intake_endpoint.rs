//! Intake endpoint integration tests
//!
//! Drives the full route tree through warp's test harness with a recording
//! relay in place of the collaborator.


use infusion_relay::dispatch::{OrderRecord, TaskDispatcher};
use infusion_relay::intake::routes;
use infusion_relay::observability::HealthReport;
use infusion_relay::protocol::{Acknowledgement, ErrorResponse};
use infusion_relay::testing::MockResultRelay;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{fixed_latency_settings, instant_settings};

fn drug_json(druginorder_id: i64, patient_weight: f64) -> Value {
    json!({
        "druginorder_id": druginorder_id,
        "drug_concentration": 10.0,
        "ampoule_volume": 5.0,
        "ampoules_count": 2,
        "solvent_volume": 100.0,
        "patient_weight": patient_weight
    })
}

async fn wait_for_relays(relay: &MockResultRelay, expected: usize) {
    for _ in 0..100 {
        if relay.get_relayed().await.len() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {expected} relays");
}

async fn wait_for_terminal_record<F>(api: &F, order_id: i64) -> Value
where
    F: warp::Filter + 'static,
    F::Extract: warp::Reply + Send,
{
    for _ in 0..200 {
        let response = warp::test::request()
            .method("GET")
            .path(&format!("/orders/{order_id}"))
            .reply(api)
            .await;
        if response.status() == 200 {
            let body: Value = serde_json::from_slice(response.body()).unwrap();
            if body["state"] == "delivered" || body["state"] == "failed" {
                return body;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("order {order_id} did not reach a terminal state");
}

#[tokio::test]
async fn test_valid_order_is_acknowledged_and_relayed() {
    let relay = Arc::new(MockResultRelay::new());
    let api = routes(TaskDispatcher::new(relay.clone(), instant_settings()), "svc");

    let response = warp::test::request()
        .method("POST")
        .path("/drugs_process/")
        .json(&json!({
            "order_id": 42,
            "drugs": [drug_json(1, 70.0), drug_json(2, 50.0)]
        }))
        .reply(&api)
        .await;

    assert_eq!(response.status(), 202);
    let ack: Acknowledgement = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(ack.status, "accepted");
    assert_eq!(ack.message, "Order queued for processing");
    assert_eq!(ack.order_id, 42);
    assert_eq!(ack.drugs_count, 2);

    wait_for_relays(&relay, 1).await;
    let relayed = relay.get_relayed().await;
    assert_eq!(relayed[0].0, 42);
    assert_eq!(relayed[0].1[0].infusion_speed, 1.42);
    assert_eq!(relayed[0].1[1].infusion_speed, 2.0);
}

#[tokio::test]
async fn test_acknowledgement_does_not_wait_for_processing() {
    let relay = Arc::new(MockResultRelay::new());
    let api = routes(
        TaskDispatcher::new(relay.clone(), fixed_latency_settings(Duration::from_secs(5))),
        "svc",
    );

    let started = std::time::Instant::now();
    let response = warp::test::request()
        .method("POST")
        .path("/drugs_process/")
        .json(&json!({ "order_id": 1, "drugs": [drug_json(1, 70.0)] }))
        .reply(&api)
        .await;

    assert_eq!(response.status(), 202);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(relay.call_count().await, 0);
}

#[tokio::test]
async fn test_empty_order_is_acknowledged_with_zero_drugs() {
    let relay = Arc::new(MockResultRelay::new());
    let api = routes(TaskDispatcher::new(relay.clone(), instant_settings()), "svc");

    let response = warp::test::request()
        .method("POST")
        .path("/drugs_process/")
        .json(&json!({ "order_id": 42, "drugs": [] }))
        .reply(&api)
        .await;

    assert_eq!(response.status(), 202);
    let ack: Acknowledgement = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(ack.drugs_count, 0);

    wait_for_relays(&relay, 1).await;
    assert_eq!(relay.get_relayed().await, vec![(42, vec![])]);
}

#[tokio::test]
async fn test_missing_field_is_bad_request() {
    let relay = Arc::new(MockResultRelay::new());
    let api = routes(TaskDispatcher::new(relay.clone(), instant_settings()), "svc");

    let response = warp::test::request()
        .method("POST")
        .path("/drugs_process/")
        .json(&json!({
            "order_id": 3,
            "drugs": [{ "druginorder_id": 1, "drug_concentration": 10.0 }]
        }))
        .reply(&api)
        .await;

    assert_eq!(response.status(), 400);
    let error: ErrorResponse = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(error.error, "Invalid request format");
    assert!(error.details.contains("ampoule_volume"));
    assert_eq!(relay.call_count().await, 0);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let api = routes(
        TaskDispatcher::new(Arc::new(MockResultRelay::new()), instant_settings()),
        "svc",
    );

    let response = warp::test::request()
        .method("POST")
        .path("/drugs_process/")
        .header("content-type", "application/json")
        .body("{ not json")
        .reply(&api)
        .await;

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_string_where_number_expected_is_bad_request() {
    let api = routes(
        TaskDispatcher::new(Arc::new(MockResultRelay::new()), instant_settings()),
        "svc",
    );

    let response = warp::test::request()
        .method("POST")
        .path("/drugs_process/")
        .json(&json!({ "order_id": "forty-two", "drugs": [] }))
        .reply(&api)
        .await;

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_zero_patient_weight_is_rejected() {
    let relay = Arc::new(MockResultRelay::new());
    let api = routes(TaskDispatcher::new(relay.clone(), instant_settings()), "svc");

    let response = warp::test::request()
        .method("POST")
        .path("/drugs_process/")
        .json(&json!({ "order_id": 4, "drugs": [drug_json(1, 0.0)] }))
        .reply(&api)
        .await;

    assert_eq!(response.status(), 400);
    let error: ErrorResponse = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(error.error, "Invalid order");
    assert!(error.details.contains("patient_weight"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(relay.call_count().await, 0);
}

#[tokio::test]
async fn test_overflowing_rate_is_accepted_but_never_relayed() {
    let relay = Arc::new(MockResultRelay::new());
    let api = routes(TaskDispatcher::new(relay.clone(), instant_settings()), "svc");

    let response = warp::test::request()
        .method("POST")
        .path("/drugs_process/")
        .json(&json!({
            "order_id": 15,
            "drugs": [{
                "druginorder_id": 1,
                "drug_concentration": 1e306,
                "ampoule_volume": 1.0,
                "ampoules_count": 1,
                "solvent_volume": 100.0,
                "patient_weight": 0.5
            }]
        }))
        .reply(&api)
        .await;
    assert_eq!(response.status(), 202);

    let record = wait_for_terminal_record(&api, 15).await;
    assert_eq!(record["state"], "failed");
    assert!(record["reason"].as_str().unwrap().contains("not a finite number"));
    assert_eq!(relay.call_count().await, 0);
}

#[tokio::test]
async fn test_status_reports_relaying_while_collaborator_is_slow() {
    let relay = Arc::new(MockResultRelay::new().with_delay(Duration::from_millis(500)));
    let api = routes(TaskDispatcher::new(relay.clone(), instant_settings()), "svc");

    warp::test::request()
        .method("POST")
        .path("/drugs_process/")
        .json(&json!({ "order_id": 16, "drugs": [drug_json(1, 70.0)] }))
        .reply(&api)
        .await;

    let mut seen_relaying = false;
    for _ in 0..40 {
        let response = warp::test::request()
            .method("GET")
            .path("/orders/16")
            .reply(&api)
            .await;
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        if body["state"] == "relaying" {
            assert_eq!(body["attempt"], 1);
            seen_relaying = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(seen_relaying, "order should be observed mid-relay");

    let record = wait_for_terminal_record(&api, 16).await;
    assert_eq!(record["state"], "delivered");
    assert_eq!(relay.get_relayed().await.len(), 1);
}

#[tokio::test]
async fn test_duplicate_in_flight_order_is_conflict() {
    let api = routes(
        TaskDispatcher::new(
            Arc::new(MockResultRelay::new()),
            fixed_latency_settings(Duration::from_secs(2)),
        ),
        "svc",
    );
    let body = json!({ "order_id": 77, "drugs": [drug_json(1, 70.0)] });

    let first = warp::test::request()
        .method("POST")
        .path("/drugs_process/")
        .json(&body)
        .reply(&api)
        .await;
    assert_eq!(first.status(), 202);

    let second = warp::test::request()
        .method("POST")
        .path("/drugs_process/")
        .json(&body)
        .reply(&api)
        .await;
    assert_eq!(second.status(), 409);
}

#[tokio::test]
async fn test_order_status_is_queryable() {
    let relay = Arc::new(MockResultRelay::new());
    let api = routes(TaskDispatcher::new(relay.clone(), instant_settings()), "svc");

    let unknown = warp::test::request()
        .method("GET")
        .path("/orders/5")
        .reply(&api)
        .await;
    assert_eq!(unknown.status(), 404);

    warp::test::request()
        .method("POST")
        .path("/drugs_process/")
        .json(&json!({ "order_id": 5, "drugs": [drug_json(1, 70.0)] }))
        .reply(&api)
        .await;
    wait_for_relays(&relay, 1).await;

    let mut record: Option<OrderRecord> = None;
    for _ in 0..100 {
        let response = warp::test::request()
            .method("GET")
            .path("/orders/5")
            .reply(&api)
            .await;
        assert_eq!(response.status(), 200);
        let current: OrderRecord = serde_json::from_slice(response.body()).unwrap();
        if current.status.is_terminal() {
            record = Some(current);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let record = record.expect("order should reach a terminal state");
    assert_eq!(record.order_id, 5);
    assert_eq!(record.drugs_count, 1);
}

#[tokio::test]
async fn test_health_endpoint() {
    let api = routes(
        TaskDispatcher::new(Arc::new(MockResultRelay::new()), instant_settings()),
        "async-calculation-service",
    );

    let response = warp::test::request()
        .method("GET")
        .path("/health")
        .reply(&api)
        .await;

    assert_eq!(response.status(), 200);
    let report: HealthReport = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(report.status, "healthy");
    assert_eq!(report.service, "async-calculation-service");
}

#[tokio::test]
async fn test_metrics_endpoint_counts_orders() {
    let api = routes(
        TaskDispatcher::new(Arc::new(MockResultRelay::new()), instant_settings()),
        "svc",
    );

    warp::test::request()
        .method("POST")
        .path("/drugs_process/")
        .json(&json!({ "order_id": 900, "drugs": [] }))
        .reply(&api)
        .await;

    let response = warp::test::request()
        .method("GET")
        .path("/metrics")
        .reply(&api)
        .await;

    assert_eq!(response.status(), 200);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert!(body["orders"]["orders_received"].as_u64().unwrap() >= 1);
}
