use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wansim::router;
use wansim_tc::{
    command::BoxedExecutor,
    testing::{FakeTc, StaticLister},
    Engine,
};

/// Helper functions.
mod helpers {
    use super::*;

    /// Router over a fake host where every interface is also returned by the lister.
    pub fn app(interfaces: &[&str]) -> (Router, Arc<FakeTc>) {
        let tc = Arc::new(FakeTc::with_interfaces(interfaces.iter().copied()));
        let executor: BoxedExecutor = Arc::clone(&tc) as BoxedExecutor;
        let lister = Arc::new(StaticLister::new(interfaces.iter().copied()));

        (router(Arc::new(Engine::new(executor, lister))), tc)
    }

    pub async fn call(app: &Router, method: Method, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    pub async fn json(app: &Router, uri: &str) -> Value {
        let (status, body) = call(app, Method::GET, uri).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        serde_json::from_str(&body).unwrap()
    }
}

use helpers::{app, call, json};

#[tokio::test]
async fn root_has_nothing_to_see() {
    let _ = tracing_subscriber::fmt::try_init();
    let (app, _) = app(&["eth0"]);

    let (status, body) = call(&app, Method::GET, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "nothing to see here...");
}

#[tokio::test]
async fn list_interfaces_is_unfiltered() {
    let _ = tracing_subscriber::fmt::try_init();
    let (app, _) = app(&["lo", "eth0", "mgmt0"]);

    assert_eq!(json(&app, "/api/listInterfaces").await, json!(["lo", "eth0", "mgmt0"]));
}

#[tokio::test]
async fn impair_then_show() {
    let _ = tracing_subscriber::fmt::try_init();
    let (app, _) = app(&["eth0", "eth1"]);

    let (status, _) = call(&app, Method::POST, "/api/impairInterface/eth1/5/100").await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(
        json(&app, "/api/showInterface/eth1").await,
        json!({ "name": "eth1", "loss": 5, "delay": 100 })
    );
    assert_eq!(
        json(&app, "/api/showInterface/eth0").await,
        json!({ "name": "eth0", "loss": null, "delay": null })
    );
}

#[tokio::test]
async fn reimpair_replaces_previous_values() {
    let _ = tracing_subscriber::fmt::try_init();
    let (app, _) = app(&["eth0"]);

    call(&app, Method::POST, "/api/impairInterface/eth0/10/20").await;
    let (status, _) = call(&app, Method::POST, "/api/impairInterface/eth0/0/1500").await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(
        json(&app, "/api/showInterface/eth0").await,
        json!({ "name": "eth0", "loss": null, "delay": 1500 })
    );
}

#[tokio::test]
async fn invalid_parameters_are_bad_requests() {
    let _ = tracing_subscriber::fmt::try_init();
    let (app, tc) = app(&["eth0"]);

    for uri in [
        "/api/impairInterface/eth0/101/0",
        "/api/impairInterface/eth0/-1/10",
        "/api/impairInterface/eth0/5/3001",
        "/api/impairInterface/eth0/0/0",
        "/api/impairInterface/eth0/five/10",
    ] {
        let (status, body) = call(&app, Method::POST, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}: {body}");
    }

    assert!(tc.invocations().is_empty());
}

#[tokio::test]
async fn validation_error_body() {
    let _ = tracing_subscriber::fmt::try_init();
    let (app, _) = app(&["eth0"]);

    let (status, body) = call(&app, Method::POST, "/api/impairInterface/eth0/0/0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"]["code"], 400);
    assert!(body["error"]["message"].is_string());
}

#[tokio::test]
async fn show_unknown_interface_fails() {
    let _ = tracing_subscriber::fmt::try_init();
    let (app, _) = app(&["eth0"]);

    let (status, _) = call(&app, Method::GET, "/api/showInterface/eth9").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn show_interfaces_skips_excluded() {
    let _ = tracing_subscriber::fmt::try_init();
    let (app, _) = app(&["lo", "eth0", "mgmt0", "eth1"]);

    call(&app, Method::POST, "/api/impairInterface/eth0/3/0").await;

    assert_eq!(
        json(&app, "/api/showInterfaces").await,
        json!([
            { "name": "eth0", "loss": 3, "delay": null },
            { "name": "eth1", "loss": null, "delay": null },
        ])
    );
}

#[tokio::test]
async fn clear_is_idempotent() {
    let _ = tracing_subscriber::fmt::try_init();
    let (app, _) = app(&["eth0"]);

    call(&app, Method::POST, "/api/impairInterface/eth0/5/5").await;
    for _ in 0..2 {
        let (status, body) = call(&app, Method::POST, "/api/clearInterface/eth0").await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    assert_eq!(
        json(&app, "/api/showInterface/eth0").await,
        json!({ "name": "eth0", "loss": null, "delay": null })
    );
}

#[tokio::test]
async fn clear_interfaces_clears_everything() {
    let _ = tracing_subscriber::fmt::try_init();
    let (app, _) = app(&["lo", "eth0", "eth1"]);

    call(&app, Method::POST, "/api/impairInterface/eth0/5/5").await;
    call(&app, Method::POST, "/api/impairInterface/eth1/1/1").await;

    let (status, _) = call(&app, Method::POST, "/api/clearInterfaces").await;
    assert_eq!(status, StatusCode::OK);

    let shown = json(&app, "/api/showInterfaces").await;
    for iface in shown.as_array().unwrap() {
        assert_eq!(iface["loss"], Value::Null);
        assert_eq!(iface["delay"], Value::Null);
    }
}

#[tokio::test]
async fn randomize_leaves_control_pair_clean() {
    let _ = tracing_subscriber::fmt::try_init();
    let (app, _) = app(&["lo", "left1", "left2", "right1", "other1"]);

    let (status, body) = call(&app, Method::POST, "/api/randomizeImpair").await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let shown = json(&app, "/api/showInterfaces").await;
    let shown = shown.as_array().unwrap();
    assert_eq!(shown.len(), 4);

    let clean: Vec<&str> = shown
        .iter()
        .filter(|i| i["loss"].is_null() && i["delay"].is_null())
        .map(|i| i["name"].as_str().unwrap())
        .collect();
    assert_eq!(clean.len(), 2, "{shown:?}");
    assert_eq!(clean.iter().filter(|n| n.contains("left")).count(), 1);
    assert!(clean.contains(&"right1"));

    for iface in shown.iter().filter(|i| !clean.contains(&i["name"].as_str().unwrap())) {
        let loss = iface["loss"].as_u64().unwrap();
        let delay = iface["delay"].as_u64().unwrap();
        assert!((1..=50).contains(&loss));
        assert!((1..=1000).contains(&delay));
    }
}

#[tokio::test]
async fn randomize_without_right_side_is_precondition_failed() {
    let _ = tracing_subscriber::fmt::try_init();
    let (app, tc) = app(&["left1", "other1"]);

    let (status, _) = call(&app, Method::POST, "/api/randomizeImpair").await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert!(tc.invocations().is_empty());
}

#[tokio::test]
async fn timed_out_batch_is_gateway_timeout() {
    let _ = tracing_subscriber::fmt::try_init();
    let (app, tc) = app(&["eth0"]);
    tc.time_out_batches(true);

    let (status, _) = call(&app, Method::POST, "/api/impairInterface/eth0/5/5").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn mutations_require_post() {
    let _ = tracing_subscriber::fmt::try_init();
    let (app, _) = app(&["eth0"]);

    let (status, _) = call(&app, Method::GET, "/api/clearInterfaces").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn unattributed_batch_failure_is_server_error() {
    let _ = tracing_subscriber::fmt::try_init();
    let (app, tc) = app(&["eth0"]);
    tc.deny_batches(true);

    let (status, body) = call(&app, Method::POST, "/api/impairInterface/eth0/5/5").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"]["code"], 500);
}
