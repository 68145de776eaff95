//! Cluster health check and failed member removal against a fake Consul agent

mod common;

use std::time::Duration;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use nodekeeper_cli::commands::{ClusterFailureRemover, ClusterHealthCheck};
use nodekeeper_cli::config::ConsulConfig;
use nodekeeper_cli::consul::ConsulClient;
use nodekeeper_cli::CheckStatus;

const MEMBERS: &str = "/v1/agent/members";

fn consul_router(members: Value) -> Router {
    Router::new()
        .route(MEMBERS, get(move || async move { Json(members) }))
        .route(
            "/v1/agent/force-leave/:name",
            put(|Path(name): Path<String>| async move {
                if name == "node-c" {
                    StatusCode::INTERNAL_SERVER_ERROR
                } else {
                    StatusCode::OK
                }
            }),
        )
}

fn client(base_url: &str) -> ConsulClient {
    ConsulClient::new(base_url, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_single_failed_member_removed_once() {
    let server = common::spawn(consul_router(json!([
        {"Name": "node-a", "Addr": "10.0.0.1", "Status": 1},
        {"Name": "node-b", "Addr": "10.0.0.2", "Status": 4}
    ])))
    .await;

    let report = ClusterFailureRemover::new(client(&server.url()))
        .remove_failed()
        .await
        .unwrap();

    assert_eq!(report.removed(), vec!["node-b"]);
    assert_eq!(server.recorder.count_method("PUT"), 1);
    assert_eq!(server.recorder.count("PUT", "/v1/agent/force-leave/node-b"), 1);
}

#[tokio::test]
async fn test_health_check_flags_failed_member() {
    let server = common::spawn(consul_router(json!([
        {"Name": "node-a", "Status": 1},
        {"Name": "node-b", "Status": 4}
    ])))
    .await;

    let out = ClusterHealthCheck::new(client(&server.url())).run().await;

    assert_eq!(out.status, CheckStatus::Critical);
    assert_eq!(
        out.line,
        "CheckConsulFailures CRITICAL: Failed nodes exist within the consul cluster!"
    );
    assert_eq!(server.recorder.count_method("PUT"), 0);
}

#[tokio::test]
async fn test_healthy_cluster_only_reads_membership() {
    let server = common::spawn(consul_router(json!([
        {"Name": "node-a", "Status": 1},
        {"Name": "node-b", "Status": 3}
    ])))
    .await;

    let remover = ClusterFailureRemover::new(client(&server.url()));
    assert_eq!(remover.run().await.status, CheckStatus::Ok);
    assert_eq!(remover.run().await.status, CheckStatus::Ok);

    let out = ClusterHealthCheck::new(client(&server.url())).run().await;
    assert_eq!(out.line, "CheckConsulFailures OK");

    assert_eq!(server.recorder.count("GET", MEMBERS), 3);
    assert_eq!(server.recorder.requests().len(), 3);
}

#[tokio::test]
async fn test_removal_failure_is_reported() {
    let server = common::spawn(consul_router(json!([
        {"Name": "node-b", "Status": 4},
        {"Name": "node-c", "Status": 4}
    ])))
    .await;

    let out = ClusterFailureRemover::new(client(&server.url())).run().await;

    assert_eq!(out.status, CheckStatus::Critical);
    assert_eq!(
        out.line,
        "ConsulRemoveFailedNodes CRITICAL: Unable to remove failed nodes: node-c"
    );
    assert_eq!(server.recorder.count_method("PUT"), 2);
}

#[tokio::test]
async fn test_membership_error_short_circuits() {
    let router = Router::new()
        .route(MEMBERS, get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route("/v1/agent/force-leave/:name", put(|| async { StatusCode::OK }));
    let server = common::spawn(router).await;

    let check = ClusterHealthCheck::new(client(&server.url())).run().await;
    assert_eq!(check.line, "CheckConsulFailures CRITICAL: Consul is not responding");

    let removal = ClusterFailureRemover::new(client(&server.url())).run().await;
    assert_eq!(removal.status, CheckStatus::Critical);
    assert_eq!(
        removal.line,
        "ConsulRemoveFailedNodes CRITICAL: Consul is not responding"
    );

    assert_eq!(server.recorder.count_method("PUT"), 0);
}

#[tokio::test]
async fn test_timeout_has_its_own_message() {
    let router = Router::new().route(
        MEMBERS,
        get(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Json(json!([]))
        }),
    );
    let server = common::spawn(router).await;
    let consul = ConsulClient::new(&server.url(), Duration::from_millis(200)).unwrap();

    let out = ClusterHealthCheck::new(consul).run().await;

    assert_eq!(out.status, CheckStatus::Critical);
    assert_eq!(out.line, "CheckConsulFailures CRITICAL: Consul Connection timed out");
}

#[tokio::test]
async fn test_connection_refused_is_not_responding() {
    let base_url = common::closed_port().await;

    let out = ClusterHealthCheck::new(client(&base_url)).run().await;

    assert_eq!(out.status, CheckStatus::Critical);
    assert_eq!(out.line, "CheckConsulFailures CRITICAL: Consul is not responding");
}

#[tokio::test]
async fn test_malformed_membership_is_unknown() {
    let router = Router::new().route(MEMBERS, get(|| async { "not json" }));
    let server = common::spawn(router).await;

    let out = ClusterHealthCheck::new(client(&server.url())).run().await;

    assert_eq!(out.status, CheckStatus::Unknown);
    assert_eq!(out.exit_code(), 3);
}

#[tokio::test]
async fn test_token_sent_from_config() {
    let server = common::spawn(consul_router(json!([]))).await;
    let config = ConsulConfig {
        host: server.addr.ip().to_string(),
        port: server.addr.port(),
        token: Some("acl-token".to_string()),
        ..ConsulConfig::default()
    };

    let members = ConsulClient::from_config(&config)
        .unwrap()
        .members()
        .await
        .unwrap();

    assert!(members.is_empty());
    let requests = server.recorder.matching("GET", MEMBERS);
    assert_eq!(requests[0].header("x-consul-token"), Some("acl-token"));
}
