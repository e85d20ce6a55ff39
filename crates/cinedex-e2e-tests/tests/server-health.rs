use cinedex_e2e_tests::{prepare_env, spawn_server};
use serde_json::Value;
use tracing::info;
use tracing_test::traced_test;

#[tokio::test]
#[traced_test]
async fn test_health() {
    let (args, _config_guard) = prepare_env("test_health").await.unwrap();
    let base_url = spawn_server(args).await.unwrap();

    let client = reqwest::Client::new();
    let response = client
        .get(base_url.join("v1/healthcheck").unwrap())
        .send()
        .await
        .unwrap();
    info!("Response: {:#?}", response);
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "available");
    assert_eq!(body["system_info"]["environment"], "staging");
    assert_eq!(body["system_info"]["version"], env!("CARGO_PKG_VERSION"));

    let response = client
        .get(base_url.join("v1/nowhere").unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}
