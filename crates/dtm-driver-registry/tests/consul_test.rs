//! Consul registry tests against a mocked agent API

use dtm_driver_common::ServiceInstance;
use dtm_driver_registry::{ConsulClientConfig, ConsulRegistry, RegistryError, ServiceRegistry};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn instance() -> ServiceInstance {
    ServiceInstance {
        id: "id-1".to_string(),
        name: "pay.order".to_string(),
        endpoints: vec!["grpc://10.0.0.5:36790".to_string()],
        ..Default::default()
    }
}

fn registry(server: &MockServer) -> ConsulRegistry {
    ConsulRegistry::new(ConsulClientConfig::new(&server.uri()).with_checks(true, false)).unwrap()
}

#[tokio::test]
async fn test_register_sends_agent_registration() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/register"))
        .and(query_param("replace-existing-checks", "true"))
        .and(body_partial_json(json!({
            "ID": "id-1",
            "Name": "pay.order",
            "Address": "10.0.0.5",
            "Port": 36790,
            "TaggedAddresses": {"grpc": {"Address": "10.0.0.5", "Port": 36790}}
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    registry(&server).register(&instance()).await.unwrap();
}

#[tokio::test]
async fn test_register_sends_token() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/register"))
        .and(header("X-Consul-Token", "secret"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let registry = ConsulRegistry::new(
        ConsulClientConfig::new(&server.uri())
            .with_token("secret")
            .with_checks(false, false),
    )
    .unwrap();
    registry.register(&instance()).await.unwrap();
}

#[tokio::test]
async fn test_register_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/register"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Invalid check"))
        .mount(&server)
        .await;

    let err = registry(&server).register(&instance()).await.unwrap_err();
    match err {
        RegistryError::RequestFailed { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "Invalid check");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_deregister() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/deregister/id-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    registry(&server).deregister(&instance()).await.unwrap();
}

#[tokio::test]
async fn test_get_service() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/health/service/pay.order"))
        .and(query_param("passing", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "Service": {
                    "ID": "id-1",
                    "Service": "pay.order",
                    "Tags": ["version=v2"],
                    "Address": "10.0.0.5",
                    "Port": 36790,
                    "Meta": {"zone": "a"},
                    "TaggedAddresses": {"grpc": {"Address": "10.0.0.5", "Port": 36790}}
                }
            }
        ])))
        .mount(&server)
        .await;

    let instances = registry(&server).get_service("pay.order").await.unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].id, "id-1");
    assert_eq!(instances[0].version, "v2");
    assert_eq!(instances[0].endpoints, vec!["grpc://10.0.0.5:36790"]);
    assert_eq!(instances[0].metadata.get("zone").map(String::as_str), Some("a"));
}
