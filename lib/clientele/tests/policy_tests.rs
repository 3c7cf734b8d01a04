//! Integration tests for fault-tolerance policies.

use std::sync::Arc;
use std::time::Duration;

use clientele::policy::{CircuitBreakerConfig, PolicySelector, PolicySpec, RetryConfig};
use clientele::{ClientConfig, ClientFactory, Method, RegistryBuilder};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

fn factory_with(
    server: &MockServer,
    configure: impl FnOnce(clientele::ClientConfigBuilder) -> clientele::ClientConfigBuilder,
) -> ClientFactory {
    let base = url::Url::parse(&server.uri()).expect("server url");
    let config = configure(ClientConfig::builder(base)).build();
    let registry = RegistryBuilder::new()
        .register("api", config)
        .expect("register")
        .build();
    ClientFactory::new(registry)
}

#[tokio::test]
async fn retry_recovers_after_transient_failures() {
    let mock_server = MockServer::start().await;

    // Two 503s, then the fallback 200 answers
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let factory = factory_with(&mock_server, |config| config.policy(PolicySpec::retry(3)));
    let client = factory.client("api").expect("client");

    let response = client.get("/flaky").await.expect("response");
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn retry_exhausts_attempt_budget() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let factory = factory_with(&mock_server, |config| config.policy(PolicySpec::retry(3)));
    let client = factory.client("api").expect("client");

    // Budget spent, the last 503 is returned as-is
    let response = client.get("/down").await.expect("response");
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn non_idempotent_requests_are_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let factory = factory_with(&mock_server, |config| config.policy(PolicySpec::retry(3)));
    let client = factory.client("api").expect("client");

    let response = client
        .post_json("/orders", &serde_json::json!({"item": 1}))
        .await
        .expect("response");
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn policy_timeout_cuts_off_slow_responses() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&mock_server)
        .await;

    let factory = factory_with(&mock_server, |config| {
        config.policy(PolicySpec::timeout(Duration::from_millis(50)))
    });
    let client = factory.client("api").expect("client");

    let err = client.get("/slow").await.expect_err("should time out");
    assert!(err.is_timeout());
}

#[tokio::test]
async fn circuit_opens_and_persists_across_handles() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/unstable"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&mock_server)
        .await;

    let breaker = CircuitBreakerConfig::new(2, Duration::from_secs(60));
    let factory = factory_with(&mock_server, |config| {
        config.policy(PolicySpec::circuit_breaker(breaker))
    });

    let client = factory.client("api").expect("client");
    for _ in 0..2 {
        let response = client.get("/unstable").await.expect("response");
        assert_eq!(response.status(), 503);
    }

    // Breaker state lives in the factory, so a fresh handle is still open
    let fresh = factory.client("api").expect("client");
    let err = fresh.get("/unstable").await.expect_err("should fail fast");
    assert!(err.is_circuit_open());
}

#[tokio::test]
async fn open_circuit_admits_trial_after_break_duration() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/recovering"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/recovering"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let breaker = CircuitBreakerConfig::new(1, Duration::from_millis(50));
    let factory = factory_with(&mock_server, |config| {
        config.policy(PolicySpec::circuit_breaker(breaker))
    });
    let client = factory.client("api").expect("client");

    let response = client.get("/recovering").await.expect("response");
    assert_eq!(response.status(), 503);
    assert!(
        client
            .get("/recovering")
            .await
            .expect_err("open circuit")
            .is_circuit_open()
    );

    tokio::time::sleep(Duration::from_millis(80)).await;

    // Trial call succeeds and the circuit closes again
    let response = client.get("/recovering").await.expect("trial");
    assert_eq!(response.status(), 200);
    let response = client.get("/recovering").await.expect("closed");
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn per_attempt_timeout_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/laggy"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&mock_server)
        .await;

    // Retry outside timeout: each attempt is bounded, but a timeout is not
    // transient, so the budget is not spent on it
    let factory = factory_with(&mock_server, |config| {
        config.policy(PolicySpec::composite([
            PolicySpec::retry(3),
            PolicySpec::timeout(Duration::from_millis(50)),
        ]))
    });
    let client = factory.client("api").expect("client");

    let err = client.get("/laggy").await.expect_err("should time out");
    assert!(err.is_timeout());
}

#[tokio::test]
async fn dynamic_selector_overrides_static_policy() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/selected"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let selector: PolicySelector = Arc::new(|request| {
        if request.method() == Method::Get {
            PolicySpec::Retry(RetryConfig::new(3))
        } else {
            PolicySpec::Retry(RetryConfig::new(1))
        }
    });

    let factory = factory_with(&mock_server, |config| {
        config
            .policy(PolicySpec::retry(1))
            .policy_selector(selector)
    });
    let client = factory.client("api").expect("client");

    let response = client.get("/selected").await.expect("response");
    assert_eq!(response.status(), 503);
}
