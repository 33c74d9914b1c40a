// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use time::{Duration, macros};
use url::Url;
// self
use kis_token_broker::{
	auth::Credentials,
	clock::ManualClock,
	error::{Error, TransientError},
	issuance::{IssuanceClient, KisIssuanceClient},
};

const TOKEN_PATH: &str = "/oauth2/tokenP";

fn credentials() -> Credentials {
	Credentials::new("PSmockappkey0001", "mock-app-secret")
		.expect("Mock credentials should be valid.")
}

fn issuer(server: &MockServer, clock: &ManualClock) -> KisIssuanceClient {
	let base = Url::parse(&format!("http://{}", server.address()))
		.expect("Mock server URL should parse.");

	KisIssuanceClient::new(&base)
		.expect("Issuance client should build.")
		.with_clock(Arc::new(clock.clone()))
}

#[tokio::test]
async fn issue_reads_declared_lifetime() {
	let server = MockServer::start_async().await;
	let clock = ManualClock::new(macros::datetime!(2025-06-02 00:00 UTC));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.header("content-type", "application/json")
				.json_body(serde_json::json!({
					"grant_type": "client_credentials",
					"appkey": "PSmockappkey0001",
					"appsecret": "mock-app-secret",
				}));
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"issued\",\"token_type\":\"Bearer\",\"expires_in\":86400,\"access_token_token_expired\":\"2025-06-03 09:00:00\"}",
			);
		})
		.await;
	let issued =
		issuer(&server, &clock).issue(&credentials()).await.expect("Issuance should succeed.");

	assert_eq!(issued.access_token.expose(), "issued");
	assert_eq!(issued.lifetime, Some(Duration::days(1)));

	mock.assert_async().await;
}

#[tokio::test]
async fn absolute_expiry_is_read_as_korea_time() {
	let server = MockServer::start_async().await;
	let clock = ManualClock::new(macros::datetime!(2025-06-02 00:00 UTC));

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"issued\",\"access_token_token_expired\":\"2025-06-02 21:00:00\"}",
			);
		})
		.await;

	let issued =
		issuer(&server, &clock).issue(&credentials()).await.expect("Issuance should succeed.");

	// 21:00 KST is 12:00 UTC.
	assert_eq!(issued.lifetime, Some(Duration::hours(12)));
}

#[tokio::test]
async fn per_minute_limit_is_reported_as_rate_limited() {
	let server = MockServer::start_async().await;
	let clock = ManualClock::new(macros::datetime!(2025-06-02 00:00 UTC));

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(403).header("content-type", "application/json").body(
				"{\"error_code\":\"EGW00133\",\"error_description\":\"접근토큰 발급 잠시 후 다시 시도하세요(1분당 1회)\"}",
			);
		})
		.await;

	let err = issuer(&server, &clock)
		.issue(&credentials())
		.await
		.expect_err("Rate-limited issuance should fail.");

	assert!(matches!(err, Error::IssuanceRateLimited { .. }));
	assert!(err.is_token_rejection());
}

#[tokio::test]
async fn too_many_requests_carries_retry_after() {
	let server = MockServer::start_async().await;
	let clock = ManualClock::new(macros::datetime!(2025-06-02 00:00 UTC));

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(429).header("retry-after", "7").body("slow down");
		})
		.await;

	let err = issuer(&server, &clock)
		.issue(&credentials())
		.await
		.expect_err("Throttled issuance should fail.");

	assert_eq!(err.retry_after(), Some(Duration::seconds(7)));
	assert!(matches!(err, Error::IssuanceRateLimited { .. }));
}

#[tokio::test]
async fn rejected_app_key_is_not_retryable() {
	let server = MockServer::start_async().await;
	let clock = ManualClock::new(macros::datetime!(2025-06-02 00:00 UTC));

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(403).header("content-type", "application/json").body(
				"{\"error_code\":\"EGW00103\",\"error_description\":\"유효하지 않은 AppKey입니다.\"}",
			);
		})
		.await;

	let err = issuer(&server, &clock)
		.issue(&credentials())
		.await
		.expect_err("Rejected credentials should fail.");

	assert!(matches!(err, Error::InvalidCredentials { ref code, .. } if code == "EGW00103"));
	assert!(!err.is_retryable());
}

#[tokio::test]
async fn malformed_success_body_is_transient() {
	let server = MockServer::start_async().await;
	let clock = ManualClock::new(macros::datetime!(2025-06-02 00:00 UTC));

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body("{\"access_token\":");
		})
		.await;

	let err = issuer(&server, &clock)
		.issue(&credentials())
		.await
		.expect_err("Truncated body should fail.");

	assert!(matches!(err, Error::Transient(TransientError::ResponseParse { .. })));
	assert!(err.is_retryable());
}
