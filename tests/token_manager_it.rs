// std
use std::sync::Arc;
// crates.io
use futures::future;
use httpmock::prelude::*;
use time::{Duration, macros};
use url::Url;
// self
use kis_token_broker::{
	auth::{CachedToken, Credentials, TokenSecret},
	clock::{Clock, ManualClock},
	error::Error,
	issuance::KisIssuanceClient,
	manager::TokenManager,
	store::{MemoryStore, SharedStore},
};

const TOKEN_PATH: &str = "/oauth2/tokenP";

struct Harness {
	manager: TokenManager,
	clock: ManualClock,
	store: Arc<MemoryStore>,
}

fn harness(server: &MockServer) -> Harness {
	let clock = ManualClock::new(macros::datetime!(2025-06-02 00:00 UTC));
	let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
	let store = Arc::new(MemoryStore::with_clock(shared_clock.clone()));
	let base = Url::parse(&format!("http://{}", server.address()))
		.expect("Mock server URL should parse.");
	let issuer = KisIssuanceClient::new(&base)
		.expect("Issuance client should build.")
		.with_clock(shared_clock.clone());
	let credentials = Credentials::new("PSmockappkey0001", "mock-app-secret")
		.expect("Mock credentials should be valid.");
	let manager =
		TokenManager::new(store.clone(), Arc::new(issuer), credentials).with_clock(shared_clock);

	Harness { manager, clock, store }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_issuance() {
	let server = MockServer::start_async().await;
	let Harness { manager, .. } = harness(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"shared-token\",\"token_type\":\"Bearer\",\"expires_in\":86400}",
			);
		})
		.await;
	let tasks = (0..10).map(|_| {
		let manager = manager.clone();

		tokio::spawn(async move { manager.token().await })
	});

	for joined in future::join_all(tasks).await {
		let token = joined
			.expect("Token task should not panic.")
			.expect("Every concurrent caller should receive a token.");

		assert_eq!(token.expose(), "shared-token");
	}

	mock.assert_calls_async(1).await;

	assert_eq!(manager.metrics().attempts(), 1);
}

#[tokio::test]
async fn valid_cached_token_is_returned_without_issuance() {
	let server = MockServer::start_async().await;
	let Harness { manager, clock, store } = harness(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(500);
		})
		.await;
	let now = clock.now();
	let record =
		CachedToken::new(TokenSecret::new("abc"), now, now + Duration::milliseconds(1_000));

	store
		.set(&manager.keys().token, record.encode().expect("Record should encode."), None)
		.await
		.expect("Seeding the cache should succeed.");

	let (first, second) = tokio::join!(manager.token(), manager.token());

	assert_eq!(first.expect("Cached token should be served.").expose(), "abc");
	assert_eq!(second.expect("Cached token should be served.").expose(), "abc");
	assert_eq!(manager.metrics().cache_hits(), 2);

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn missing_lifetime_caches_for_twenty_two_hours() {
	let server = MockServer::start_async().await;
	let Harness { manager, clock, store } = harness(&server);

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH).json_body(serde_json::json!({
				"grant_type": "client_credentials",
				"appkey": "PSmockappkey0001",
				"appsecret": "mock-app-secret",
			}));
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"xyz\",\"token_type\":\"Bearer\"}");
		})
		.await;

	let token = manager.token().await.expect("Token should be issued.");
	let record = manager
		.cached_record()
		.await
		.expect("Store read should succeed.")
		.expect("Issued token should be cached.");

	assert_eq!(token.expose(), "xyz");
	assert_eq!(record.expires_at, clock.now() + Duration::hours(22));
	assert!(!store.contains_key(&manager.keys().lock));

	clock.advance(Duration::hours(22));

	assert!(manager.cached().await.expect("Store read should succeed.").is_none());
}

#[tokio::test]
async fn failed_issuance_releases_the_lock() {
	let server = MockServer::start_async().await;
	let Harness { manager, store, .. } = harness(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(502).body("<html>bad gateway</html>");
		})
		.await;
	let err = manager.token().await.expect_err("Gateway failure should surface.");

	assert_eq!(err.status(), Some(502));
	assert!(!store.contains_key(&manager.keys().lock));
	assert!(!store.contains_key(&manager.keys().cooldown));
	assert_eq!(manager.metrics().failures(), 1);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn rate_limited_issuance_cools_down_for_the_window() {
	let server = MockServer::start_async().await;
	let Harness { manager, clock, .. } = harness(&server);
	let limited = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(403).header("content-type", "application/json").body(
				"{\"error_code\":\"EGW00133\",\"error_description\":\"접근토큰 발급 잠시 후 다시 시도하세요(1분당 1회)\"}",
			);
		})
		.await;
	let err = manager.token().await.expect_err("Rate-limited issuance should fail.");

	assert!(matches!(err, Error::IssuanceRateLimited { .. }));

	clock.advance(Duration::seconds(30));

	let err = manager.token().await.expect_err("Calls inside the window should fail fast.");

	assert!(matches!(err, Error::CoolingDown { remaining } if remaining == Duration::seconds(31)));
	assert!(!err.is_retryable());

	limited.assert_calls_async(1).await;
	limited.delete_async().await;

	let issued = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"after-cooldown\",\"expires_in\":86400}");
		})
		.await;

	clock.advance(Duration::seconds(31));

	let token = manager.token().await.expect("Issuance should resume after the window.");

	assert_eq!(token.expose(), "after-cooldown");
	assert_eq!(manager.metrics().cooldown_rejections(), 1);

	issued.assert_calls_async(1).await;
}

#[tokio::test]
async fn cancelled_refresh_releases_the_lock() {
	let server = MockServer::start_async().await;
	let store = Arc::new(MemoryStore::default());
	let base = Url::parse(&format!("http://{}", server.address()))
		.expect("Mock server URL should parse.");
	let issuer = KisIssuanceClient::new(&base).expect("Issuance client should build.");
	let credentials = Credentials::new("PSmockappkey0001", "mock-app-secret")
		.expect("Mock credentials should be valid.");
	let manager = TokenManager::new(store.clone(), Arc::new(issuer), credentials);

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.delay(std::time::Duration::from_secs(5))
				.header("content-type", "application/json")
				.body("{\"access_token\":\"slow\",\"expires_in\":86400}");
		})
		.await;

	let outcome =
		tokio::time::timeout(std::time::Duration::from_millis(300), manager.token()).await;

	assert!(outcome.is_err(), "Slow issuance should be cancelled by the timeout.");

	for _ in 0..50 {
		if !store.contains_key(&manager.keys().lock) {
			return;
		}

		tokio::time::sleep(std::time::Duration::from_millis(10)).await;
	}

	panic!("Cancelled refresh left its lock behind.");
}
