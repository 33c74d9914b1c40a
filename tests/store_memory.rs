// std
use std::sync::Arc;
// crates.io
use time::{Duration, macros};
// self
use kis_token_broker::{
	clock::ManualClock,
	store::{MemoryStore, SharedStore, StoreKeys},
};

fn store() -> (MemoryStore, ManualClock) {
	let clock = ManualClock::new(macros::datetime!(2025-06-02 00:00 UTC));

	(MemoryStore::with_clock(Arc::new(clock.clone())), clock)
}

#[tokio::test]
async fn values_expire_with_their_ttl() {
	let (store, clock) = store();

	store
		.set("kis_access_token", "record".into(), Some(Duration::seconds(10)))
		.await
		.expect("Set should succeed.");
	store.set("persistent", "value".into(), None).await.expect("Set should succeed.");
	clock.advance(Duration::seconds(9));

	assert_eq!(
		store.get("kis_access_token").await.expect("Get should succeed.").as_deref(),
		Some("record")
	);

	clock.advance(Duration::seconds(1));

	assert_eq!(store.get("kis_access_token").await.expect("Get should succeed."), None);
	assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn set_if_absent_only_wins_over_expired_entries() {
	let (store, clock) = store();

	assert!(
		store
			.set_if_absent("kis_token_lock", "first".into(), Duration::seconds(10))
			.await
			.expect("Set-if-absent should succeed.")
	);
	assert!(
		!store
			.set_if_absent("kis_token_lock", "second".into(), Duration::seconds(10))
			.await
			.expect("Set-if-absent should succeed.")
	);

	clock.advance(Duration::seconds(10));

	assert!(
		store
			.set_if_absent("kis_token_lock", "third".into(), Duration::seconds(10))
			.await
			.expect("Set-if-absent should succeed.")
	);
	assert_eq!(
		store.get("kis_token_lock").await.expect("Get should succeed.").as_deref(),
		Some("third")
	);
}

#[tokio::test]
async fn compare_and_delete_only_removes_the_expected_owner() {
	let (store, clock) = store();

	store
		.set("kis_token_lock", "owner-b".into(), Some(Duration::seconds(10)))
		.await
		.expect("Set should succeed.");

	assert!(
		!store
			.delete_if_equals("kis_token_lock", "owner-a")
			.await
			.expect("Compare-and-delete should succeed.")
	);
	assert!(store.contains_key("kis_token_lock"));
	assert!(
		store
			.delete_if_equals("kis_token_lock", "owner-b")
			.await
			.expect("Compare-and-delete should succeed.")
	);
	assert!(!store.contains_key("kis_token_lock"));

	store
		.set("kis_token_lock", "owner-c".into(), Some(Duration::seconds(10)))
		.await
		.expect("Set should succeed.");
	clock.advance(Duration::seconds(10));

	assert!(
		!store
			.delete_if_equals("kis_token_lock", "owner-c")
			.await
			.expect("Compare-and-delete should succeed.")
	);
}

#[tokio::test]
async fn delete_reports_whether_a_live_value_existed() {
	let (store, _clock) = store();

	store.set("kis_token_cooldown", "1".into(), None).await.expect("Set should succeed.");

	assert!(store.delete("kis_token_cooldown").await.expect("Delete should succeed."));
	assert!(!store.delete("kis_token_cooldown").await.expect("Delete should succeed."));
	assert!(store.is_empty());
}

#[test]
fn key_prefix_separates_app_keys() {
	let keys = StoreKeys::with_prefix("acct2");

	assert_eq!(keys.token, "acct2_access_token");
	assert_eq!(keys.lock, "acct2_token_lock");
	assert_eq!(keys.cooldown, "acct2_token_cooldown");
	assert_eq!(StoreKeys::default().token, "kis_access_token");
}
