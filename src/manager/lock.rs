//! Refresh lock guard built on [`SharedStore::set_if_absent`].

// self
use crate::{
	_prelude::*,
	obs::trace_event,
	store::{SharedStore, StoreError},
};

/// Holder of the refresh lock.
///
/// Release is explicit through [`RefreshLock::release`]. A guard dropped without release (the
/// owning future was cancelled) schedules the delete on the current tokio runtime; the lock TTL
/// covers the case where no runtime is available.
pub(crate) struct RefreshLock {
	store: Arc<dyn SharedStore>,
	key: String,
	owner: String,
	released: bool,
}
impl RefreshLock {
	/// Attempts a single acquisition; `Ok(None)` means another holder has it.
	pub(crate) async fn try_acquire(
		store: &Arc<dyn SharedStore>,
		key: &str,
		ttl: Duration,
	) -> Result<Option<Self>, StoreError> {
		let owner = format!("{:016x}", rand::random::<u64>());

		if !store.set_if_absent(key, owner.clone(), ttl).await? {
			return Ok(None);
		}

		Ok(Some(Self { store: store.clone(), key: key.to_owned(), owner, released: false }))
	}

	/// Deletes the lock if this guard still owns it.
	pub(crate) async fn release(mut self) -> Result<(), StoreError> {
		self.released = true;

		release_owned(self.store.as_ref(), &self.key, &self.owner).await
	}
}
impl Drop for RefreshLock {
	fn drop(&mut self) {
		if self.released {
			return;
		}

		let Ok(handle) = tokio::runtime::Handle::try_current() else {
			trace_event!(warn, key = %self.key, "Refresh lock dropped outside a runtime; waiting for TTL.");

			return;
		};
		let store = self.store.clone();
		let key = std::mem::take(&mut self.key);
		let owner = std::mem::take(&mut self.owner);

		handle.spawn(async move {
			if let Err(e) = release_owned(store.as_ref(), &key, &owner).await {
				trace_event!(warn, key = %key, error = %e, "Failed to release abandoned refresh lock.");
			}
		});
	}
}

async fn release_owned(store: &dyn SharedStore, key: &str, owner: &str) -> Result<(), StoreError> {
	store.delete_if_equals(key, owner).await.map(|_| ())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::MemoryStore;

	#[tokio::test]
	async fn second_acquire_fails_until_release() {
		let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::default());
		let lock = RefreshLock::try_acquire(&store, "kis_token_lock", Duration::seconds(10))
			.await
			.expect("Lock acquisition should not error.")
			.expect("First acquisition should win.");

		assert_eq!(
			store.get("kis_token_lock").await.expect("Get should succeed.").as_deref(),
			Some(lock.owner.as_str())
		);
		assert!(
			RefreshLock::try_acquire(&store, "kis_token_lock", Duration::seconds(10))
				.await
				.expect("Lock acquisition should not error.")
				.is_none()
		);

		lock.release().await.expect("Release should succeed.");

		assert_eq!(store.get("kis_token_lock").await.expect("Get should succeed."), None);
	}

	#[tokio::test]
	async fn release_leaves_foreign_lock_alone() {
		let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::default());
		let lock = RefreshLock::try_acquire(&store, "kis_token_lock", Duration::seconds(10))
			.await
			.expect("Lock acquisition should not error.")
			.expect("First acquisition should win.");

		store
			.set("kis_token_lock", "someone-else".into(), Some(Duration::seconds(10)))
			.await
			.expect("Overwrite should succeed.");
		lock.release().await.expect("Release should succeed.");

		assert_eq!(
			store.get("kis_token_lock").await.expect("Get should succeed.").as_deref(),
			Some("someone-else")
		);
	}

	#[tokio::test]
	async fn dropped_guard_releases_in_background() {
		let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::default());
		let lock = RefreshLock::try_acquire(&store, "kis_token_lock", Duration::seconds(10))
			.await
			.expect("Lock acquisition should not error.")
			.expect("First acquisition should win.");

		drop(lock);

		for _ in 0..16 {
			if store.get("kis_token_lock").await.expect("Get should succeed.").is_none() {
				return;
			}

			tokio::task::yield_now().await;
		}

		panic!("Dropped refresh lock was never released.");
	}
}
