//! Shared-store contract and built-in backends for the cached token, refresh lock, and
//! cooldown marker.
//!
//! The token manager only needs four primitives (`get`, `set`, `set_if_absent`, `delete`)
//! with optional time-to-live. Process-local backends ([`MemoryStore`], [`FileStore`]) give
//! single-instance deployments persistence across restarts; [`RedisStore`] (behind the
//! `redis` feature) makes the refresh lock race-free across processes.

pub mod file;
pub mod memory;
#[cfg(feature = "redis")] pub mod redis;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "redis")] pub use redis::RedisStore;

// self
use crate::_prelude::*;

/// Boxed future returned by [`SharedStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Key/value backend visible to every caller that shares the token.
pub trait SharedStore
where
	Self: Send + Sync,
{
	/// Fetches the live value stored under `key`, if any.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Stores `value` under `key`, replacing any previous value.
	///
	/// `ttl` of `None` keeps the value until it is deleted.
	fn set<'a>(
		&'a self,
		key: &'a str,
		value: String,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, ()>;

	/// Atomically stores `value` only when no live value exists.
	///
	/// Returns `true` when this call created the entry.
	fn set_if_absent<'a>(
		&'a self,
		key: &'a str,
		value: String,
		ttl: Duration,
	) -> StoreFuture<'a, bool>;

	/// Removes the value stored under `key`; returns `true` when something was removed.
	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;

	/// Atomically removes `key` only while its live value equals `expected`.
	///
	/// Returns `true` when this call removed the entry. Lock holders release through this so a
	/// holder that outlived its TTL never deletes a lock acquired by someone else since.
	fn delete_if_equals<'a>(&'a self, key: &'a str, expected: &'a str) -> StoreFuture<'a, bool>;
}

/// Error type produced by [`SharedStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Value plus optional absolute expiry, as kept by the process-local backends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
	/// Stored payload.
	pub value: String,
	/// Instant the entry stops being visible.
	pub expires_at: Option<OffsetDateTime>,
}
impl StoredEntry {
	/// Builds an entry expiring `ttl` after `now`.
	pub fn new(value: String, now: OffsetDateTime, ttl: Option<Duration>) -> Self {
		Self { value, expires_at: ttl.map(|ttl| now + ttl) }
	}

	/// Returns `true` while the entry has not expired.
	pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_none_or(|at| now < at)
	}
}

/// Key names used for the three pieces of shared token state.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StoreKeys {
	/// Cached token record.
	pub token: String,
	/// Refresh lock marker.
	pub lock: String,
	/// Failure cooldown marker.
	pub cooldown: String,
}
impl StoreKeys {
	/// Default key prefix.
	pub const DEFAULT_PREFIX: &'static str = "kis";

	/// Derives the key set for `prefix`, letting several app keys share one backend.
	pub fn with_prefix(prefix: &str) -> Self {
		Self {
			token: format!("{prefix}_access_token"),
			lock: format!("{prefix}_token_lock"),
			cooldown: format!("{prefix}_token_cooldown"),
		}
	}
}
impl Default for StoreKeys {
	fn default() -> Self {
		Self::with_prefix(Self::DEFAULT_PREFIX)
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::error::Error;
	use std::error::Error as StdError;

	#[test]
	fn store_error_converts_into_broker_error_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let broker_error: Error = store_error.clone().into();

		assert!(matches!(broker_error, Error::Storage(_)));
		assert!(broker_error.to_string().contains("database unreachable"));

		let source = StdError::source(&broker_error)
			.expect("Broker error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn entries_expire_exactly_at_ttl() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let entry = StoredEntry::new("locked".into(), now, Some(Duration::seconds(10)));

		assert!(entry.is_live_at(now + Duration::seconds(9)));
		assert!(!entry.is_live_at(now + Duration::seconds(10)));
		assert!(StoredEntry::new("forever".into(), now, None).is_live_at(now + Duration::weeks(52)));
	}

	#[test]
	fn key_prefix_partitions_state() {
		let keys = StoreKeys::with_prefix("paper");

		assert_eq!(keys.token, "paper_access_token");
		assert_eq!(keys.lock, "paper_token_lock");
		assert_eq!(keys.cooldown, "paper_token_cooldown");
		assert_eq!(StoreKeys::default().token, "kis_access_token");
	}
}
