//! Thread-safe in-memory [`SharedStore`] for single-process deployments and tests.
//!
//! State does not survive restarts and is not shared across processes; every cold start
//! issues a fresh token.

// self
use crate::{
	_prelude::*,
	clock::{self, Clock},
	store::{SharedStore, StoreError, StoreFuture, StoredEntry},
};

type EntryMap = Arc<RwLock<HashMap<String, StoredEntry>>>;

/// Process-local backend; expired entries are dropped lazily on access.
#[derive(Clone)]
pub struct MemoryStore {
	entries: EntryMap,
	clock: Arc<dyn Clock>,
}
impl MemoryStore {
	/// Creates an empty store that evaluates TTLs against `clock`.
	pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
		Self { entries: Default::default(), clock }
	}

	/// Returns `true` when a live value exists for `key`, without awaiting.
	pub fn contains_key(&self, key: &str) -> bool {
		let now = self.clock.now();

		self.entries.read().get(key).is_some_and(|entry| entry.is_live_at(now))
	}

	/// Number of live entries.
	pub fn len(&self) -> usize {
		let now = self.clock.now();

		self.entries.read().values().filter(|entry| entry.is_live_at(now)).count()
	}

	/// Returns `true` when no live entries remain.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn get_now(map: &EntryMap, key: &str, now: OffsetDateTime) -> Option<String> {
		{
			let guard = map.read();

			match guard.get(key) {
				Some(entry) if entry.is_live_at(now) => return Some(entry.value.clone()),
				Some(_) => {},
				None => return None,
			}
		}

		map.write().remove(key);

		None
	}

	fn set_if_absent_now(map: &EntryMap, key: &str, entry: StoredEntry, now: OffsetDateTime) -> bool {
		let mut guard = map.write();

		if guard.get(key).is_some_and(|existing| existing.is_live_at(now)) {
			return false;
		}

		guard.insert(key.to_owned(), entry);

		true
	}

	fn delete_if_equals_now(map: &EntryMap, key: &str, expected: &str, now: OffsetDateTime) -> bool {
		let mut guard = map.write();

		if !guard.get(key).is_some_and(|entry| entry.is_live_at(now) && entry.value == expected) {
			return false;
		}

		guard.remove(key);

		true
	}

	fn delete_now(map: &EntryMap, key: &str, now: OffsetDateTime) -> bool {
		map.write().remove(key).is_some_and(|entry| entry.is_live_at(now))
	}
}
impl Default for MemoryStore {
	fn default() -> Self {
		Self::with_clock(clock::system_clock())
	}
}
impl Debug for MemoryStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryStore").field("entries", &self.entries.read().len()).finish()
	}
}
impl SharedStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let now = self.clock.now();

		Box::pin(async move { Ok(Self::get_now(&self.entries, key, now)) })
	}

	fn set<'a>(
		&'a self,
		key: &'a str,
		value: String,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, ()> {
		let entry = StoredEntry::new(value, self.clock.now(), ttl);

		Box::pin(async move {
			self.entries.write().insert(key.to_owned(), entry);

			Ok(())
		})
	}

	fn set_if_absent<'a>(
		&'a self,
		key: &'a str,
		value: String,
		ttl: Duration,
	) -> StoreFuture<'a, bool> {
		let now = self.clock.now();
		let entry = StoredEntry::new(value, now, Some(ttl));

		Box::pin(async move { Ok(Self::set_if_absent_now(&self.entries, key, entry, now)) })
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
		let now = self.clock.now();

		Box::pin(async move { Ok::<_, StoreError>(Self::delete_now(&self.entries, key, now)) })
	}

	fn delete_if_equals<'a>(&'a self, key: &'a str, expected: &'a str) -> StoreFuture<'a, bool> {
		let now = self.clock.now();

		Box::pin(async move {
			Ok::<_, StoreError>(Self::delete_if_equals_now(&self.entries, key, expected, now))
		})
	}
}
