//! Simple file-backed [`SharedStore`] so a single instance keeps its token across restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	clock::{self, Clock},
	store::{SharedStore, StoreError, StoreFuture, StoredEntry},
};

/// Persists entries to a JSON file after each mutation.
///
/// The file lock is process-local: two processes pointing at the same path may still
/// issue duplicate tokens.
#[derive(Clone)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<HashMap<String, StoredEntry>>>,
	clock: Arc<dyn Clock>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		Self::open_with_clock(path, clock::system_clock())
	}

	/// Same as [`FileStore::open`] but evaluates TTLs against `clock`.
	pub fn open_with_clock(
		path: impl Into<PathBuf>,
		clock: Arc<dyn Clock>,
	) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let now = clock.now();
		let mut snapshot = if path.exists() { Self::load_snapshot(&path)? } else { HashMap::new() };

		snapshot.retain(|_, entry| entry.is_live_at(now));

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)), clock })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<String, StoredEntry>, StoreError> {
		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;
		let entries: Vec<(String, StoredEntry)> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		Ok(entries.into_iter().collect())
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &HashMap<String, StoredEntry>) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let mut snapshot: Vec<_> = contents.iter().collect();

		snapshot.sort_by(|a, b| a.0.cmp(b.0));

		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl Debug for FileStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FileStore").field("path", &self.path).finish()
	}
}
impl SharedStore for FileStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move {
			let now = self.clock.now();
			let guard = self.inner.read();

			Ok(guard.get(key).filter(|entry| entry.is_live_at(now)).map(|entry| entry.value.clone()))
		})
	}

	fn set<'a>(
		&'a self,
		key: &'a str,
		value: String,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let now = self.clock.now();
			let mut guard = self.inner.write();

			guard.retain(|_, entry| entry.is_live_at(now));
			guard.insert(key.to_owned(), StoredEntry::new(value, now, ttl));
			self.persist_locked(&guard)
		})
	}

	fn set_if_absent<'a>(
		&'a self,
		key: &'a str,
		value: String,
		ttl: Duration,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			let now = self.clock.now();
			let mut guard = self.inner.write();

			if guard.get(key).is_some_and(|entry| entry.is_live_at(now)) {
				return Ok(false);
			}

			guard.insert(key.to_owned(), StoredEntry::new(value, now, Some(ttl)));
			self.persist_locked(&guard)?;

			Ok(true)
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			let now = self.clock.now();
			let mut guard = self.inner.write();
			let removed = guard.remove(key);

			if removed.is_some() {
				self.persist_locked(&guard)?;
			}

			Ok(removed.is_some_and(|entry| entry.is_live_at(now)))
		})
	}

	fn delete_if_equals<'a>(&'a self, key: &'a str, expected: &'a str) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			let now = self.clock.now();
			let mut guard = self.inner.write();

			if !guard.get(key).is_some_and(|entry| entry.is_live_at(now) && entry.value == expected) {
				return Ok(false);
			}

			guard.remove(key);
			self.persist_locked(&guard)?;

			Ok(true)
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{
		auth::{CachedToken, TokenSecret},
		clock::ManualClock,
	};

	fn temp_path(tag: &str) -> PathBuf {
		let unique = format!(
			"kis_token_broker_file_store_{tag}_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	#[tokio::test]
	async fn cached_token_survives_reopen() {
		let path = temp_path("reopen");
		let clock = ManualClock::new(macros::datetime!(2025-05-05 10:00 UTC));
		let store = FileStore::open_with_clock(&path, Arc::new(clock.clone()))
			.expect("Failed to open file store snapshot.");
		let record = CachedToken::new(
			TokenSecret::new("persisted"),
			clock.now(),
			clock.now() + Duration::hours(22),
		);

		store
			.set("kis_access_token", record.encode().expect("Encoding should succeed."), None)
			.await
			.expect("Failed to save fixture record to file store.");
		drop(store);

		let reopened = FileStore::open_with_clock(&path, Arc::new(clock.clone()))
			.expect("Failed to reopen file store snapshot.");
		let raw = reopened
			.get("kis_access_token")
			.await
			.expect("Failed to fetch fixture record from file store.")
			.expect("File store lost record after reopen.");

		assert_eq!(CachedToken::decode(&raw).expect("Stored record should decode."), record);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[tokio::test]
	async fn expired_lock_is_dropped_on_reopen() {
		let path = temp_path("lock");
		let clock = ManualClock::new(macros::datetime!(2025-05-05 10:00 UTC));
		let store = FileStore::open_with_clock(&path, Arc::new(clock.clone()))
			.expect("Failed to open file store snapshot.");

		assert!(
			store
				.set_if_absent("kis_token_lock", "owner-a".into(), Duration::seconds(10))
				.await
				.expect("First lock attempt should succeed.")
		);
		assert!(
			!store
				.set_if_absent("kis_token_lock", "owner-b".into(), Duration::seconds(10))
				.await
				.expect("Second lock attempt should report contention.")
		);

		clock.advance(Duration::seconds(11));

		let reopened = FileStore::open_with_clock(&path, Arc::new(clock.clone()))
			.expect("Failed to reopen file store snapshot.");

		assert_eq!(reopened.get("kis_token_lock").await.expect("Get should succeed."), None);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}
}
