//! Redis-backed [`SharedStore`] so several processes share one token and one refresh lock.

// crates.io
use redis::{AsyncCommands, Client, RedisError, Script, aio::ConnectionManager};
// self
use crate::{
	_prelude::*,
	store::{SharedStore, StoreError, StoreFuture},
};

/// Shared backend speaking to a Redis server through a reconnecting connection manager.
///
/// `set_if_absent` maps to `SET key value NX PX ttl` and `delete_if_equals` to a compare-and-delete
/// script; Redis evaluates both atomically, so the refresh lock holds across every process
/// pointed at the same server.
#[derive(Clone)]
pub struct RedisStore {
	conn: ConnectionManager,
}
impl RedisStore {
	/// Connects to `url` (for example `redis://127.0.0.1:6379/0`).
	pub async fn connect(url: &str) -> Result<Self, StoreError> {
		let client = Client::open(url).map_err(backend_error)?;
		let conn = ConnectionManager::new(client).await.map_err(backend_error)?;

		Ok(Self { conn })
	}

	/// Wraps an existing connection manager.
	pub fn with_connection(conn: ConnectionManager) -> Self {
		Self { conn }
	}
}
impl Debug for RedisStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("RedisStore(..)")
	}
}
impl SharedStore for RedisStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let mut conn = self.conn.clone();

		Box::pin(async move {
			let value: Option<String> = conn.get(key).await.map_err(backend_error)?;

			Ok(value)
		})
	}

	fn set<'a>(
		&'a self,
		key: &'a str,
		value: String,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, ()> {
		let mut conn = self.conn.clone();

		Box::pin(async move {
			let mut cmd = redis::cmd("SET");

			cmd.arg(key).arg(value);

			if let Some(ttl) = ttl {
				cmd.arg("PX").arg(ttl_millis(ttl));
			}

			let _: () = cmd.query_async(&mut conn).await.map_err(backend_error)?;

			Ok(())
		})
	}

	fn set_if_absent<'a>(
		&'a self,
		key: &'a str,
		value: String,
		ttl: Duration,
	) -> StoreFuture<'a, bool> {
		let mut conn = self.conn.clone();

		Box::pin(async move {
			// `SET NX` replies nil when the key already exists.
			let reply: Option<String> = redis::cmd("SET")
				.arg(key)
				.arg(value)
				.arg("NX")
				.arg("PX")
				.arg(ttl_millis(ttl))
				.query_async(&mut conn)
				.await
				.map_err(backend_error)?;

			Ok(reply.is_some())
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
		let mut conn = self.conn.clone();

		Box::pin(async move {
			let removed: i64 = conn.del(key).await.map_err(backend_error)?;

			Ok(removed > 0)
		})
	}

	fn delete_if_equals<'a>(&'a self, key: &'a str, expected: &'a str) -> StoreFuture<'a, bool> {
		let mut conn = self.conn.clone();

		Box::pin(async move {
			let removed: i64 = Script::new(DELETE_IF_EQUALS)
				.key(key)
				.arg(expected)
				.invoke_async(&mut conn)
				.await
				.map_err(backend_error)?;

			Ok(removed > 0)
		})
	}
}

const DELETE_IF_EQUALS: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
	return redis.call("DEL", KEYS[1])
end
return 0
"#;

fn backend_error(e: RedisError) -> StoreError {
	StoreError::Backend { message: format!("Redis command failed: {e}") }
}

/// Redis rejects non-positive expirations, so sub-millisecond TTLs round up to one.
fn ttl_millis(ttl: Duration) -> i64 {
	i64::try_from(ttl.whole_milliseconds()).unwrap_or(i64::MAX).max(1)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn ttl_is_sent_in_whole_milliseconds() {
		assert_eq!(ttl_millis(Duration::seconds(10)), 10_000);
		assert_eq!(ttl_millis(Duration::hours(22)), 79_200_000);
		assert_eq!(ttl_millis(Duration::ZERO), 1);
		assert_eq!(ttl_millis(Duration::seconds(-3)), 1);
	}
}
