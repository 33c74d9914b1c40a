//! Runtime configuration: credentials, endpoint, store backend, and timing knobs.
//!
//! Every knob has a production default, so the minimal deployment only sets
//! `KIS_APP_KEY` and `KIS_APP_SECRET`. Durations serialize as integer milliseconds.

// std
use std::path::PathBuf;
// self
use crate::{
	_prelude::*,
	auth::Credentials,
	clock::Clock,
	error::ConfigError,
	store::{FileStore, MemoryStore, SharedStore, StoreKeys},
};

/// Production gateway.
pub const DEFAULT_BASE_URL: &str = "https://openapi.koreainvestment.com:9443";
/// Environment variable overriding the gateway URL.
pub const BASE_URL_ENV: &str = "KIS_BASE_URL";
/// Environment variable selecting the Redis backend.
pub const REDIS_URL_ENV: &str = "REDIS_URL";
/// Environment variable selecting the file backend.
pub const STORE_PATH_ENV: &str = "KIS_TOKEN_STORE_PATH";

/// How long tokens are cached and how refreshers coordinate.
///
/// Cached tokens live for `min(lifetime - safety_margin, cache_ttl)`; see
/// [`TokenPolicy::cache_ttl_for`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenPolicy {
	/// Upper bound on how long an issued token is handed out.
	#[serde(with = "duration_ms")]
	pub cache_ttl: Duration,
	/// Portion of the upstream-declared lifetime left unused.
	#[serde(with = "duration_ms")]
	pub safety_margin: Duration,
	/// Time-to-live of the refresh lock.
	#[serde(with = "duration_ms")]
	pub lock_ttl: Duration,
	/// Deadline for a single issuance request; must stay below `lock_ttl`.
	#[serde(with = "duration_ms")]
	pub issue_timeout: Duration,
	/// Wait between refresh lock attempts.
	#[serde(with = "duration_ms")]
	pub lock_retry_interval: Duration,
	/// Lock attempts made before giving up with `RefreshTimedOut`.
	pub max_lock_attempts: u32,
	/// Issuance suppression window after a rate-limit rejection.
	#[serde(with = "duration_ms")]
	pub cooldown: Duration,
	/// Prefix for the store keys.
	pub key_prefix: String,
}
impl TokenPolicy {
	/// Overrides the cache TTL ceiling.
	pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
		self.cache_ttl = ttl;

		self
	}

	/// Overrides the cooldown window.
	pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
		self.cooldown = cooldown;

		self
	}

	/// Overrides the lock wait schedule.
	pub fn with_lock_schedule(mut self, retry_interval: Duration, max_attempts: u32) -> Self {
		self.lock_retry_interval = retry_interval;
		self.max_lock_attempts = max_attempts;

		self
	}

	/// Overrides the per-request issuance deadline.
	pub fn with_issue_timeout(mut self, timeout: Duration) -> Self {
		self.issue_timeout = timeout;

		self
	}

	/// Overrides the store key prefix.
	pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.key_prefix = prefix.into();

		self
	}

	/// Chooses how long a freshly issued token stays cached.
	///
	/// - No (or a non-positive) upstream lifetime: `cache_ttl`.
	/// - Lifetime above the safety margin: `min(lifetime - safety_margin, cache_ttl)`.
	/// - Otherwise: `min(lifetime / 2, cache_ttl)`.
	pub fn cache_ttl_for(&self, lifetime: Option<Duration>) -> Duration {
		match lifetime {
			Some(lifetime) if lifetime.is_positive() => {
				let usable = if lifetime > self.safety_margin {
					lifetime - self.safety_margin
				} else {
					lifetime / 2
				};

				usable.min(self.cache_ttl)
			},
			_ => self.cache_ttl,
		}
	}

	/// Store keys derived from [`TokenPolicy::key_prefix`].
	pub fn keys(&self) -> StoreKeys {
		StoreKeys::with_prefix(&self.key_prefix)
	}

	/// Rejects values the token manager cannot work with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		ensure_positive("token.cache_ttl", self.cache_ttl)?;
		ensure_non_negative("token.safety_margin", self.safety_margin)?;
		ensure_positive("token.lock_ttl", self.lock_ttl)?;
		ensure_positive("token.issue_timeout", self.issue_timeout)?;
		ensure_non_negative("token.lock_retry_interval", self.lock_retry_interval)?;
		ensure_non_negative("token.cooldown", self.cooldown)?;

		if self.issue_timeout >= self.lock_ttl {
			return Err(invalid("token.issue_timeout", "must be shorter than token.lock_ttl"));
		}
		if self.max_lock_attempts == 0 {
			return Err(invalid("token.max_lock_attempts", "must be at least 1"));
		}
		if self.key_prefix.trim().is_empty() {
			return Err(invalid("token.key_prefix", "must not be blank"));
		}

		Ok(())
	}
}
impl Default for TokenPolicy {
	fn default() -> Self {
		Self {
			cache_ttl: Duration::hours(22),
			safety_margin: Duration::hours(1),
			lock_ttl: Duration::seconds(10),
			issue_timeout: Duration::seconds(8),
			lock_retry_interval: Duration::seconds(2),
			max_lock_attempts: 15,
			cooldown: Duration::seconds(61),
			key_prefix: StoreKeys::DEFAULT_PREFIX.into(),
		}
	}
}

/// Pacing and backoff applied to quotation calls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
	/// Attempts per call, not counting the single forced token wait.
	pub max_attempts: u32,
	/// Base delay for linear (429) and exponential backoff.
	#[serde(with = "duration_ms")]
	pub base_delay: Duration,
	/// Forced pause after the upstream rejects the token.
	#[serde(with = "duration_ms")]
	pub invalid_token_pause: Duration,
	/// Minimum spacing between consecutive upstream calls.
	#[serde(with = "duration_ms")]
	pub pacing_interval: Duration,
}
impl RetryConfig {
	/// Overrides the attempt cap.
	pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
		self.max_attempts = max_attempts;

		self
	}

	/// Overrides the backoff base delay.
	pub fn with_base_delay(mut self, delay: Duration) -> Self {
		self.base_delay = delay;

		self
	}

	/// Overrides the forced pause after a token rejection.
	pub fn with_invalid_token_pause(mut self, pause: Duration) -> Self {
		self.invalid_token_pause = pause;

		self
	}

	/// Overrides the pacing interval.
	pub fn with_pacing_interval(mut self, interval: Duration) -> Self {
		self.pacing_interval = interval;

		self
	}

	/// Rejects values the retry policy cannot work with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_attempts == 0 {
			return Err(invalid("retry.max_attempts", "must be at least 1"));
		}

		ensure_non_negative("retry.base_delay", self.base_delay)?;
		ensure_non_negative("retry.invalid_token_pause", self.invalid_token_pause)?;
		ensure_non_negative("retry.pacing_interval", self.pacing_interval)
	}
}
impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::seconds(3),
			invalid_token_pause: Duration::seconds(70),
			pacing_interval: Duration::milliseconds(300),
		}
	}
}

/// Chunking for batch enrichment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
	/// Items fetched concurrently per chunk.
	pub chunk_size: usize,
	/// Pause between chunks.
	#[serde(with = "duration_ms")]
	pub chunk_delay: Duration,
}
impl BatchConfig {
	/// Rejects a zero chunk size or a negative delay.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.chunk_size == 0 {
			return Err(invalid("batch.chunk_size", "must be at least 1"));
		}

		ensure_non_negative("batch.chunk_delay", self.chunk_delay)
	}
}
impl Default for BatchConfig {
	fn default() -> Self {
		Self { chunk_size: 10, chunk_delay: Duration::milliseconds(500) }
	}
}

/// Where the shared token state lives.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreBackend {
	/// Process memory; every cold start issues a fresh token.
	#[default]
	Memory,
	/// JSON file on local disk.
	File {
		/// Snapshot location.
		path: PathBuf,
	},
	/// Redis server; requires the `redis` feature.
	Redis {
		/// Connection URL.
		url: String,
	},
}

/// Top-level broker configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrokerConfig {
	/// App key/secret pair.
	pub credentials: Credentials,
	/// Gateway base URL.
	#[serde(default = "default_base_url")]
	pub base_url: Url,
	/// Shared store backend.
	#[serde(default)]
	pub store: StoreBackend,
	/// Token caching and coordination.
	#[serde(default)]
	pub token: TokenPolicy,
	/// Quotation call pacing and backoff.
	#[serde(default)]
	pub retry: RetryConfig,
	/// Batch enrichment chunking.
	#[serde(default)]
	pub batch: BatchConfig,
}
impl BrokerConfig {
	/// Creates a configuration with production defaults.
	pub fn new(credentials: Credentials) -> Self {
		Self {
			credentials,
			base_url: default_base_url(),
			store: StoreBackend::default(),
			token: TokenPolicy::default(),
			retry: RetryConfig::default(),
			batch: BatchConfig::default(),
		}
	}

	/// Reads configuration through `lookup`; blank values count as unset.
	///
	/// `REDIS_URL` takes precedence over `KIS_TOKEN_STORE_PATH`; with neither set the
	/// in-memory backend is used.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
		let mut config = Self::new(Credentials::from_lookup(&lookup)?);

		if let Some(raw) = lookup(BASE_URL_ENV) {
			config = config.with_base_url(&raw)?;
		}

		if let Some(url) = lookup(REDIS_URL_ENV) {
			config.store = StoreBackend::Redis { url };
		} else if let Some(path) = lookup(STORE_PATH_ENV) {
			config.store = StoreBackend::File { path: path.into() };
		}

		config.validate()?;

		Ok(config)
	}

	/// Reads configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Overrides the gateway base URL.
	pub fn with_base_url(mut self, raw: &str) -> Result<Self, ConfigError> {
		self.base_url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidBaseUrl { source })?;

		Ok(self)
	}

	/// Overrides the store backend.
	pub fn with_store(mut self, store: StoreBackend) -> Self {
		self.store = store;

		self
	}

	/// Overrides the token policy.
	pub fn with_token_policy(mut self, token: TokenPolicy) -> Self {
		self.token = token;

		self
	}

	/// Overrides the retry configuration.
	pub fn with_retry(mut self, retry: RetryConfig) -> Self {
		self.retry = retry;

		self
	}

	/// Overrides the batch configuration.
	pub fn with_batch(mut self, batch: BatchConfig) -> Self {
		self.batch = batch;

		self
	}

	/// Validates every section.
	pub fn validate(&self) -> Result<(), ConfigError> {
		self.token.validate()?;
		self.retry.validate()?;
		self.batch.validate()
	}

	/// Opens the configured store backend.
	pub async fn open_store(&self, clock: Arc<dyn Clock>) -> Result<Arc<dyn SharedStore>> {
		match &self.store {
			StoreBackend::Memory => Ok(Arc::new(MemoryStore::with_clock(clock))),
			StoreBackend::File { path } =>
				Ok(Arc::new(FileStore::open_with_clock(path.clone(), clock)?)),
			#[cfg(feature = "redis")]
			StoreBackend::Redis { url } => {
				let _ = clock;

				Ok(Arc::new(crate::store::RedisStore::connect(url).await?))
			},
			#[cfg(not(feature = "redis"))]
			StoreBackend::Redis { .. } => {
				let _ = clock;

				Err(invalid("store", "the `redis` feature is not enabled").into())
			},
		}
	}
}

fn default_base_url() -> Url {
	Url::parse(DEFAULT_BASE_URL).expect("Default base URL must be valid.")
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
	ConfigError::InvalidSetting { name, reason: reason.into() }
}

fn ensure_positive(name: &'static str, value: Duration) -> Result<(), ConfigError> {
	if value.is_positive() { Ok(()) } else { Err(invalid(name, "must be positive")) }
}

fn ensure_non_negative(name: &'static str, value: Duration) -> Result<(), ConfigError> {
	if value.is_negative() { Err(invalid(name, "must not be negative")) } else { Ok(()) }
}

mod duration_ms {
	// crates.io
	use serde::{Deserializer, Serializer};
	// self
	use crate::_prelude::*;

	pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let millis = i64::try_from(value.whole_milliseconds()).unwrap_or(i64::MAX);

		serializer.serialize_i64(millis)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		i64::deserialize(deserializer).map(Duration::milliseconds)
	}
}
