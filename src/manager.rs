//! Token lifecycle manager: cached fast path, singleflight refresh, cooldown, and invalidation.
//!
//! [`TokenManager::token`] answers from the shared store while the cached token is valid. On a
//! miss, in-process callers queue on one async guard and re-read the store after acquiring it,
//! so only the first of them reaches the refresh lock. The lock itself (`set_if_absent` with a
//! short TTL) serializes refreshers across processes that share a networked store. Whoever
//! holds it calls the issuer once, writes the token and its expiry as a single record, and
//! releases the lock on every exit path.
//!
//! A rate-limit rejection from the issuer writes a cooldown marker; until it expires every
//! caller fails fast with [`Error::CoolingDown`] instead of contacting the issuer again.

pub mod metrics;

mod lock;

pub use metrics::IssuanceMetrics;

// self
use crate::{
	_prelude::*,
	auth::{CachedToken, Credentials, TokenSecret},
	clock::{self, Clock},
	config::{BrokerConfig, TokenPolicy},
	error::{ConfigError, TransientError},
	issuance::{IssuanceClient, IssuedToken},
	obs::{self, OpKind, OpSpan, WaitReason, trace_event},
	store::{SharedStore, StoreKeys},
};
use lock::RefreshLock;

/// Process-wide token provider shared by every quotation call.
#[derive(Clone)]
pub struct TokenManager {
	store: Arc<dyn SharedStore>,
	issuer: Arc<dyn IssuanceClient>,
	credentials: Credentials,
	clock: Arc<dyn Clock>,
	policy: TokenPolicy,
	keys: StoreKeys,
	metrics: Arc<IssuanceMetrics>,
	singleflight: Arc<AsyncMutex<()>>,
}
impl TokenManager {
	/// Creates a manager with the system clock and the default [`TokenPolicy`].
	pub fn new(
		store: Arc<dyn SharedStore>,
		issuer: Arc<dyn IssuanceClient>,
		credentials: Credentials,
	) -> Self {
		let policy = TokenPolicy::default();

		Self {
			store,
			issuer,
			credentials,
			clock: clock::system_clock(),
			keys: policy.keys(),
			policy,
			metrics: Default::default(),
			singleflight: Default::default(),
		}
	}

	/// Creates a manager from a validated [`BrokerConfig`].
	pub fn from_config(
		config: &BrokerConfig,
		store: Arc<dyn SharedStore>,
		issuer: Arc<dyn IssuanceClient>,
	) -> Result<Self, ConfigError> {
		config.token.validate()?;

		Ok(Self::new(store, issuer, config.credentials.clone()).with_policy(config.token.clone()))
	}

	/// Overrides the clock used for expiry checks and waits.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Overrides the caching and coordination policy.
	pub fn with_policy(mut self, policy: TokenPolicy) -> Self {
		self.keys = policy.keys();
		self.policy = policy;

		self
	}

	/// Returns a currently valid bearer token, issuing one when the cache is empty or stale.
	pub async fn token(&self) -> Result<TokenSecret> {
		let span = OpSpan::new(OpKind::Token, "token");

		span.finish(span.instrument(self.token_inner()).await)
	}

	/// Returns the cached token when it is still valid, without ever issuing.
	pub async fn cached(&self) -> Result<Option<TokenSecret>> {
		let now = self.clock.now();

		Ok(self
			.cached_record()
			.await?
			.filter(|record| record.is_valid_at(now))
			.map(|record| record.access_token))
	}

	/// Returns the stored record, valid or not.
	///
	/// Records that fail to decode are treated as absent.
	pub async fn cached_record(&self) -> Result<Option<CachedToken>> {
		let Some(raw) = self.store.get(&self.keys.token).await? else {
			return Ok(None);
		};

		match CachedToken::decode(&raw) {
			Ok(record) => Ok(Some(record)),
			Err(e) => {
				trace_event!(warn, error = %e, "Ignoring undecodable cached token.");

				Ok(None)
			},
		}
	}

	/// Drops the cached token.
	///
	/// Called when the upstream rejects a token that the cache still considers valid. The refresh
	/// lock and cooldown marker are left to their TTLs: deleting them would let a second
	/// refresher start beside an in-flight issuance, or reach the issuer inside its rate-limit
	/// window.
	pub async fn invalidate(&self) -> Result<()> {
		trace_event!(info, "Invalidating cached access token.");

		self.store.delete(&self.keys.token).await?;

		Ok(())
	}

	/// Acquires a token ahead of traffic; returns `true` once one is cached.
	pub async fn warm_up(&self) -> Result<bool> {
		let token = self.token().await?;

		trace_event!(info, "Access token warmed up.");

		Ok(!token.expose().is_empty())
	}

	/// Issuance and cache counters.
	pub fn metrics(&self) -> &IssuanceMetrics {
		&self.metrics
	}

	/// Backing shared store.
	pub fn store(&self) -> &Arc<dyn SharedStore> {
		&self.store
	}

	/// Keys under which the token state lives.
	pub fn keys(&self) -> &StoreKeys {
		&self.keys
	}

	/// Active policy.
	pub fn policy(&self) -> &TokenPolicy {
		&self.policy
	}

	/// Clock used for expiry checks and waits.
	pub fn clock(&self) -> &Arc<dyn Clock> {
		&self.clock
	}

	/// Credentials sent to the issuer.
	pub fn credentials(&self) -> &Credentials {
		&self.credentials
	}

	async fn token_inner(&self) -> Result<TokenSecret> {
		if let Some(token) = self.cached().await? {
			self.metrics.record_cache_hit();

			return Ok(token);
		}

		let _singleflight = self.singleflight.lock().await;
		let mut attempts = 0;

		loop {
			// A caller queued behind the singleflight guard usually finds the fresh token here.
			if let Some(token) = self.cached().await? {
				self.metrics.record_cache_hit();

				return Ok(token);
			}

			self.ensure_not_cooling_down().await?;

			attempts += 1;

			match RefreshLock::try_acquire(&self.store, &self.keys.lock, self.policy.lock_ttl)
				.await?
			{
				Some(lock) => {
					let result = self.issue_and_store().await;

					if let Err(e) = lock.release().await {
						trace_event!(warn, error = %e, "Failed to release refresh lock; relying on its TTL.");
					}

					return result;
				},
				None => {
					self.metrics.record_lock_contention();

					if attempts >= self.policy.max_lock_attempts {
						trace_event!(warn, attempts, "Gave up waiting for the refresh lock.");

						return Err(Error::RefreshTimedOut { attempts });
					}

					trace_event!(debug, attempts, "Refresh lock held elsewhere; waiting.");

					obs::pause(
						self.clock.as_ref(),
						WaitReason::LockContention,
						self.policy.lock_retry_interval,
					)
					.await;
				},
			}
		}
	}

	async fn ensure_not_cooling_down(&self) -> Result<()> {
		let Some(raw) = self.store.get(&self.keys.cooldown).await? else {
			return Ok(());
		};
		let Some(until) = raw
			.parse::<i128>()
			.ok()
			.and_then(|nanos| OffsetDateTime::from_unix_timestamp_nanos(nanos).ok())
		else {
			return Ok(());
		};
		let now = self.clock.now();

		if now >= until {
			return Ok(());
		}

		self.metrics.record_cooldown_rejection();

		Err(Error::CoolingDown { remaining: until - now })
	}

	async fn issue_and_store(&self) -> Result<TokenSecret> {
		let span = OpSpan::new(OpKind::Issue, "issue_and_store");

		self.metrics.record_attempt();

		let result = span.instrument(self.issue_once()).await;

		match &result {
			Ok(_) => self.metrics.record_success(),
			Err(_) => self.metrics.record_failure(),
		}

		span.finish(result)
	}

	async fn issue_once(&self) -> Result<TokenSecret> {
		let issued_at = self.clock.now();

		match self.issue_within_deadline().await {
			Ok(issued) => {
				let ttl = self.policy.cache_ttl_for(issued.lifetime);
				let record = CachedToken::new(issued.access_token, issued_at, issued_at + ttl);

				self.store.set(&self.keys.token, record.encode()?, Some(ttl)).await?;

				trace_event!(
					info,
					app_key = %self.credentials.app_key_hint(),
					ttl_secs = ttl.whole_seconds(),
					"Issued a new access token."
				);

				Ok(record.access_token)
			},
			Err(e) => {
				if matches!(e, Error::IssuanceRateLimited { .. }) {
					self.start_cooldown().await;
				}

				trace_event!(warn, error = %e, "Token issuance failed.");

				Err(e)
			},
		}
	}

	// Bounded below the lock TTL, so a hung request cannot outlive the lock and overlap with the
	// next holder's issuance.
	async fn issue_within_deadline(&self) -> Result<IssuedToken> {
		let deadline = self.policy.issue_timeout;
		let wait = std::time::Duration::try_from(deadline).unwrap_or_default();

		match tokio::time::timeout(wait, self.issuer.issue(&self.credentials)).await {
			Ok(result) => result,
			Err(_) => Err(TransientError::IssueTimedOut { after: deadline }.into()),
		}
	}

	async fn start_cooldown(&self) {
		let window = self.policy.cooldown;

		if !window.is_positive() {
			return;
		}

		let until = self.clock.now() + window;
		let marker = until.unix_timestamp_nanos().to_string();

		if let Err(e) = self.store.set(&self.keys.cooldown, marker, Some(window)).await {
			trace_event!(warn, error = %e, "Failed to record issuance cooldown.");
		}
	}
}
impl Debug for TokenManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("credentials", &self.credentials)
			.field("policy", &self.policy)
			.field("keys", &self.keys)
			.finish()
	}
}
