//! Pacing and bounded retries for quotation calls.
//!
//! Every attempt first passes through the shared [`Pacer`], which keeps consecutive upstream
//! calls at least `pacing_interval` apart across the whole process. Failures are then handled
//! by kind:
//!
//! - token rejected by upstream: invalidate the cached token, wait `invalid_token_pause`, retry;
//! - issuance rate-limited while fetching the token: leave the store alone (the manager's
//!   cooldown marker keeps every other caller away from the issuer), wait
//!   `invalid_token_pause`, retry;
//! - either forced wait happens once per call and does not count as an attempt;
//! - HTTP 429: wait `Retry-After`, or `base_delay * attempt` when absent;
//! - any other retryable failure: wait `base_delay * 2^(attempt - 1)`;
//! - non-retryable failures return immediately.

// self
use crate::{
	_prelude::*,
	clock::{self, Clock},
	config::RetryConfig,
	manager::TokenManager,
	obs::{self, OpKind, OpSpan, WaitReason, trace_event},
};

/// Leaky bucket of one: each caller waits until `interval` has passed since the previous call.
pub struct Pacer {
	interval: Duration,
	last: AsyncMutex<Option<OffsetDateTime>>,
	clock: Arc<dyn Clock>,
}
impl Pacer {
	/// Creates a pacer enforcing `interval` between calls.
	pub fn new(interval: Duration, clock: Arc<dyn Clock>) -> Self {
		Self { interval, last: AsyncMutex::new(None), clock }
	}

	/// Minimum spacing between calls.
	pub fn interval(&self) -> Duration {
		self.interval
	}

	/// Suspends until the caller may hit the upstream, then claims the slot.
	///
	/// The internal lock is held across the wait, so concurrent callers are admitted one at a
	/// time in arrival order.
	pub async fn wait(&self) {
		let mut last = self.last.lock().await;

		if let Some(previous) = *last {
			let elapsed = self.clock.now() - previous;

			if elapsed < self.interval {
				obs::pause(self.clock.as_ref(), WaitReason::Pacing, self.interval - elapsed).await;
			}
		}

		*last = Some(self.clock.now());
	}
}
impl Debug for Pacer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Pacer").field("interval", &self.interval).finish()
	}
}

/// Retry driver shared by every quotation call.
#[derive(Clone)]
pub struct RetryPolicy {
	config: RetryConfig,
	clock: Arc<dyn Clock>,
	pacer: Arc<Pacer>,
	tokens: Option<TokenManager>,
}
impl RetryPolicy {
	/// Creates a policy on the system clock with its own pacer.
	pub fn new(config: RetryConfig) -> Self {
		let clock = clock::system_clock();
		let pacer = Arc::new(Pacer::new(config.pacing_interval, clock.clone()));

		Self { config, clock, pacer, tokens: None }
	}

	/// Switches to `clock` and rebuilds the pacer on it.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.pacer = Arc::new(Pacer::new(self.config.pacing_interval, clock.clone()));
		self.clock = clock;

		self
	}

	/// Shares an existing pacer, e.g. one pacer for several clients.
	pub fn with_pacer(mut self, pacer: Arc<Pacer>) -> Self {
		self.pacer = pacer;

		self
	}

	/// Invalidates `manager`'s cache when upstream rejects a token.
	pub fn with_token_manager(mut self, manager: TokenManager) -> Self {
		self.tokens = Some(manager);

		self
	}

	/// Active configuration.
	pub fn config(&self) -> &RetryConfig {
		&self.config
	}

	/// Pacer applied before each attempt.
	pub fn pacer(&self) -> &Arc<Pacer> {
		&self.pacer
	}

	/// Runs `op` until it succeeds, fails permanently, or runs out of attempts.
	///
	/// The last error is returned on exhaustion.
	pub async fn run<T, F, Fut>(&self, op: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let span = OpSpan::new(OpKind::Quote, "retry");

		span.finish(span.instrument(self.run_inner(op)).await)
	}

	async fn run_inner<T, F, Fut>(&self, mut op: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let mut attempt = 0_u32;
		let mut forced_wait_used = false;

		loop {
			self.pacer.wait().await;

			let err = match op().await {
				Ok(value) => return Ok(value),
				Err(e) => e,
			};

			if err.is_token_rejection() {
				if forced_wait_used {
					return Err(err);
				}

				forced_wait_used = true;

				if matches!(err, Error::InvalidToken { .. }) {
					self.invalidate_token().await;
				}

				trace_event!(
					warn,
					error = %err,
					pause_secs = self.config.invalid_token_pause.whole_seconds(),
					"Upstream rejected the token; waiting out the issuance window."
				);

				obs::pause(self.clock.as_ref(), WaitReason::TokenPause, self.config.invalid_token_pause)
					.await;

				continue;
			}
			if !err.is_retryable() {
				return Err(err);
			}

			attempt += 1;

			if attempt >= self.config.max_attempts {
				trace_event!(warn, attempt, error = %err, "Retries exhausted.");

				return Err(err);
			}

			let delay = self.backoff(&err, attempt);

			trace_event!(debug, attempt, error = %err, "Retrying upstream call.");

			obs::pause(self.clock.as_ref(), WaitReason::Backoff, delay).await;
		}
	}

	async fn invalidate_token(&self) {
		let Some(tokens) = &self.tokens else {
			return;
		};

		if let Err(e) = tokens.invalidate().await {
			trace_event!(warn, error = %e, "Failed to invalidate cached token.");
		}
	}

	/// Wait before the retry following failed attempt number `attempt` (1-based).
	fn backoff(&self, err: &Error, attempt: u32) -> Duration {
		let base = self.config.base_delay;

		if err.status() == Some(429) {
			return err.retry_after().unwrap_or(base * attempt);
		}

		base * 2_u32.pow(attempt.saturating_sub(1).min(16))
	}
}
impl Debug for RetryPolicy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RetryPolicy")
			.field("config", &self.config)
			.field("pacer", &self.pacer.interval())
			.field("invalidates_tokens", &self.tokens.is_some())
			.finish()
	}
}
