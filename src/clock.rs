//! Injectable time source shared by the token manager, retry policy, pacer, and stores.
//!
//! Every wall-clock read and every wait in the crate goes through [`Clock`], so tests can
//! swap in [`ManualClock`] and simulate minutes of backoff without real delays.

// self
use crate::_prelude::*;

/// Boxed future returned by [`Clock::sleep`].
pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + 'a + Send>>;

/// Source of "now" plus the matching suspension primitive.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current instant.
	fn now(&self) -> OffsetDateTime;

	/// Suspends the caller for `duration` without blocking other tasks.
	fn sleep(&self, duration: Duration) -> SleepFuture<'_>;
}

/// Returns the shared system clock.
pub fn system_clock() -> Arc<dyn Clock> {
	Arc::new(SystemClock)
}

/// Wall clock backed by `OffsetDateTime::now_utc` and tokio timers.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}

	fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
		// Negative durations convert to zero.
		let wait = std::time::Duration::try_from(duration).unwrap_or_default();

		Box::pin(tokio::time::sleep(wait))
	}
}

/// Deterministic clock whose `sleep` advances time instantly.
///
/// Every requested sleep is recorded so tests can assert on backoff schedules.
#[derive(Clone, Debug)]
pub struct ManualClock {
	now: Arc<Mutex<OffsetDateTime>>,
	sleeps: Arc<Mutex<Vec<Duration>>>,
}
impl ManualClock {
	/// Creates a clock frozen at `start`.
	pub fn new(start: OffsetDateTime) -> Self {
		Self { now: Arc::new(Mutex::new(start)), sleeps: Default::default() }
	}

	/// Moves the clock forward.
	pub fn advance(&self, duration: Duration) {
		let mut now = self.now.lock();

		*now += duration;
	}

	/// Jumps to an absolute instant.
	pub fn set(&self, instant: OffsetDateTime) {
		*self.now.lock() = instant;
	}

	/// Returns every duration passed to [`Clock::sleep`] so far, in call order.
	pub fn sleeps(&self) -> Vec<Duration> {
		self.sleeps.lock().clone()
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.now.lock()
	}

	fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
		self.sleeps.lock().push(duration);

		if duration.is_positive() {
			self.advance(duration);
		}

		Box::pin(tokio::task::yield_now())
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[tokio::test]
	async fn manual_clock_sleep_advances_and_records() {
		let clock = ManualClock::new(macros::datetime!(2025-06-01 09:00 UTC));

		clock.sleep(Duration::seconds(70)).await;
		clock.sleep(Duration::milliseconds(300)).await;

		assert_eq!(clock.now(), macros::datetime!(2025-06-01 09:01:10.3 UTC));
		assert_eq!(clock.sleeps(), vec![Duration::seconds(70), Duration::milliseconds(300)]);
	}

	#[tokio::test]
	async fn system_clock_ignores_negative_sleeps() {
		SystemClock.sleep(Duration::seconds(-5)).await;
	}
}
