//! Issuance and cache counters kept by every [`TokenManager`](crate::manager::TokenManager).

// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for token lookups and issuance.
#[derive(Debug, Default)]
pub struct IssuanceMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	cache_hits: AtomicU64,
	cooldown_rejections: AtomicU64,
	lock_contentions: AtomicU64,
}
impl IssuanceMetrics {
	/// Returns the number of calls made to the issuance client.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of issuance calls that produced a token.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of failed issuance calls.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of lookups answered from the shared store.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	/// Returns the number of lookups rejected by an active cooldown.
	pub fn cooldown_rejections(&self) -> u64 {
		self.cooldown_rejections.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh lock attempts that found the lock held.
	pub fn lock_contentions(&self) -> u64 {
		self.lock_contentions.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cooldown_rejection(&self) {
		self.cooldown_rejections.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_lock_contention(&self) {
		self.lock_contentions.fetch_add(1, Ordering::Relaxed);
	}
}
