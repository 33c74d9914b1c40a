//! Optional observability for token and quotation operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `kis_token_broker.op` with `op`, `stage`, and (once
//!   finished) `outcome` fields, plus events for cache misses, lock contention, cooldowns,
//!   retries, and every suspension point.
//! - Enable `metrics` to increment `kis_token_broker_op_total{op,outcome}` and to record
//!   `kis_token_broker_wait_seconds{reason}` for time spent suspended.
//!
//! Waits go through [`pause`], so pacing, backoff, lock contention, the forced token pause, and
//! chunk delays are all visible under one histogram.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

pub(crate) use tracing::trace_event;

// self
use crate::{_prelude::*, clock::Clock};

/// Operation kinds observed by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// `TokenManager::token`.
	Token,
	/// One issuance performed under the refresh lock.
	Issue,
	/// A paced, retried quotation call.
	Quote,
	/// Chunked batch enrichment.
	Batch,
}
impl OpKind {
	/// Label used in span and metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::Token => "token",
			OpKind::Issue => "issue",
			OpKind::Quote => "quote",
			OpKind::Batch => "batch",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded per operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Label used in span and metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}

	/// Maps a result onto its terminal outcome.
	pub fn of<T, E>(result: &std::result::Result<T, E>) -> Self {
		if result.is_ok() { OpOutcome::Success } else { OpOutcome::Failure }
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Why a caller was suspended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WaitReason {
	/// Spacing between consecutive upstream calls.
	Pacing,
	/// Backoff before retrying a failed quotation call.
	Backoff,
	/// Forced pause after the upstream rejected the token or its issuance.
	TokenPause,
	/// Refresh lock held by another refresher.
	LockContention,
	/// Delay between batch chunks.
	ChunkDelay,
}
impl WaitReason {
	/// Label used in event and metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			WaitReason::Pacing => "pacing",
			WaitReason::Backoff => "backoff",
			WaitReason::TokenPause => "token_pause",
			WaitReason::LockContention => "lock_contention",
			WaitReason::ChunkDelay => "chunk_delay",
		}
	}
}
impl Display for WaitReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Suspends on `clock` for `duration`, recording the wait under `reason`.
pub async fn pause(clock: &dyn Clock, reason: WaitReason, duration: Duration) {
	trace_event!(
		debug,
		reason = reason.as_str(),
		wait_ms = i64::try_from(duration.whole_milliseconds()).unwrap_or(i64::MAX),
		"Waiting."
	);
	record_wait(reason, duration);

	clock.sleep(duration).await;
}
