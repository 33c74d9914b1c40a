// self
use crate::{
	_prelude::*,
	obs::{OpKind, OpOutcome, WaitReason},
};

/// Increments `kis_token_broker_op_total{op,outcome}` when the `metrics` feature is enabled.
pub fn record_op_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"kis_token_broker_op_total",
			"op" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records a suspension in `kis_token_broker_wait_seconds{reason}`; negative waits count as zero.
pub fn record_wait(reason: WaitReason, duration: Duration) {
	#[cfg(feature = "metrics")]
	{
		metrics::histogram!("kis_token_broker_wait_seconds", "reason" => reason.as_str())
			.record(duration.as_seconds_f64().max(0.));
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (reason, duration);
	}
}
