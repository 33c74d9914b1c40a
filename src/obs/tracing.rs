// self
use crate::{
	_prelude::*,
	obs::{self, OpKind, OpOutcome},
};

/// Instrumented future when tracing is enabled, the bare future otherwise.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// Emits a `tracing` event when the feature is enabled.
///
/// Without the feature the field values are still borrowed, so bindings that only feed an event
/// stay used. Accepted fields: `name`, `name = value`, and `name = %value`, followed by the
/// message literal.
macro_rules! trace_event {
	($level:ident, $($arg:tt)+) => {
		#[cfg(feature = "tracing")]
		{
			::tracing::$level!($($arg)+);
		}
		#[cfg(not(feature = "tracing"))]
		{
			$crate::obs::trace_event!(@consume $($arg)+);
		}
	};
	(@consume $message:literal $(,)?) => {};
	(@consume $name:ident = % $value:expr, $($rest:tt)+) => {
		let _ = &$value;

		$crate::obs::trace_event!(@consume $($rest)+);
	};
	(@consume $name:ident = $value:expr, $($rest:tt)+) => {
		let _ = &$value;

		$crate::obs::trace_event!(@consume $($rest)+);
	};
	(@consume $name:ident, $($rest:tt)+) => {
		let _ = &$name;

		$crate::obs::trace_event!(@consume $($rest)+);
	};
}
pub(crate) use trace_event;

/// Span around one broker operation.
///
/// Creating the span counts an [`OpOutcome::Attempt`]; [`OpSpan::finish`] records the terminal
/// outcome on both the span and the op counter.
#[derive(Clone, Debug)]
pub struct OpSpan {
	kind: OpKind,
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// Opens a span for `kind` at `stage` and counts the attempt.
	pub fn new(kind: OpKind, stage: &'static str) -> Self {
		obs::record_op_outcome(kind, OpOutcome::Attempt);

		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"kis_token_broker.op",
				op = kind.as_str(),
				stage,
				outcome = tracing::field::Empty
			);

			Self { kind, span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = stage;

			Self { kind }
		}
	}

	/// Operation kind this span covers.
	pub fn kind(&self) -> OpKind {
		self.kind
	}

	/// Instruments a future without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}

	/// Records a terminal outcome on the span and the op counter.
	pub fn record(&self, outcome: OpOutcome) {
		#[cfg(feature = "tracing")]
		self.span.record("outcome", outcome.as_str());

		obs::record_op_outcome(self.kind, outcome);
	}

	/// Records the outcome of `result` and returns it unchanged.
	pub fn finish<T, E>(&self, result: std::result::Result<T, E>) -> std::result::Result<T, E> {
		self.record(OpOutcome::of(&result));

		result
	}
}
