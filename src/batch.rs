//! Chunked enrichment with bounded concurrency.

// crates.io
use futures::future;
// self
use crate::{
	_prelude::*,
	clock::Clock,
	config::BatchConfig,
	obs::{self, OpKind, OpOutcome, OpSpan, WaitReason, trace_event},
};

/// Enriches `items` in chunks of `config.chunk_size`, running each chunk concurrently.
///
/// Chunks run back to back with `config.chunk_delay` between them (none after the last), so at
/// most `chunk_size` calls are in flight. An item whose enrichment fails is returned unchanged.
/// Output order matches input order and the batch never aborts.
pub async fn fetch_chunked<T, F, Fut>(
	items: Vec<T>,
	config: &BatchConfig,
	clock: &dyn Clock,
	mut enrich: F,
) -> Vec<T>
where
	T: Clone,
	F: FnMut(T) -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let span = OpSpan::new(OpKind::Batch, "fetch_chunked");
	let chunk_size = config.chunk_size.max(1);
	let total = items.len();
	let output = span
		.instrument(async move {
			let mut output = Vec::with_capacity(total);
			let mut chunks = items.chunks(chunk_size).peekable();

			while let Some(chunk) = chunks.next() {
				let results = future::join_all(chunk.iter().cloned().map(&mut enrich)).await;

				for (original, result) in chunk.iter().zip(results) {
					match result {
						Ok(enriched) => output.push(enriched),
						Err(e) => {
							trace_event!(warn, error = %e, "Enrichment failed; keeping the original item.");

							output.push(original.clone());
						},
					}
				}

				if chunks.peek().is_some() {
					obs::pause(clock, WaitReason::ChunkDelay, config.chunk_delay).await;
				}
			}

			output
		})
		.await;

	span.record(OpOutcome::Success);

	output
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{clock::ManualClock, error::TransientError};

	#[tokio::test]
	async fn empty_input_makes_no_calls_and_no_waits() {
		let clock = ManualClock::new(macros::datetime!(2025-08-01 00:00 UTC));
		let out = fetch_chunked(Vec::<u32>::new(), &BatchConfig::default(), &clock, |n| async move {
			Ok(n + 1)
		})
		.await;

		assert!(out.is_empty());
		assert!(clock.sleeps().is_empty());
	}

	#[tokio::test]
	async fn failing_items_fall_back_and_concurrency_stays_bounded() {
		let clock = ManualClock::new(macros::datetime!(2025-08-01 00:00 UTC));
		let config = BatchConfig { chunk_size: 3, chunk_delay: Duration::milliseconds(500) };
		let in_flight = &AtomicUsize::new(0);
		let peak = &AtomicUsize::new(0);
		let out = fetch_chunked((0..7_u32).collect(), &config, &clock, move |n| async move {
			let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;

			peak.fetch_max(now, Ordering::SeqCst);
			tokio::task::yield_now().await;
			in_flight.fetch_sub(1, Ordering::SeqCst);

			if n == 4 {
				Err(TransientError::HttpStatus {
					status: 500,
					message: "boom".into(),
					retry_after: None,
				}
				.into())
			} else {
				Ok(n * 10)
			}
		})
		.await;

		assert_eq!(out, vec![0, 10, 20, 30, 4, 50, 60]);
		assert_eq!(peak.load(Ordering::SeqCst), 3);
		assert_eq!(clock.sleeps(), vec![Duration::milliseconds(500); 2]);
	}
}
