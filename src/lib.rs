//! Rate-limit aware access-token broker for the KIS Open API: one cached token per app key,
//! singleflight issuance behind a shared refresh lock, swappable stores, and paced quotation
//! calls with bounded retries.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod batch;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod issuance;
pub mod manager;
pub mod obs;
pub mod quote;
pub mod retry;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test`
	//! crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicUsize, Ordering},
	};
	// self
	use crate::{
		auth::Credentials,
		error::TransientError,
		issuance::{IssuanceClient, IssueFuture, IssuedToken},
	};

	/// Credential pair used across tests.
	pub fn test_credentials() -> Credentials {
		Credentials::new("PStestappkey0001", "test-app-secret")
			.expect("Test credentials should be valid.")
	}

	/// Issuer replaying a fixed script of outcomes and counting calls.
	///
	/// Each call yields to the scheduler first so concurrent callers overlap. Calls past the
	/// end of the script fail with a transient error.
	#[derive(Clone, Default)]
	pub struct FakeIssuer {
		script: Arc<Mutex<VecDeque<Result<IssuedToken>>>>,
		calls: Arc<AtomicUsize>,
	}
	impl FakeIssuer {
		/// Creates an issuer replaying `script` in order.
		pub fn new(script: impl IntoIterator<Item = Result<IssuedToken>>) -> Self {
			Self { script: Arc::new(Mutex::new(script.into_iter().collect())), calls: Default::default() }
		}

		/// Appends another outcome.
		pub fn push(&self, outcome: Result<IssuedToken>) {
			self.script.lock().push_back(outcome);
		}

		/// Number of `issue` calls so far.
		pub fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}
	}
	impl Debug for FakeIssuer {
		fn fmt(&self, f: &mut Formatter) -> FmtResult {
			f.debug_struct("FakeIssuer").field("calls", &self.calls()).finish()
		}
	}
	impl IssuanceClient for FakeIssuer {
		fn issue<'a>(&'a self, _credentials: &'a Credentials) -> IssueFuture<'a> {
			Box::pin(async move {
				self.calls.fetch_add(1, Ordering::SeqCst);

				for _ in 0..4 {
					tokio::task::yield_now().await;
				}

				self.script.lock().pop_front().unwrap_or_else(|| {
					Err(TransientError::TokenEndpoint {
						message: "Fake issuer script exhausted".into(),
						status: None,
						retry_after: None,
					}
					.into())
				})
			})
		}
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
