//! Broker-level error types shared across the token manager, stores, and quotation calls.

// self
use crate::{_prelude::*, quote::InstrumentCodeError};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Caller supplied a malformed instrument code.
	#[error(transparent)]
	InvalidInstrumentCode(#[from] InstrumentCodeError),

	/// The issuer refused to mint a token because one was requested too recently.
	#[error("Token issuance is rate limited: {message}.")]
	IssuanceRateLimited {
		/// Upstream-supplied description.
		message: String,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// A recent rate-limit rejection is still suppressing issuance.
	#[error("Token issuance is cooling down; try again in {}.", seconds_label(.remaining))]
	CoolingDown {
		/// Time left until issuance may be attempted again.
		remaining: Duration,
	},
	/// Another holder kept the refresh lock for longer than the bounded wait.
	#[error("Token refresh timed out after {attempts} lock attempts.")]
	RefreshTimedOut {
		/// Number of lock acquisition attempts made.
		attempts: u32,
	},
	/// Upstream rejected the bearer token attached to a quotation call.
	#[error("Upstream rejected the access token ({code}): {message}.")]
	InvalidToken {
		/// Upstream message code.
		code: String,
		/// Upstream message.
		message: String,
	},
	/// Upstream rejected the app key/secret pair.
	#[error("Upstream rejected the app credentials ({code}): {reason}.")]
	InvalidCredentials {
		/// Upstream error code.
		code: String,
		/// Upstream-supplied reason.
		reason: String,
	},
	/// Upstream answered with a business-level failure code.
	#[error("Upstream returned {code}: {message}.")]
	Upstream {
		/// Upstream message code.
		code: String,
		/// Upstream message.
		message: String,
	},
}
impl Error {
	/// Returns `true` when a bounded retry may succeed.
	///
	/// Configuration problems, rejected credentials, malformed input, and an active cooldown
	/// fail fast; everything else is worth another attempt.
	pub fn is_retryable(&self) -> bool {
		!matches!(
			self,
			Self::Config(_)
				| Self::InvalidInstrumentCode(_)
				| Self::InvalidCredentials { .. }
				| Self::CoolingDown { .. }
		)
	}

	/// Returns `true` for failures that call for waiting out the issuer's per-minute window.
	///
	/// Only [`Error::InvalidToken`] also drops the cached token; a rate-limited issuance leaves
	/// the store, and its cooldown marker, untouched.
	pub fn is_token_rejection(&self) -> bool {
		matches!(self, Self::InvalidToken { .. } | Self::IssuanceRateLimited { .. })
	}

	/// HTTP status attached to the failure, when one was observed.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Transient(TransientError::TokenEndpoint { status, .. })
			| Self::Transient(TransientError::ResponseParse { status, .. }) => *status,
			Self::Transient(TransientError::HttpStatus { status, .. }) => Some(*status),
			_ => None,
		}
	}

	/// Retry-After hint attached to the failure, when upstream supplied one.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Transient(TransientError::TokenEndpoint { retry_after, .. })
			| Self::Transient(TransientError::HttpStatus { retry_after, .. })
			| Self::IssuanceRateLimited { retry_after, .. } => *retry_after,
			_ => None,
		}
	}

	/// Stable machine-readable label for the failure kind.
	pub fn code(&self) -> &'static str {
		match self {
			Self::Storage(_) => "storage",
			Self::Config(_) => "config",
			Self::Transient(_) => "upstream_unavailable",
			Self::Transport(_) => "transport",
			Self::InvalidInstrumentCode(_) => "invalid_instrument_code",
			Self::IssuanceRateLimited { .. } => "issuance_rate_limited",
			Self::CoolingDown { .. } => "cooling_down",
			Self::RefreshTimedOut { .. } => "refresh_timed_out",
			Self::InvalidToken { .. } => "invalid_token",
			Self::InvalidCredentials { .. } => "invalid_credentials",
			Self::Upstream { .. } => "upstream",
		}
	}

	/// Converts the failure into the shape request handlers return to clients.
	///
	/// Transport and storage details stay server-side.
	pub fn to_body(&self) -> ErrorBody {
		let message = match self {
			Self::Storage(_) => "Token storage is unavailable.".into(),
			Self::Transport(_) => "Upstream service is unreachable.".into(),
			other => other.to_string(),
		};

		ErrorBody { code: self.code().into(), message }
	}
}

// Rounds up so a sub-second remainder never reads as "0 seconds".
fn seconds_label(remaining: &Duration) -> String {
	let whole = remaining.whole_seconds();
	let secs = if *remaining > Duration::seconds(whole) { whole + 1 } else { whole }.max(1);

	if secs == 1 { "1 second".into() } else { format!("{secs} seconds") }
}

/// Externally observable failure payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
	/// Stable failure label (see [`Error::code`]).
	pub code: String,
	/// Human-readable description.
	pub message: String,
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A required credential is absent or blank.
	#[error("Required credential `{name}` is not configured.")]
	MissingCredential {
		/// Environment/config name of the credential.
		name: &'static str,
	},
	/// Upstream base URL cannot be parsed.
	#[error("Base URL is invalid.")]
	InvalidBaseUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A tuning value is out of range.
	#[error("Setting `{name}` is invalid: {reason}.")]
	InvalidSetting {
		/// Setting name.
		name: &'static str,
		/// Why the value was rejected.
		reason: String,
	},
	/// A credential or token cannot be encoded as an HTTP header value.
	#[error("Header `{name}` contains characters that are not allowed in HTTP headers.")]
	InvalidHeader {
		/// Header name.
		name: &'static str,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Token endpoint returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Upstream- or broker-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token issuance did not answer before its deadline.
	#[error("Token issuance did not complete within {} ms.", .after.whole_milliseconds())]
	IssueTimedOut {
		/// Deadline that elapsed.
		after: Duration,
	},
	/// Quotation endpoint answered with a non-success HTTP status.
	#[error("Upstream answered with HTTP {status}: {message}.")]
	HttpStatus {
		/// HTTP status code.
		status: u16,
		/// Truncated response body.
		message: String,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Upstream responded with JSON that could not be parsed.
	#[error("Upstream returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (DNS, TCP, TLS).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the upstream API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for Error {
	fn from(e: ReqwestError) -> Self {
		TransportError::from(e).into()
	}
}
