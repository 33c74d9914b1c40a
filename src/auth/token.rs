//! Redacted token secrets and the cached-token record kept in the shared store.

// self
use crate::{_prelude::*, store::StoreError};

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Formats the `Authorization` header value for this token.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.0)
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Bearer token plus the expiry the broker chose for it.
///
/// Serialized as one record so token and expiry are always written together.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Instant the issuance request was made.
	pub issued_at: OffsetDateTime,
	/// Instant after which the broker stops handing out this token.
	pub expires_at: OffsetDateTime,
}
impl CachedToken {
	/// Creates a record valid until `expires_at`.
	pub fn new(
		access_token: TokenSecret,
		issued_at: OffsetDateTime,
		expires_at: OffsetDateTime,
	) -> Self {
		Self { access_token, issued_at, expires_at }
	}

	/// Returns `true` while `instant` is strictly before the expiry.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		instant < self.expires_at
	}

	/// Time left before expiry, clamped at zero.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - instant;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}

	/// Encodes the record for a [`SharedStore`](crate::store::SharedStore) value.
	pub fn encode(&self) -> Result<String, StoreError> {
		serde_json::to_string(self).map_err(|e| StoreError::Serialization {
			message: format!("Failed to encode cached token: {e}"),
		})
	}

	/// Decodes a record previously produced by [`CachedToken::encode`].
	pub fn decode(raw: &str) -> Result<Self, StoreError> {
		serde_json::from_str(raw).map_err(|e| StoreError::Serialization {
			message: format!("Failed to decode cached token: {e}"),
		})
	}
}
impl Debug for CachedToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CachedToken")
			.field("access_token", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
