//! Wire-level helpers shared by the issuance and quotation clients.
//!
//! The KIS gateway reports failures in two shapes: the token endpoint answers with
//! `{"error_code", "error_description"}` while quotation endpoints answer with
//! `{"rt_cd", "msg_cd", "msg1"}`. [`UpstreamErrorBody`] reads either, and
//! [`classify_upstream_code`] maps the message codes the broker reacts to onto
//! [`Error`] variants.

// crates.io
#[cfg(feature = "reqwest")] use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
use time::{Date, PrimitiveDateTime, UtcOffset, macros};
// self
use crate::{_prelude::*, error::TransientError};

/// Upstream message codes the broker reacts to.
pub mod codes {
	/// Access token is invalid.
	pub const INVALID_TOKEN: &str = "EGW00121";
	/// Access token has expired.
	pub const EXPIRED_TOKEN: &str = "EGW00123";
	/// Token issuance requested again within the one-per-minute window.
	pub const ISSUANCE_RATE_LIMITED: &str = "EGW00133";
	/// App key/secret failures.
	pub const INVALID_CREDENTIALS: [&str; 3] = ["EGW00101", "EGW00102", "EGW00103"];
	/// Success value of the quotation `rt_cd` field.
	pub const RT_CD_OK: &str = "0";
}

const BODY_EXCERPT_LIMIT: usize = 256;

/// Korea Standard Time, the zone of every timestamp the gateway returns.
pub const KST: UtcOffset = macros::offset!(+9);

/// Failure payload in either of the gateway's two error shapes.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UpstreamErrorBody {
	/// Token endpoint error code.
	#[serde(default)]
	pub error_code: Option<String>,
	/// Token endpoint error description.
	#[serde(default)]
	pub error_description: Option<String>,
	/// Quotation result code (`"0"` means success).
	#[serde(default)]
	pub rt_cd: Option<String>,
	/// Quotation message code.
	#[serde(default)]
	pub msg_cd: Option<String>,
	/// Quotation message.
	#[serde(default)]
	pub msg1: Option<String>,
}
impl UpstreamErrorBody {
	/// Best-effort parse; unparseable bodies yield an empty value.
	pub fn from_slice(bytes: &[u8]) -> Self {
		serde_json::from_slice(bytes).unwrap_or_default()
	}

	/// Upstream code from whichever shape was present.
	pub fn code(&self) -> Option<&str> {
		self.error_code.as_deref().or(self.msg_cd.as_deref()).filter(|code| !code.is_empty())
	}

	/// Upstream message from whichever shape was present.
	pub fn message(&self) -> String {
		self.error_description
			.as_deref()
			.or(self.msg1.as_deref())
			.map(|msg| msg.trim().to_owned())
			.unwrap_or_default()
	}
}

/// Maps the message codes with dedicated handling onto broker errors.
///
/// Returns `None` for codes the caller should surface generically.
pub fn classify_upstream_code(
	code: &str,
	message: impl Into<String>,
	retry_after: Option<Duration>,
) -> Option<Error> {
	let message = message.into();

	match code {
		codes::INVALID_TOKEN | codes::EXPIRED_TOKEN =>
			Some(Error::InvalidToken { code: code.into(), message }),
		codes::ISSUANCE_RATE_LIMITED => Some(Error::IssuanceRateLimited { message, retry_after }),
		c if codes::INVALID_CREDENTIALS.contains(&c) =>
			Some(Error::InvalidCredentials { code: code.into(), reason: message }),
		_ => None,
	}
}

/// Deserializes a JSON body, keeping the failing path for diagnostics.
pub fn parse_json<T>(bytes: &[u8], status: Option<u16>) -> Result<T, TransientError>
where
	T: DeserializeOwned,
{
	let mut de = serde_json::Deserializer::from_slice(bytes);

	serde_path_to_error::deserialize(&mut de)
		.map_err(|source| TransientError::ResponseParse { source, status })
}

/// Parses the gateway's `YYYY-MM-DD HH:MM:SS` KST timestamps.
pub fn parse_kst_timestamp(raw: &str) -> Option<OffsetDateTime> {
	let format = macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

	PrimitiveDateTime::parse(raw.trim(), format).ok().map(|at| at.assume_offset(KST))
}

/// Formats the KST calendar date of `now` as `YYYYMMDD`.
pub fn kst_date_param(now: OffsetDateTime) -> String {
	let date: Date = now.to_offset(KST).date();

	format!("{:04}{:02}{:02}", date.year(), u8::from(date.month()), date.day())
}

/// Truncated, lossy UTF-8 view of a response body for error messages.
pub fn body_excerpt(bytes: &[u8]) -> String {
	let body = String::from_utf8_lossy(bytes);
	let body = body.trim();

	if body.chars().count() <= BODY_EXCERPT_LIMIT {
		return body.to_owned();
	}

	let mut buf: String = body.chars().take(BODY_EXCERPT_LIMIT).collect();

	buf.push('…');

	buf
}

#[cfg(feature = "reqwest")]
pub(crate) fn parse_retry_after(headers: &HeaderMap, now: OffsetDateTime) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX)));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - now;

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn token_and_credential_codes_get_dedicated_errors() {
		assert!(matches!(
			classify_upstream_code("EGW00123", "기간이 만료된 token 입니다.", None),
			Some(Error::InvalidToken { .. })
		));
		assert!(matches!(
			classify_upstream_code("EGW00121", "유효하지 않은 token 입니다.", None),
			Some(Error::InvalidToken { .. })
		));
		assert!(matches!(
			classify_upstream_code("EGW00133", "접근토큰 발급 잠시 후 다시 시도하세요(1분당 1회)", None),
			Some(Error::IssuanceRateLimited { .. })
		));
		assert!(matches!(
			classify_upstream_code("EGW00103", "유효하지 않은 AppKey입니다.", None),
			Some(Error::InvalidCredentials { .. })
		));
		assert!(classify_upstream_code("EGW00201", "초당 거래건수를 초과하였습니다.", None).is_none());
	}

	#[test]
	fn error_body_reads_both_shapes() {
		let token_shape = UpstreamErrorBody::from_slice(
			r#"{"error_code":"EGW00133","error_description":"1분당 1회"}"#.as_bytes(),
		);

		assert_eq!(token_shape.code(), Some("EGW00133"));
		assert_eq!(token_shape.message(), "1분당 1회");

		let quote_shape = UpstreamErrorBody::from_slice(
			r#"{"rt_cd":"1","msg_cd":"EGW00123","msg1":"기간이 만료된 token 입니다.  "}"#.as_bytes(),
		);

		assert_eq!(quote_shape.code(), Some("EGW00123"));
		assert_eq!(quote_shape.message(), "기간이 만료된 token 입니다.");
		assert_eq!(UpstreamErrorBody::from_slice(b"<html>").code(), None);
	}

	#[test]
	fn kst_timestamps_convert_to_utc() {
		let parsed =
			parse_kst_timestamp("2025-03-02 09:15:00").expect("KST timestamp should parse.");

		assert_eq!(parsed, macros::datetime!(2025-03-02 00:15 UTC));
		assert!(parse_kst_timestamp("2025/03/02").is_none());
	}

	#[test]
	fn date_param_uses_the_korean_calendar_day() {
		assert_eq!(kst_date_param(macros::datetime!(2025-03-01 16:00 UTC)), "20250302");
		assert_eq!(kst_date_param(macros::datetime!(2025-03-01 14:59 UTC)), "20250301");
	}

	#[test]
	fn parse_json_reports_the_failing_path() {
		#[derive(Debug, Deserialize)]
		struct Payload {
			#[allow(dead_code)]
			expires_in: i64,
		}

		let err = parse_json::<Payload>(br#"{"expires_in":"soon"}"#, Some(200))
			.expect_err("String lifetime should fail to parse.");

		match err {
			TransientError::ResponseParse { source, status } => {
				assert_eq!(source.path().to_string(), "expires_in");
				assert_eq!(status, Some(200));
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[test]
	fn body_excerpt_truncates_long_bodies() {
		let long = "가".repeat(400);
		let excerpt = body_excerpt(long.as_bytes());

		assert_eq!(excerpt.chars().count(), BODY_EXCERPT_LIMIT + 1);
		assert!(excerpt.ends_with('…'));
		assert_eq!(body_excerpt(b"  short  "), "short");
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn retry_after_accepts_seconds() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, "7".parse().expect("Header value should parse."));

		assert_eq!(
			parse_retry_after(&headers, OffsetDateTime::now_utc()),
			Some(Duration::seconds(7))
		);
		assert_eq!(parse_retry_after(&HeaderMap::new(), OffsetDateTime::now_utc()), None);
	}
}
