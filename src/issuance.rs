//! Issuance client contract plus the reqwest-backed `/oauth2/tokenP` implementation.
//!
//! The token manager never talks HTTP itself; it calls [`IssuanceClient::issue`] while holding
//! the refresh lock. Implementations classify failures so the manager can tell a rate-limit
//! rejection (which starts the cooldown) from everything else.

// self
use crate::{_prelude::*, auth::Credentials, auth::TokenSecret};
#[cfg(feature = "reqwest")]
use crate::{
	clock::{self, Clock},
	error::{ConfigError, TransientError},
	http::{self, UpstreamErrorBody},
};

/// Boxed future returned by [`IssuanceClient::issue`].
pub type IssueFuture<'a> = Pin<Box<dyn Future<Output = Result<IssuedToken>> + 'a + Send>>;

/// Exchanges credentials for a bearer token.
///
/// Implementations must report rate-limit rejections as [`Error::IssuanceRateLimited`] and
/// rejected credentials as [`Error::InvalidCredentials`].
pub trait IssuanceClient
where
	Self: Send + Sync,
{
	/// Performs one issuance request.
	fn issue<'a>(&'a self, credentials: &'a Credentials) -> IssueFuture<'a>;
}

/// Token returned by the issuer, before the broker applies its caching policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedToken {
	/// Bearer token.
	pub access_token: TokenSecret,
	/// Upstream-declared lifetime, when the issuer sent one.
	pub lifetime: Option<Duration>,
}
impl IssuedToken {
	/// Creates a token without a declared lifetime.
	pub fn new(access_token: impl Into<String>) -> Self {
		Self { access_token: TokenSecret::new(access_token), lifetime: None }
	}

	/// Attaches the upstream-declared lifetime.
	pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
		self.lifetime = Some(lifetime);

		self
	}
}

#[cfg(feature = "reqwest")]
#[derive(Serialize)]
struct TokenRequest<'a> {
	grant_type: &'static str,
	appkey: &'a str,
	appsecret: &'a str,
}

#[cfg(feature = "reqwest")]
#[derive(Debug, Deserialize)]
struct TokenResponse {
	#[serde(default)]
	access_token: String,
	#[serde(default)]
	#[allow(dead_code)]
	token_type: Option<String>,
	#[serde(default)]
	expires_in: Option<i64>,
	#[serde(default)]
	access_token_token_expired: Option<String>,
}

/// Issuer speaking to the gateway's `POST /oauth2/tokenP` endpoint.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct KisIssuanceClient {
	http: ReqwestClient,
	endpoint: Url,
	clock: Arc<dyn Clock>,
}
#[cfg(feature = "reqwest")]
impl KisIssuanceClient {
	const PATH: &'static str = "oauth2/tokenP";

	/// Builds an issuer for `base_url` with a default reqwest client.
	pub fn new(base_url: &Url) -> Result<Self, ConfigError> {
		let http = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map_err(ConfigError::http_client_build)?;

		Self::with_client(http, base_url)
	}

	/// Builds an issuer around an existing reqwest client.
	///
	/// Token requests should not follow redirects; configure custom clients accordingly.
	pub fn with_client(http: ReqwestClient, base_url: &Url) -> Result<Self, ConfigError> {
		let endpoint = join_path(base_url, Self::PATH)?;

		Ok(Self { http, endpoint, clock: clock::system_clock() })
	}

	/// Uses `clock` for Retry-After and absolute expiry calculations.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Fully-qualified token endpoint.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	async fn request(&self, credentials: &Credentials) -> Result<IssuedToken> {
		let body = TokenRequest {
			grant_type: "client_credentials",
			appkey: credentials.app_key(),
			appsecret: credentials.app_secret(),
		};
		let response = self.http.post(self.endpoint.clone()).json(&body).send().await?;
		let status = response.status();
		let retry_after = http::parse_retry_after(response.headers(), self.clock.now());
		let bytes = response.bytes().await?;

		if !status.is_success() {
			return Err(classify_failure(status.as_u16(), &bytes, retry_after));
		}

		let parsed: TokenResponse = http::parse_json(&bytes, Some(status.as_u16()))?;

		if parsed.access_token.trim().is_empty() {
			// Some gateway errors arrive with a 200 status and only an error body.
			let upstream = UpstreamErrorBody::from_slice(&bytes);

			if upstream.code().is_some() {
				return Err(classify_failure(status.as_u16(), &bytes, retry_after));
			}

			return Err(TransientError::TokenEndpoint {
				message: "Response did not include an access token".into(),
				status: Some(status.as_u16()),
				retry_after,
			}
			.into());
		}

		let now = self.clock.now();
		let lifetime = parsed
			.expires_in
			.filter(|secs| *secs > 0)
			.map(Duration::seconds)
			.or_else(|| {
				parsed
					.access_token_token_expired
					.as_deref()
					.and_then(http::parse_kst_timestamp)
					.map(|at| at - now)
					.filter(|left| left.is_positive())
			});

		Ok(IssuedToken { access_token: TokenSecret::new(parsed.access_token), lifetime })
	}
}
#[cfg(feature = "reqwest")]
impl Debug for KisIssuanceClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("KisIssuanceClient").field("endpoint", &self.endpoint.as_str()).finish()
	}
}
#[cfg(feature = "reqwest")]
impl IssuanceClient for KisIssuanceClient {
	fn issue<'a>(&'a self, credentials: &'a Credentials) -> IssueFuture<'a> {
		Box::pin(self.request(credentials))
	}
}

#[cfg(feature = "reqwest")]
fn classify_failure(status: u16, bytes: &[u8], retry_after: Option<Duration>) -> Error {
	let upstream = UpstreamErrorBody::from_slice(bytes);

	if let Some(err) = upstream
		.code()
		.and_then(|code| http::classify_upstream_code(code, upstream.message(), retry_after))
	{
		return err;
	}
	if status == 429 {
		return Error::IssuanceRateLimited { message: http::body_excerpt(bytes), retry_after };
	}

	let message = match upstream.code() {
		Some(code) => format!("{code}: {}", upstream.message()),
		None => http::body_excerpt(bytes),
	};

	TransientError::TokenEndpoint { message, status: Some(status), retry_after }.into()
}

#[cfg(feature = "reqwest")]
pub(crate) fn join_path(base_url: &Url, path: &str) -> Result<Url, ConfigError> {
	let mut base = base_url.clone();

	if !base.path().ends_with('/') {
		let with_slash = format!("{}/", base.path());

		base.set_path(&with_slash);
	}

	base.join(path).map_err(|source| ConfigError::InvalidBaseUrl { source })
}
