//! App key/secret pair issued by the brokerage.

// self
use crate::{_prelude::*, auth::TokenSecret, error::ConfigError};

/// Environment variable holding the app key.
pub const APP_KEY_ENV: &str = "KIS_APP_KEY";
/// Environment variable holding the app secret.
pub const APP_SECRET_ENV: &str = "KIS_APP_SECRET";

/// Immutable credential pair exchanged for bearer tokens and echoed on every quotation call.
///
/// Both halves are validated as non-blank at construction, so holding a `Credentials`
/// value proves the configuration is complete. Serializing writes the secret as
/// [`Credentials::REDACTED`]; persist the real secret through the environment instead.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawCredentials")]
pub struct Credentials {
	app_key: String,
	app_secret: TokenSecret,
}
impl Credentials {
	/// Placeholder written in place of the app secret.
	pub const REDACTED: &'static str = "<redacted>";

	/// Validates and wraps an app key/secret pair.
	pub fn new(
		app_key: impl Into<String>,
		app_secret: impl Into<String>,
	) -> Result<Self, ConfigError> {
		let app_key = app_key.into().trim().to_owned();
		let app_secret = app_secret.into().trim().to_owned();

		if app_key.is_empty() {
			return Err(ConfigError::MissingCredential { name: APP_KEY_ENV });
		}
		if app_secret.is_empty() {
			return Err(ConfigError::MissingCredential { name: APP_SECRET_ENV });
		}

		Ok(Self { app_key, app_secret: TokenSecret::new(app_secret) })
	}

	/// Reads the pair through `lookup`, treating absent and blank values alike.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let app_key = lookup(APP_KEY_ENV)
			.ok_or(ConfigError::MissingCredential { name: APP_KEY_ENV })?;
		let app_secret = lookup(APP_SECRET_ENV)
			.ok_or(ConfigError::MissingCredential { name: APP_SECRET_ENV })?;

		Self::new(app_key, app_secret)
	}

	/// Reads `KIS_APP_KEY` and `KIS_APP_SECRET` from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Returns the app key.
	pub fn app_key(&self) -> &str {
		&self.app_key
	}

	/// Returns the app secret. Callers must avoid logging this string.
	pub fn app_secret(&self) -> &str {
		self.app_secret.expose()
	}

	/// Short key prefix that is safe to log.
	pub fn app_key_hint(&self) -> String {
		self.app_key.chars().take(8).collect()
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("app_key", &format_args!("{}...", self.app_key_hint()))
			.field("app_secret", &Self::REDACTED)
			.finish()
	}
}
impl Serialize for Credentials {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		RawCredentials { app_key: self.app_key.clone(), app_secret: Self::REDACTED.into() }
			.serialize(serializer)
	}
}

#[derive(Serialize, Deserialize)]
struct RawCredentials {
	app_key: String,
	app_secret: String,
}
impl TryFrom<RawCredentials> for Credentials {
	type Error = ConfigError;

	fn try_from(raw: RawCredentials) -> Result<Self, Self::Error> {
		Self::new(raw.app_key, raw.app_secret)
	}
}
