//! Fixed watch list of large caps and its short-lived quote snapshot.

// crates.io
use serde_json::{Map, Value};
// self
use crate::{_prelude::*, config::BatchConfig};

/// Instruments in the watch list, in display order.
pub const FAVORITES: [(&str, &str); 8] = [
	("삼성전자", "005930"),
	("SK하이닉스", "000660"),
	("NAVER", "035420"),
	("카카오", "035720"),
	("현대차", "005380"),
	("LG에너지솔루션", "373220"),
	("삼성바이오로직스", "207940"),
	("기아", "000270"),
];

/// How long a snapshot is served before the watch list is fetched again.
pub const SNAPSHOT_TTL: Duration = Duration::minutes(5);

/// Chunking for watch-list lookups.
pub fn batch_config() -> BatchConfig {
	BatchConfig { chunk_size: 4, chunk_delay: Duration::milliseconds(100) }
}

/// Watch-list entry with its latest price fields.
///
/// `price` is `None` when the lookup failed; the other price fields are then absent too.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularQuote {
	/// Display name.
	pub name: String,
	/// Instrument code.
	pub code: String,
	/// Current price.
	pub price: Option<String>,
	/// Change from the previous close.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub change: Option<String>,
	/// Change rate in percent.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub change_rate: Option<String>,
	/// Sign code of the change.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub price_sign: Option<String>,
}
impl PopularQuote {
	/// Entry without price data.
	pub fn unpriced(name: &str, code: &str) -> Self {
		Self {
			name: name.into(),
			code: code.into(),
			price: None,
			change: None,
			change_rate: None,
			price_sign: None,
		}
	}

	/// Fills the price fields from the `output` object of a price lookup.
	pub fn with_price_output(mut self, output: &Map<String, Value>) -> Self {
		let field = |name: &str| output.get(name).and_then(Value::as_str).map(str::to_owned);

		self.price = field("stck_prpr");
		self.change = field("prdy_vrss");
		self.change_rate = field("prdy_ctrt");
		self.price_sign = field("prdy_vrss_sign");

		self
	}
}

/// Watch-list quotes as of `fetched_at`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularSnapshot {
	/// One entry per [`FAVORITES`] item, same order.
	pub quotes: Vec<PopularQuote>,
	/// When the lookups ran.
	#[serde(with = "time::serde::timestamp")]
	pub fetched_at: OffsetDateTime,
	/// `true` when served from the snapshot cache.
	pub cached: bool,
}
impl PopularSnapshot {
	/// Returns `true` while the snapshot may still be served at `now`.
	pub fn is_fresh_at(&self, now: OffsetDateTime) -> bool {
		now - self.fetched_at < SNAPSHOT_TTL
	}
}
