//! Volume-ranking rows and the listed-stock filter applied before enrichment.

// crates.io
use serde_json::{Map, Value};
// self
use crate::{_prelude::*, quote::InstrumentCode};

/// Rows kept after filtering.
pub const TOP_N: usize = 10;

/// Name fragments marking funds, notes, indices, REITs, SPACs, and futures products.
pub const EXCLUDED_NAME_MARKERS: [&str; 16] = [
	"KODEX", "TIGER", "ACE", "ARIRANG", "KBSTAR", "HANARO", "SOL", "ETF", "ETN", "KOSPI", "KOSDAQ",
	"KRX", "리츠", "스팩", "SPAC", "선물",
];

/// One row of the volume ranking.
///
/// Fields the broker does not interpret are kept in [`RankedInstrument::extra`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RankedInstrument {
	/// Short instrument code.
	#[serde(rename = "mksc_shrn_iscd", default)]
	pub code: String,
	/// Display name.
	#[serde(rename = "hts_kor_isnm", default)]
	pub name: String,
	/// Rank as reported upstream.
	#[serde(default)]
	pub data_rank: String,
	/// Current price.
	#[serde(rename = "stck_prpr", default)]
	pub price: String,
	/// Change from the previous close.
	#[serde(rename = "prdy_vrss", default)]
	pub change: String,
	/// Sign code of the change.
	#[serde(rename = "prdy_vrss_sign", default)]
	pub change_sign: String,
	/// Change rate in percent.
	#[serde(rename = "prdy_ctrt", default)]
	pub change_rate: String,
	/// Accumulated volume.
	#[serde(rename = "acml_vol", default)]
	pub volume: String,
	/// Remaining upstream fields.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
impl RankedInstrument {
	/// Returns `true` for ordinary listed stocks with a valid code and a name.
	pub fn is_listed_stock(&self) -> bool {
		!self.name.is_empty()
			&& InstrumentCode::is_valid(&self.code)
			&& !EXCLUDED_NAME_MARKERS.iter().any(|marker| self.name.contains(marker))
	}

	/// Replaces the display name with `prdt_name` from a price lookup, when present.
	pub fn with_price_name(mut self, price_output: &Map<String, Value>) -> Self {
		let name = price_output
			.get("prdt_name")
			.and_then(Value::as_str)
			.map(str::trim)
			.filter(|name| !name.is_empty());

		if let Some(name) = name {
			self.name = name.to_owned();
		} else if self.name.is_empty() {
			self.name = self.code.clone();
		}

		self
	}
}

/// Keeps the first [`TOP_N`] listed stocks, preserving upstream order.
pub fn select_listed(rows: Vec<RankedInstrument>) -> Vec<RankedInstrument> {
	rows.into_iter().filter(RankedInstrument::is_listed_stock).take(TOP_N).collect()
}
