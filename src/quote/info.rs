//! Normalized instrument master information.

// crates.io
use serde_json::{Map, Value};
// self
use crate::_prelude::*;

/// Listing market derived from the standard product number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketType {
	/// KOSPI main board.
	Kospi,
	/// KOSDAQ.
	Kosdaq,
}
impl MarketType {
	/// Standard product numbers starting with `0` are treated as KOSDAQ listings.
	pub fn from_std_pdno(std_pdno: Option<&str>) -> Self {
		match std_pdno {
			Some(pdno) if pdno.starts_with('0') => Self::Kosdaq,
			_ => Self::Kospi,
		}
	}
}

/// Instrument master record with blank fields replaced by fallbacks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockInfo {
	/// Requested instrument code.
	pub stock_code: String,
	/// Abbreviated name, or the code when upstream has none.
	pub stock_name: String,
	/// English name; empty when absent.
	pub stock_name_eng: String,
	/// Listing market.
	pub market_type: MarketType,
	/// Korean sector code; empty when absent.
	pub sector_code: String,
	/// Korean sector name; empty when absent.
	pub sector_name: String,
	/// Listed share count; `"0"` when absent.
	pub listed_shares: String,
	/// Paid-in capital; `"0"` when absent.
	pub capital: String,
	/// Reported price field; `"0"` when absent.
	pub face_value: String,
	/// Full Korean company name; empty when absent.
	pub company_name_kor: String,
	/// Full English company name; empty when absent.
	pub company_name_eng: String,
}
impl StockInfo {
	/// Builds the record from the `output` object of an instrument info response.
	pub fn from_output(code: &str, output: &Map<String, Value>) -> Self {
		let field = |name: &str| {
			output.get(name).and_then(Value::as_str).map(str::trim).filter(|v| !v.is_empty())
		};
		let or_empty = |name: &str| field(name).unwrap_or_default().to_owned();
		let or_zero = |name: &str| field(name).unwrap_or("0").to_owned();

		Self {
			stock_code: code.to_owned(),
			stock_name: field("prdt_abrv_name").unwrap_or(code).to_owned(),
			stock_name_eng: or_empty("prdt_eng_name"),
			market_type: MarketType::from_std_pdno(field("std_pdno")),
			sector_code: or_empty("한국_업종_코드"),
			sector_name: or_empty("한국_업종_명"),
			listed_shares: or_zero("lstg_stqt"),
			capital: or_zero("cpfn"),
			face_value: or_zero("stck_prpr"),
			company_name_kor: or_empty("prdt_name"),
			company_name_eng: or_empty("prdt_eng_name"),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn blank_fields_fall_back() {
		let output: Map<String, Value> = serde_json::from_str(
			r#"{"prdt_abrv_name":"  ","std_pdno":"KR7005930003","lstg_stqt":"","prdt_name":"삼성전자보통주"}"#,
		)
		.expect("Output fixture should deserialize.");
		let info = StockInfo::from_output("005930", &output);

		assert_eq!(info.stock_name, "005930");
		assert_eq!(info.market_type, MarketType::Kospi);
		assert_eq!(info.listed_shares, "0");
		assert_eq!(info.capital, "0");
		assert_eq!(info.sector_code, "");
		assert_eq!(info.company_name_kor, "삼성전자보통주");
	}

	#[test]
	fn leading_zero_product_number_is_kosdaq() {
		assert_eq!(MarketType::from_std_pdno(Some("0A1234")), MarketType::Kosdaq);
		assert_eq!(MarketType::from_std_pdno(Some("KR7035720002")), MarketType::Kospi);
		assert_eq!(MarketType::from_std_pdno(None), MarketType::Kospi);
	}

	#[test]
	fn serializes_with_camel_case_names() {
		let info = StockInfo::from_output("035720", &Map::new());
		let json = serde_json::to_value(&info).expect("Stock info should serialize.");

		assert_eq!(json["stockName"], "035720");
		assert_eq!(json["marketType"], "KOSPI");
		assert_eq!(json["faceValue"], "0");
	}
}
