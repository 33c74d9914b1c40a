//! Quotation calls: price, order book, daily series, instrument info, volume ranking, and the
//! watch-list snapshot.
//!
//! Every call goes through the same path: fetch a token from the [`TokenManager`], attach the
//! four KIS headers, pace and retry through the [`RetryPolicy`], and unwrap the `rt_cd` envelope.
//! The payloads themselves are returned as loosely typed JSON, except for the volume ranking and
//! the watch list (filtered and enriched here) and [`StockInfo`] (normalized with fallbacks).

pub mod code;
pub mod info;
pub mod popular;
pub mod rank;

pub use code::*;
pub use info::*;
pub use popular::{PopularQuote, PopularSnapshot};
pub use rank::*;

// crates.io
use serde_json::{Map, Value};
// self
use crate::{_prelude::*, http};
#[cfg(feature = "reqwest")]
use crate::{
	batch,
	config::{BatchConfig, BrokerConfig, RetryConfig},
	error::{ConfigError, TransientError},
	http::UpstreamErrorBody,
	issuance,
	manager::TokenManager,
	obs::trace_event,
	retry::RetryPolicy,
};
#[cfg(feature = "reqwest")]
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Transaction identifiers sent in the `tr_id` header.
pub mod tr_id {
	/// Current price.
	pub const PRICE: &str = "FHKST01010100";
	/// Order book with expected execution.
	pub const ORDER_BOOK: &str = "FHKST01010200";
	/// Daily price series.
	pub const DAILY_PRICES: &str = "FHKST01010400";
	/// Instrument master information.
	pub const INSTRUMENT_INFO: &str = "CTPF1604R";
	/// Volume ranking.
	pub const VOLUME_RANK: &str = "FHPST01710000";
}

const PRICE_PATH: &str = "uapi/domestic-stock/v1/quotations/inquire-price";
const ORDER_BOOK_PATH: &str = "uapi/domestic-stock/v1/quotations/inquire-asking-price-exp-ccn";
const DAILY_PRICES_PATH: &str = "uapi/domestic-stock/v1/quotations/inquire-daily-price";
const INSTRUMENT_INFO_PATH: &str = "uapi/domestic-stock/v1/quotations/search-info";
const VOLUME_RANK_PATH: &str = "uapi/domestic-stock/v1/quotations/volume-rank";

/// Standard quotation response: result code, message, and the endpoint-specific body.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteEnvelope {
	/// Result code; `"0"` means success.
	#[serde(default)]
	pub rt_cd: String,
	/// Message code.
	#[serde(default)]
	pub msg_cd: String,
	/// Message text.
	#[serde(default)]
	pub msg1: String,
	/// Endpoint-specific fields (`output`, `output1`, `output2`, ...).
	#[serde(flatten)]
	pub body: Map<String, Value>,
}
impl QuoteEnvelope {
	/// Returns `true` when upstream reported success.
	pub fn is_success(&self) -> bool {
		self.rt_cd == http::codes::RT_CD_OK
	}

	/// The `output` field, if present.
	pub fn output(&self) -> Option<&Value> {
		self.body.get("output")
	}

	/// The `output` field when it is a JSON object.
	pub fn output_object(&self) -> Option<&Map<String, Value>> {
		self.output().and_then(Value::as_object)
	}

	/// Converts a non-success envelope into the matching [`Error`].
	pub fn into_result(self) -> Result<Self> {
		if self.is_success() {
			return Ok(self);
		}

		let message = self.msg1.trim().to_owned();

		Err(http::classify_upstream_code(&self.msg_cd, message.clone(), None)
			.unwrap_or(Error::Upstream { code: self.msg_cd, message }))
	}
}

/// Reqwest-backed quotation client.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct QuoteClient {
	http: ReqwestClient,
	base_url: Url,
	tokens: TokenManager,
	retry: RetryPolicy,
	batch: BatchConfig,
	popular: Arc<Mutex<Option<PopularSnapshot>>>,
}
#[cfg(feature = "reqwest")]
impl QuoteClient {
	/// Builds a client with a default reqwest client and a retry policy tied to `tokens`.
	pub fn new(base_url: &Url, tokens: TokenManager, retry: RetryConfig) -> Result<Self, ConfigError> {
		let http = ReqwestClient::builder().build().map_err(ConfigError::http_client_build)?;
		let retry = RetryPolicy::new(retry)
			.with_clock(tokens.clock().clone())
			.with_token_manager(tokens.clone());

		Ok(Self::with_client(http, base_url, tokens, retry))
	}

	/// Builds a client from a [`BrokerConfig`].
	pub fn from_config(config: &BrokerConfig, tokens: TokenManager) -> Result<Self, ConfigError> {
		config.retry.validate()?;
		config.batch.validate()?;

		Ok(Self::new(&config.base_url, tokens, config.retry.clone())?.with_batch(config.batch.clone()))
	}

	/// Assembles a client from parts.
	pub fn with_client(
		http: ReqwestClient,
		base_url: &Url,
		tokens: TokenManager,
		retry: RetryPolicy,
	) -> Self {
		Self {
			http,
			base_url: base_url.clone(),
			tokens,
			retry,
			batch: BatchConfig::default(),
			popular: Default::default(),
		}
	}

	/// Overrides the chunking used by [`QuoteClient::volume_rank`] enrichment.
	pub fn with_batch(mut self, batch: BatchConfig) -> Self {
		self.batch = batch;

		self
	}

	/// Token manager backing this client.
	pub fn tokens(&self) -> &TokenManager {
		&self.tokens
	}

	/// Current price.
	pub async fn price(&self, code: &InstrumentCode) -> Result<QuoteEnvelope> {
		let params = [("FID_COND_MRKT_DIV_CODE", "J".to_owned()), ("FID_INPUT_ISCD", code.to_string())];

		self.call(tr_id::PRICE, PRICE_PATH, &params).await
	}

	/// Order book with expected execution.
	pub async fn order_book(&self, code: &InstrumentCode) -> Result<QuoteEnvelope> {
		let params = [("FID_COND_MRKT_DIV_CODE", "J".to_owned()), ("FID_INPUT_ISCD", code.to_string())];

		self.call(tr_id::ORDER_BOOK, ORDER_BOOK_PATH, &params).await
	}

	/// Daily series ending today (KST), unadjusted.
	pub async fn daily_prices(&self, code: &InstrumentCode) -> Result<QuoteEnvelope> {
		let params = [
			("FID_COND_MRKT_DIV_CODE", "J".to_owned()),
			("FID_INPUT_ISCD", code.to_string()),
			("FID_PERIOD_DIV_CODE", "D".to_owned()),
			("FID_ORG_ADJ_PRC", "0".to_owned()),
			("FID_INPUT_DATE_1", http::kst_date_param(self.tokens.clock().now())),
		];

		self.call(tr_id::DAILY_PRICES, DAILY_PRICES_PATH, &params).await
	}

	/// Instrument master information for a stock.
	pub async fn instrument_info(&self, code: &InstrumentCode) -> Result<QuoteEnvelope> {
		let params = [("PRDT_TYPE_CD", "300".to_owned()), ("PDNO", code.to_string())];

		self.call(tr_id::INSTRUMENT_INFO, INSTRUMENT_INFO_PATH, &params).await
	}

	/// Instrument master information normalized into a [`StockInfo`].
	pub async fn stock_info(&self, code: &InstrumentCode) -> Result<StockInfo> {
		let envelope = self.instrument_info(code).await?;
		let output = envelope.output_object().cloned().unwrap_or_default();

		Ok(StockInfo::from_output(code, &output))
	}

	/// Prices for the [`popular::FAVORITES`] watch list.
	///
	/// Lookups run four at a time. An entry whose lookup fails keeps `price: None`. The result
	/// is reused for [`popular::SNAPSHOT_TTL`]; clients sharing one `QuoteClient` share the
	/// snapshot.
	pub async fn popular(&self) -> PopularSnapshot {
		let now = self.tokens.clock().now();

		if let Some(snapshot) = self.popular.lock().as_ref().filter(|s| s.is_fresh_at(now)) {
			trace_event!(debug, "Serving the cached watch-list snapshot.");

			return PopularSnapshot { cached: true, ..snapshot.clone() };
		}

		let unpriced = popular::FAVORITES
			.iter()
			.map(|(name, code)| PopularQuote::unpriced(name, code))
			.collect();
		let clock = self.tokens.clock().clone();
		let quotes = batch::fetch_chunked(
			unpriced,
			&popular::batch_config(),
			clock.as_ref(),
			move |quote| async move {
				let code = InstrumentCode::new(&quote.code)?;
				let price = self.price(&code).await?;
				let output = price.output_object().cloned().unwrap_or_default();

				Ok::<_, Error>(quote.with_price_output(&output))
			},
		)
		.await;
		let snapshot = PopularSnapshot { quotes, fetched_at: now, cached: false };

		*self.popular.lock() = Some(snapshot.clone());

		snapshot
	}

	/// Top listed stocks by traded volume, names refreshed from per-stock price lookups.
	///
	/// A failed lookup keeps the ranking's own row.
	pub async fn volume_rank(&self) -> Result<Vec<RankedInstrument>> {
		let params = [
			("FID_COND_MRKT_DIV_CODE", "J".to_owned()),
			("FID_COND_SCR_DIV_CODE", "20171".to_owned()),
			("FID_INPUT_ISCD", "0000".to_owned()),
			("FID_DIV_CLS_CODE", "0".to_owned()),
			("FID_BLNG_CLS_CODE", "0".to_owned()),
			("FID_TRGT_CLS_CODE", "111111111".to_owned()),
			("FID_TRGT_EXLS_CLS_CODE", "0000000000".to_owned()),
			("FID_INPUT_PRICE_1", String::new()),
			("FID_INPUT_PRICE_2", String::new()),
			("FID_VOL_CNT", String::new()),
			("FID_INPUT_DATE_1", String::new()),
		];
		let envelope = self.call(tr_id::VOLUME_RANK, VOLUME_RANK_PATH, &params).await?;
		let rows: Vec<RankedInstrument> = match envelope.body.get("output") {
			Some(output) => serde_path_to_error::deserialize(output.clone())
				.map_err(|source| TransientError::ResponseParse { source, status: Some(200) })?,
			None => Vec::new(),
		};
		let listed = rank::select_listed(rows);
		let clock = self.tokens.clock().clone();

		Ok(batch::fetch_chunked(listed, &self.batch, clock.as_ref(), move |row| async move {
			let code = InstrumentCode::new(&row.code)?;
			let price = self.price(&code).await?;
			let output = price.output_object().cloned().unwrap_or_default();

			Ok::<_, Error>(row.with_price_name(&output))
		})
		.await)
	}

	async fn call(
		&self,
		tr_id: &'static str,
		path: &'static str,
		params: &[(&'static str, String)],
	) -> Result<QuoteEnvelope> {
		self.retry.run(move || self.get_once(tr_id, path, params)).await
	}

	async fn get_once(
		&self,
		tr_id: &'static str,
		path: &'static str,
		params: &[(&'static str, String)],
	) -> Result<QuoteEnvelope> {
		let token = self.tokens.token().await?;
		let url = issuance::join_path(&self.base_url, path)?;
		let headers = self.headers(tr_id, &token.bearer())?;
		let response = self.http.get(url).headers(headers).query(params).send().await?;
		let status = response.status();
		let retry_after = http::parse_retry_after(response.headers(), self.tokens.clock().now());
		let bytes = response.bytes().await?;

		if !status.is_success() {
			let upstream = UpstreamErrorBody::from_slice(&bytes);

			if let Some(err) = upstream
				.code()
				.and_then(|code| http::classify_upstream_code(code, upstream.message(), retry_after))
			{
				return Err(err);
			}

			let message = match upstream.code() {
				Some(code) => format!("{code}: {}", upstream.message()),
				None => http::body_excerpt(&bytes),
			};

			return Err(
				TransientError::HttpStatus { status: status.as_u16(), message, retry_after }.into()
			);
		}

		let envelope: QuoteEnvelope = http::parse_json(&bytes, Some(status.as_u16()))?;

		envelope.into_result()
	}

	fn headers(&self, tr_id: &'static str, bearer: &str) -> Result<HeaderMap, ConfigError> {
		let credentials = self.tokens.credentials();
		let mut headers = HeaderMap::with_capacity(5);

		insert_header(&mut headers, "authorization", bearer, true)?;
		insert_header(&mut headers, "appkey", credentials.app_key(), true)?;
		insert_header(&mut headers, "appsecret", credentials.app_secret(), true)?;
		insert_header(&mut headers, "tr_id", tr_id, false)?;
		insert_header(&mut headers, "custtype", "P", false)?;

		Ok(headers)
	}
}
#[cfg(feature = "reqwest")]
impl Debug for QuoteClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("QuoteClient")
			.field("base_url", &self.base_url.as_str())
			.field("retry", &self.retry)
			.field("batch", &self.batch)
			.finish()
	}
}

#[cfg(feature = "reqwest")]
fn insert_header(
	headers: &mut HeaderMap,
	name: &'static str,
	value: &str,
	sensitive: bool,
) -> Result<(), ConfigError> {
	let mut value =
		HeaderValue::from_str(value).map_err(|_| ConfigError::InvalidHeader { name })?;

	value.set_sensitive(sensitive);
	headers.insert(HeaderName::from_static(name), value);

	Ok(())
}
