//! Demonstrates the token manager and quotation client against a mocked KIS gateway: one
//! token issuance shared by the volume ranking and every per-stock enrichment call.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use kis_token_broker::{
	auth::Credentials,
	config::{BatchConfig, BrokerConfig},
	issuance::KisIssuanceClient,
	manager::TokenManager,
	quote::QuoteClient,
	store::{MemoryStore, SharedStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/tokenP");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"Bearer\",\"expires_in\":86400}",
			);
		})
		.await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/uapi/domestic-stock/v1/quotations/volume-rank");
			then.status(200).header("content-type", "application/json").body(
				"{\"rt_cd\":\"0\",\"msg_cd\":\"MCA00000\",\"msg1\":\"ok\",\"output\":[\
				{\"mksc_shrn_iscd\":\"005930\",\"hts_kor_isnm\":\"삼성전자\",\"acml_vol\":\"1200\"},\
				{\"mksc_shrn_iscd\":\"069500\",\"hts_kor_isnm\":\"KODEX 200\",\"acml_vol\":\"900\"},\
				{\"mksc_shrn_iscd\":\"000660\",\"hts_kor_isnm\":\"SK하이닉스\",\"acml_vol\":\"800\"}]}",
			);
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/uapi/domestic-stock/v1/quotations/inquire-price");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"rt_cd\":\"0\",\"msg_cd\":\"MCA00000\",\"msg1\":\"ok\",\"output\":{}}");
		})
		.await;

	let config = BrokerConfig::new(Credentials::new("PSdemoappkey0001", "demo-secret")?)
		.with_base_url(&format!("http://{}", server.address()))?
		.with_batch(BatchConfig { chunk_size: 2, ..Default::default() });
	let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::default());
	let issuer = Arc::new(KisIssuanceClient::new(&config.base_url)?);
	let tokens = TokenManager::from_config(&config, store, issuer)?;
	let client = QuoteClient::from_config(&config, tokens.clone())?;

	tokens.warm_up().await?;

	for row in client.volume_rank().await? {
		println!("{} {} volume={}", row.code, row.name, row.volume);
	}

	println!("Issuance attempts: {}.", tokens.metrics().attempts());

	token_mock.assert_async().await;

	Ok(())
}
