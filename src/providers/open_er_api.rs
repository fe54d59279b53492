//! open.er-api.com: latest rates for every quote currency of one base.

use crate::core::cache::Cache;
use crate::core::pair::CurrencyPair;
use crate::core::rate::LiveRateProvider;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// One response serves every pair sharing a base currency, so responses are
/// kept for this long to avoid refetching within a check cycle.
pub const BASE_RATES_TTL: Duration = Duration::from_secs(300);

pub struct OpenErApiProvider {
    base_url: String,
    client: reqwest::Client,
    cache: Arc<Cache<String, HashMap<String, f64>>>,
}

impl OpenErApiProvider {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        cache: Arc<Cache<String, HashMap<String, f64>>>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("fxalert/0.1")
            .timeout(timeout)
            .build()?;
        Ok(OpenErApiProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            cache,
        })
    }

    async fn base_rates(&self, base: &str) -> Result<HashMap<String, f64>> {
        if let Some(cached) = self.cache.get(&base.to_string()).await {
            return Ok(cached);
        }

        let url = format!("{}/v6/latest/{}", self.base_url, base);
        debug!("Requesting latest rates from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for base currency: {}", e, base))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for base currency: {}",
                response.status(),
                base
            ));
        }

        let text = response.text().await?;
        let data: LatestResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", base, e))?;

        if data.result != "success" {
            return Err(anyhow!(
                "API error for base currency {}: {}",
                base,
                data.error_type.unwrap_or(data.result)
            ));
        }

        self.cache.put(base.to_string(), data.rates.clone()).await;
        Ok(data.rates)
    }
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    result: String,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    #[serde(default)]
    rates: HashMap<String, f64>,
}

#[async_trait]
impl LiveRateProvider for OpenErApiProvider {
    fn name(&self) -> &str {
        "open.er-api"
    }

    #[instrument(name = "OpenErApiRateFetch", skip(self), fields(pair = %pair))]
    async fn get_rate(&self, pair: &CurrencyPair) -> Result<f64> {
        let rates = self.base_rates(pair.base.as_str()).await?;
        rates
            .get(pair.quote.as_str())
            .copied()
            .ok_or_else(|| anyhow!("No rate data found for currency pair: {}", pair))
    }
}
