//! Frankfurter API (ECB reference rates): daily history and a latest quote.

use crate::core::pair::CurrencyPair;
use crate::core::rate::{HistoricalRateProvider, LiveRateProvider, RateSample};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, instrument};

pub struct FrankfurterProvider {
    base_url: String,
    client: reqwest::Client,
}

impl FrankfurterProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("fxalert/0.1")
            .timeout(timeout)
            .build()?;
        Ok(FrankfurterProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get_text(&self, url: &str, pair: &CurrencyPair) -> Result<String> {
        debug!("Requesting rates from {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for currency pair: {}", e, pair))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for currency pair: {}",
                response.status(),
                pair
            ));
        }

        response
            .text()
            .await
            .with_context(|| format!("Failed to read response body for {pair}"))
    }
}

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    rates: BTreeMap<String, HashMap<String, f64>>,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    rates: HashMap<String, f64>,
}

#[async_trait]
impl HistoricalRateProvider for FrankfurterProvider {
    #[instrument(name = "FrankfurterSeriesFetch", skip(self), fields(pair = %pair))]
    async fn fetch_series(
        &self,
        pair: &CurrencyPair,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RateSample>> {
        let url = format!(
            "{}/{}..{}?from={}&to={}",
            self.base_url,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d"),
            pair.base,
            pair.quote
        );
        let text = self.get_text(&url, pair).await?;
        let data: SeriesResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", pair, e))?;

        let samples: Vec<RateSample> = data
            .rates
            .iter()
            .filter_map(|(date, rates)| {
                let value = rates.get(pair.quote.as_str())?;
                match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
                    Ok(date) => Some(RateSample::new(date, *value)),
                    Err(e) => {
                        debug!(date, error = %e, "Skipping sample with unparsable date");
                        None
                    }
                }
            })
            .collect();

        debug!(samples = samples.len(), "Received historical series");
        Ok(samples)
    }
}

#[async_trait]
impl LiveRateProvider for FrankfurterProvider {
    fn name(&self) -> &str {
        "frankfurter"
    }

    #[instrument(name = "FrankfurterLatestFetch", skip(self), fields(pair = %pair))]
    async fn get_rate(&self, pair: &CurrencyPair) -> Result<f64> {
        let url = format!(
            "{}/latest?from={}&to={}",
            self.base_url, pair.base, pair.quote
        );
        let text = self.get_text(&url, pair).await?;
        let data: LatestResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", pair, e))?;

        data.rates
            .get(pair.quote.as_str())
            .copied()
            .ok_or_else(|| anyhow!("No rate data found for currency pair: {}", pair))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pair() -> CurrencyPair {
        "AUD/CNY".parse().unwrap()
    }

    fn provider(server: &MockServer) -> FrankfurterProvider {
        FrankfurterProvider::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_successful_series_fetch() {
        let mock_server = MockServer::start().await;
        let mock_response = r#"{
            "amount": 1.0,
            "base": "AUD",
            "start_date": "2026-01-01",
            "end_date": "2026-01-06",
            "rates": {
                "2026-01-05": {"CNY": 4.62},
                "2026-01-02": {"CNY": 4.58},
                "2026-01-06": {"USD": 0.66},
                "not-a-date": {"CNY": 4.70}
            }
        }"#;

        Mock::given(method("GET"))
            .and(path("/2026-01-01..2026-01-06"))
            .and(query_param("from", "AUD"))
            .and(query_param("to", "CNY"))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .mount(&mock_server)
            .await;

        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 1, 6).unwrap();
        let samples = provider(&mock_server)
            .fetch_series(&pair(), start, end)
            .await
            .unwrap();

        assert_eq!(
            samples,
            vec![
                RateSample::new(NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(), 4.58),
                RateSample::new(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(), 4.62),
            ]
        );
    }

    #[tokio::test]
    async fn test_series_api_error_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let result = provider(&mock_server)
            .fetch_series(&pair(), start, start)
            .await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "HTTP error: 500 Internal Server Error for currency pair: AUD/CNY"
        );
    }

    #[tokio::test]
    async fn test_series_malformed_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"message": "not found"}"#))
            .mount(&mock_server)
            .await;

        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let result = provider(&mock_server)
            .fetch_series(&pair(), start, start)
            .await;
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse JSON response for AUD/CNY")
        );
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"rates": {}}"#)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let provider = FrankfurterProvider::new(&mock_server.uri(), Duration::from_millis(100)).unwrap();
        let result = provider.get_rate(&pair()).await;
        assert!(result.unwrap_err().to_string().contains("Request error"));
    }

    #[tokio::test]
    async fn test_successful_latest_fetch() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .and(query_param("from", "AUD"))
            .and(query_param("to", "CNY"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"amount": 1.0, "base": "AUD", "date": "2026-03-13", "rates": {"CNY": 4.7312}}"#,
            ))
            .mount(&mock_server)
            .await;

        let provider = provider(&mock_server);
        assert_eq!(provider.name(), "frankfurter");
        assert_eq!(provider.get_rate(&pair()).await.unwrap(), 4.7312);
    }

    #[tokio::test]
    async fn test_latest_missing_quote() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"rates": {"USD": 0.65}}"#))
            .mount(&mock_server)
            .await;

        let result = provider(&mock_server).get_rate(&pair()).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "No rate data found for currency pair: AUD/CNY"
        );
    }
}
