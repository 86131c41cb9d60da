use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

pub const PROVIDER_TIMEOUT_SECS: u64 = 10;
// Yahoo rejects requests without a browser-ish user agent.
const USER_AGENT: &str = "Mozilla/5.0";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub currency: String,
}

// Seam between the fetch pipeline and the actual market-data vendor.
// `quote_batch` is one request for a whole chunk and may omit symbols
// the vendor has no data for; `quote_single` is the targeted follow-up.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn quote_batch(&self, symbols: &[String]) -> Result<HashMap<String, Quote>, ProviderError>;

    async fn quote_single(&self, symbol: &str) -> Result<Option<Quote>, ProviderError>;
}

pub struct YahooQuoteProvider {
    client: reqwest::Client,
    base_url: String,
}

impl YahooQuoteProvider {
    pub fn new() -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: "https://query1.finance.yahoo.com".to_string(),
        })
    }
}

#[async_trait]
impl QuoteProvider for YahooQuoteProvider {
    async fn quote_batch(&self, symbols: &[String]) -> Result<HashMap<String, Quote>, ProviderError> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!(
            "{}/v7/finance/quote?symbols={}",
            self.base_url,
            urlencoding::encode(&symbols.join(","))
        );

        let envelope: QuoteEnvelope = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match envelope.quote_response {
            Some(body) => Ok(parse_quote_rows(body.result)),
            None => Err(ProviderError::BadResponse(
                "missing quoteResponse envelope".to_string(),
            )),
        }
    }

    async fn quote_single(&self, symbol: &str) -> Result<Option<Quote>, ProviderError> {
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&range=1d",
            self.base_url,
            urlencoding::encode(symbol)
        );

        let envelope: ChartEnvelope = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match envelope.chart {
            Some(body) => Ok(parse_chart_result(symbol, body)),
            None => Err(ProviderError::BadResponse(
                "missing chart envelope".to_string(),
            )),
        }
    }
}

// NSE/BSE listings report prices in rupees even when the vendor labels
// them otherwise.
fn currency_for(symbol: &str, reported: Option<String>) -> String {
    if symbol.ends_with(".NS") || symbol.ends_with(".BO") {
        "INR".to_string()
    } else {
        reported.unwrap_or_else(|| "USD".to_string())
    }
}

fn parse_quote_rows(rows: Vec<QuoteRow>) -> HashMap<String, Quote> {
    let mut quotes = HashMap::new();
    for row in rows {
        if let Some(price) = row.best_price() {
            let currency = currency_for(&row.symbol, row.currency);
            quotes.insert(
                row.symbol.clone(),
                Quote {
                    symbol: row.symbol,
                    price,
                    currency,
                },
            );
        }
    }
    quotes
}

fn parse_chart_result(symbol: &str, body: ChartBody) -> Option<Quote> {
    let result = body.result?.into_iter().next()?;
    let closes = result.indicators?.quote.into_iter().next()?.close;
    // The close series carries nulls for missing bars; the latest real
    // value is the last traded price.
    let price = closes.into_iter().flatten().last()?;
    let reported = result.meta.and_then(|m| m.currency);

    Some(Quote {
        symbol: symbol.to_string(),
        price,
        currency: currency_for(symbol, reported),
    })
}

// --- Provider response shapes ---

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    #[serde(rename = "quoteResponse")]
    quote_response: Option<QuoteBody>,
}

#[derive(Debug, Deserialize)]
struct QuoteBody {
    #[serde(default)]
    result: Vec<QuoteRow>,
}

#[derive(Debug, Deserialize)]
struct QuoteRow {
    symbol: String,
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    #[serde(rename = "postMarketPrice")]
    post_market_price: Option<f64>,
    #[serde(rename = "regularMarketPreviousClose")]
    regular_market_previous_close: Option<f64>,
    currency: Option<String>,
}

impl QuoteRow {
    fn best_price(&self) -> Option<f64> {
        self.regular_market_price
            .or(self.post_market_price)
            .or(self.regular_market_previous_close)
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Option<ChartBody>,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: Option<ChartMeta>,
    indicators: Option<ChartIndicators>,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_rows_keep_only_priced_symbols() {
        let envelope: QuoteEnvelope = serde_json::from_str(
            r#"{"quoteResponse": {"result": [
                {"symbol": "AAPL", "regularMarketPrice": 150.25, "currency": "USD"},
                {"symbol": "MSFT", "currency": "USD"},
                {"symbol": "TSLA", "postMarketPrice": 242.1}
            ], "error": null}}"#,
        )
        .unwrap();

        let quotes = parse_quote_rows(envelope.quote_response.unwrap().result);
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes["AAPL"].price, 150.25);
        assert_eq!(quotes["AAPL"].currency, "USD");
        assert_eq!(quotes["TSLA"].price, 242.1);
        assert_eq!(quotes["TSLA"].currency, "USD");
        assert!(!quotes.contains_key("MSFT"));
    }

    #[test]
    fn test_price_field_fallback_order() {
        let row = QuoteRow {
            symbol: "INFY.NS".to_string(),
            regular_market_price: None,
            post_market_price: None,
            regular_market_previous_close: Some(1890.0),
            currency: Some("USD".to_string()),
        };
        assert_eq!(row.best_price(), Some(1890.0));

        let quotes = parse_quote_rows(vec![row]);
        // suffix rule wins over the reported label
        assert_eq!(quotes["INFY.NS"].currency, "INR");
    }

    #[test]
    fn test_chart_result_takes_last_non_null_close() {
        let envelope: ChartEnvelope = serde_json::from_str(
            r#"{"chart": {"result": [{
                "meta": {"currency": "USD", "symbol": "AAPL"},
                "indicators": {"quote": [{"close": [148.9, null, 150.25, null]}]}
            }], "error": null}}"#,
        )
        .unwrap();

        let quote = parse_chart_result("AAPL", envelope.chart.unwrap()).unwrap();
        assert_eq!(quote.price, 150.25);
        assert_eq!(quote.currency, "USD");
    }

    #[test]
    fn test_chart_without_result_is_a_miss_not_an_error() {
        let envelope: ChartEnvelope =
            serde_json::from_str(r#"{"chart": {"result": null, "error": {"code": "Not Found"}}}"#)
                .unwrap();
        assert!(parse_chart_result("NOPE", envelope.chart.unwrap()).is_none());
    }

    #[test]
    fn test_currency_suffix_rule() {
        assert_eq!(currency_for("RELIANCE.NS", Some("USD".to_string())), "INR");
        assert_eq!(currency_for("TATASTEEL.BO", None), "INR");
        assert_eq!(currency_for("AAPL", Some("USD".to_string())), "USD");
        assert_eq!(currency_for("AAPL", None), "USD");
    }
}
