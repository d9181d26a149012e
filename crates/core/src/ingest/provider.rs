use crate::config::non_empty_var;
use crate::domain::market::Quote;
use crate::http::HttpClient;
use crate::ingest::types::{ChartResponse, ChartResult};
use anyhow::{Context, Result};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const QUOTE_RANGE: &str = "5d";
const QUOTE_INTERVAL: &str = "1d";
const TREND_RANGE: &str = "1y";
const TREND_INTERVAL: &str = "1mo";

#[async_trait::async_trait]
pub trait QuoteProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Latest close over a short lookback window.
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote>;

    /// Monthly closes for roughly the last year, oldest first.
    async fn fetch_monthly_closes(&self, symbol: &str) -> Result<Vec<f64>>;
}

#[derive(Debug, Clone)]
pub struct YahooChartClient {
    http: HttpClient,
    base_url: String,
}

impl YahooChartClient {
    pub fn new(http: HttpClient) -> Self {
        let base_url = non_empty_var("YAHOO_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self { http, base_url }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, symbol: &str) -> String {
        format!(
            "{}/v8/finance/chart/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(symbol)
        )
    }

    async fn fetch_chart(&self, symbol: &str, range: &str, interval: &str) -> Result<ChartResult> {
        let query = [
            ("range", range.to_string()),
            ("interval", interval.to_string()),
        ];
        let parsed = self
            .http
            .get_json::<ChartResponse>("yahoo chart", &self.url(symbol), &query)
            .await
            .with_context(|| format!("yahoo chart fetch failed for {symbol}"))?;

        if let Some(err) = parsed.chart.error {
            anyhow::bail!(
                "yahoo chart error for {symbol}: {} {}",
                err.code,
                err.description
            );
        }

        parsed
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .with_context(|| format!("yahoo chart returned no result for {symbol}"))
    }
}

#[async_trait::async_trait]
impl QuoteProvider for YahooChartClient {
    fn provider_name(&self) -> &'static str {
        "yahoo_chart"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote> {
        let chart = self.fetch_chart(symbol, QUOTE_RANGE, QUOTE_INTERVAL).await?;
        quote_from_chart(&chart).with_context(|| format!("no usable close for {symbol}"))
    }

    async fn fetch_monthly_closes(&self, symbol: &str) -> Result<Vec<f64>> {
        let chart = self.fetch_chart(symbol, TREND_RANGE, TREND_INTERVAL).await?;
        let closes = chart.valid_closes();
        anyhow::ensure!(!closes.is_empty(), "no monthly closes for {symbol}");
        Ok(closes)
    }
}

fn quote_from_chart(chart: &ChartResult) -> Option<Quote> {
    let closes = chart.valid_closes();
    match closes.as_slice() {
        [.., prev, last] => Some(Quote {
            price: *last,
            previous_close: Some(*prev),
        }),
        [only] => Some(Quote {
            price: *only,
            previous_close: chart.meta.chart_previous_close,
        }),
        [] => chart
            .meta
            .regular_market_price
            .filter(|p| p.is_finite() && *p > 0.0)
            .map(|price| Quote {
                price,
                previous_close: chart.meta.chart_previous_close,
            }),
    }
}
