use crate::domain::market::{AssetQuote, AssetSpec, AssetTrend, MarketSnapshot, TrendSeries};
use crate::domain::Sourced;
use crate::ingest::provider::QuoteProvider;

/// Quote every asset; anything missing or implausible becomes the asset's fallback.
pub async fn fetch_snapshot(
    provider: Option<&dyn QuoteProvider>,
    assets: &[AssetSpec],
) -> MarketSnapshot {
    let mut quotes = Vec::with_capacity(assets.len());
    for asset in assets {
        let Some(provider) = provider else {
            quotes.push(AssetQuote::fallback(asset));
            continue;
        };

        let res = match provider.fetch_quote(asset.symbol).await {
            Ok(quote) => asset.check_bounds(quote.price).map(|()| quote),
            Err(err) => Err(err),
        };

        match res {
            Ok(quote) => {
                tracing::info!(
                    provider = provider.provider_name(),
                    asset = asset.key,
                    symbol = asset.symbol,
                    price = quote.price,
                    "quote fetched"
                );
                quotes.push(AssetQuote::live(asset, quote));
            }
            Err(err) => {
                tracing::warn!(
                    provider = provider.provider_name(),
                    asset = asset.key,
                    symbol = asset.symbol,
                    fallback = asset.fallback,
                    error = %err,
                    "quote unavailable; using fallback"
                );
                quotes.push(AssetQuote::fallback(asset));
            }
        }
    }

    if provider.is_none() {
        tracing::warn!(assets = assets.len(), "no quote provider configured; all quotes use fallbacks");
    }

    MarketSnapshot { quotes }
}

/// 12-point monthly percentage trend per asset; zeros when history is unavailable.
pub async fn fetch_trends(
    provider: Option<&dyn QuoteProvider>,
    assets: &[AssetSpec],
) -> Vec<AssetTrend> {
    let mut out = Vec::with_capacity(assets.len());
    for asset in assets {
        let series = match provider {
            None => Sourced::fallback(TrendSeries::zeros()),
            Some(provider) => match provider.fetch_monthly_closes(asset.symbol).await {
                Ok(closes) => Sourced::live(TrendSeries::from_closes(&closes)),
                Err(err) => {
                    tracing::warn!(
                        provider = provider.provider_name(),
                        asset = asset.key,
                        symbol = asset.symbol,
                        error = %err,
                        "monthly history unavailable; using flat trend"
                    );
                    Sourced::fallback(TrendSeries::zeros())
                }
            },
        };

        out.push(AssetTrend {
            key: asset.key,
            label: asset.label,
            series,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{Quote, DEFAULT_ASSETS, TREND_POINTS};
    use crate::domain::DataSource;
    use anyhow::Result;
    use std::collections::HashMap;

    struct FakeProvider {
        quotes: HashMap<&'static str, f64>,
        closes: HashMap<&'static str, Vec<f64>>,
    }

    #[async_trait::async_trait]
    impl QuoteProvider for FakeProvider {
        fn provider_name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_quote(&self, symbol: &str) -> Result<Quote> {
            let price = *self
                .quotes
                .get(symbol)
                .ok_or_else(|| anyhow::anyhow!("no quote for {symbol}"))?;
            Ok(Quote {
                price,
                previous_close: Some(price),
            })
        }

        async fn fetch_monthly_closes(&self, symbol: &str) -> Result<Vec<f64>> {
            self.closes
                .get(symbol)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no history for {symbol}"))
        }
    }

    #[tokio::test]
    async fn failed_and_out_of_bounds_quotes_fall_back() {
        let provider = FakeProvider {
            quotes: HashMap::from([("2330.TW", 1500.0), ("GC=F", 45.25)]),
            closes: HashMap::new(),
        };

        let snapshot = fetch_snapshot(Some(&provider as &dyn QuoteProvider), DEFAULT_ASSETS).await;
        assert_eq!(snapshot.quotes.len(), DEFAULT_ASSETS.len());

        let tsmc = snapshot.get("tsmc").unwrap();
        assert_eq!(tsmc.display, "1,500");
        assert_eq!(tsmc.source, DataSource::Live);

        // 45.25 is below the gold sanity floor.
        let gold = snapshot.get("gold").unwrap();
        assert_eq!(gold.display, "$4,525");
        assert_eq!(gold.source, DataSource::Fallback);

        assert_eq!(snapshot.get("usdtwd").unwrap().display, "31.595");
        assert_eq!(snapshot.fallback_count(), DEFAULT_ASSETS.len() - 1);
    }

    #[tokio::test]
    async fn missing_provider_uses_all_fallbacks() {
        let snapshot = fetch_snapshot(None, DEFAULT_ASSETS).await;
        assert_eq!(snapshot.fallback_count(), DEFAULT_ASSETS.len());
        assert_eq!(snapshot.get("taiex").unwrap().display, "28,556");

        let trends = fetch_trends(None, DEFAULT_ASSETS).await;
        assert!(trends.iter().all(|t| t.series.is_fallback()));
    }

    #[tokio::test]
    async fn trends_always_have_twelve_points() {
        let provider = FakeProvider {
            quotes: HashMap::new(),
            closes: HashMap::from([
                ("^TWII", (0..14).map(|i| 20_000.0 + i as f64 * 100.0).collect()),
                ("2330.TW", vec![1000.0, 1200.0]),
            ]),
        };

        let trends = fetch_trends(Some(&provider as &dyn QuoteProvider), DEFAULT_ASSETS).await;
        assert_eq!(trends.len(), DEFAULT_ASSETS.len());
        for trend in &trends {
            assert_eq!(trend.series.value.points.len(), TREND_POINTS);
        }

        let tsmc = trends.iter().find(|t| t.key == "tsmc").unwrap();
        assert_eq!(tsmc.series.source, DataSource::Live);
        assert_eq!(tsmc.series.value.points[TREND_POINTS - 1], 20.0);

        let gold = trends.iter().find(|t| t.key == "gold").unwrap();
        assert!(gold.series.is_fallback());
        assert_eq!(gold.series.value, TrendSeries::zeros());
    }
}
