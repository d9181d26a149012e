use super::{DataSource, Sourced};
use anyhow::ensure;
use serde::Serialize;

/// Number of monthly points every trend series carries.
pub const TREND_POINTS: usize = 12;

/// One tracked instrument: how to fetch it, how to show it, and what to show when the
/// provider gives us nothing usable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AssetSpec {
    pub key: &'static str,
    pub symbol: &'static str,
    pub label: &'static str,
    pub unit_prefix: &'static str,
    pub decimals: usize,
    pub lower: f64,
    pub upper: f64,
    pub fallback: f64,
}

pub const DEFAULT_ASSETS: &[AssetSpec] = &[
    AssetSpec {
        key: "taiex",
        symbol: "^TWII",
        label: "加權指數",
        unit_prefix: "",
        decimals: 0,
        lower: 10_000.0,
        upper: 60_000.0,
        fallback: 28_556.0,
    },
    AssetSpec {
        key: "tsmc",
        symbol: "2330.TW",
        label: "台積電 (2330)",
        unit_prefix: "",
        decimals: 0,
        lower: 300.0,
        upper: 5_000.0,
        fallback: 1_510.0,
    },
    AssetSpec {
        key: "gold",
        symbol: "GC=F",
        label: "黃金價格 (GOLD)",
        unit_prefix: "$",
        decimals: 0,
        lower: 1_000.0,
        upper: 10_000.0,
        fallback: 4_525.0,
    },
    AssetSpec {
        key: "usdtwd",
        symbol: "TWD=X",
        label: "美元/台幣",
        unit_prefix: "",
        decimals: 3,
        lower: 20.0,
        upper: 50.0,
        fallback: 31.595,
    },
    AssetSpec {
        key: "btc",
        symbol: "BTC-USD",
        label: "比特幣 (BTC)",
        unit_prefix: "$",
        decimals: 0,
        lower: 10_000.0,
        upper: 1_000_000.0,
        fallback: 95_000.0,
    },
];

impl AssetSpec {
    pub fn check_bounds(&self, price: f64) -> anyhow::Result<()> {
        ensure!(price.is_finite(), "{} price is not finite", self.key);
        ensure!(
            (self.lower..=self.upper).contains(&price),
            "{} price {price} outside sanity bounds [{}, {}]",
            self.key,
            self.lower,
            self.upper
        );
        Ok(())
    }

    pub fn display(&self, price: f64) -> String {
        format!("{}{}", self.unit_prefix, format_price(price, self.decimals))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub price: f64,
    pub previous_close: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Flat,
    Unknown,
}

impl Direction {
    pub fn arrow(self) -> &'static str {
        match self {
            Direction::Up => "▲",
            Direction::Down => "▼",
            Direction::Flat => "—",
            Direction::Unknown => "",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetQuote {
    pub key: &'static str,
    pub label: &'static str,
    pub price: f64,
    pub display: String,
    pub change_pct: Option<f64>,
    pub direction: Direction,
    pub source: DataSource,
}

impl AssetQuote {
    pub fn live(spec: &AssetSpec, quote: Quote) -> Self {
        let change_pct = quote
            .previous_close
            .filter(|p| p.is_finite() && *p != 0.0)
            .map(|p| round2((quote.price - p) / p * 100.0));
        let direction = match change_pct {
            Some(c) if c > 0.0 => Direction::Up,
            Some(c) if c < 0.0 => Direction::Down,
            Some(_) => Direction::Flat,
            None => Direction::Unknown,
        };

        Self {
            key: spec.key,
            label: spec.label,
            price: quote.price,
            display: spec.display(quote.price),
            change_pct,
            direction,
            source: DataSource::Live,
        }
    }

    pub fn fallback(spec: &AssetSpec) -> Self {
        Self {
            key: spec.key,
            label: spec.label,
            price: spec.fallback,
            display: spec.display(spec.fallback),
            change_pct: None,
            direction: Direction::Unknown,
            source: DataSource::Fallback,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MarketSnapshot {
    pub quotes: Vec<AssetQuote>,
}

impl MarketSnapshot {
    pub fn get(&self, key: &str) -> Option<&AssetQuote> {
        self.quotes.iter().find(|q| q.key == key)
    }

    pub fn fallback_count(&self) -> usize {
        self.quotes
            .iter()
            .filter(|q| q.source == DataSource::Fallback)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendSeries {
    pub points: [f64; TREND_POINTS],
}

impl TrendSeries {
    pub fn zeros() -> Self {
        Self {
            points: [0.0; TREND_POINTS],
        }
    }

    /// Percentage change of each close relative to the first one, over the most recent
    /// `TREND_POINTS` closes. Short histories are left-padded with zeros.
    pub fn from_closes(closes: &[f64]) -> Self {
        let closes: Vec<f64> = closes.iter().copied().filter(|c| c.is_finite()).collect();
        let window = &closes[closes.len().saturating_sub(TREND_POINTS)..];

        let Some(&first) = window.first() else {
            return Self::zeros();
        };
        if first == 0.0 {
            return Self::zeros();
        }

        let mut points = [0.0; TREND_POINTS];
        let offset = TREND_POINTS - window.len();
        for (slot, price) in points[offset..].iter_mut().zip(window) {
            *slot = round2((price - first) / first * 100.0);
        }
        Self { points }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetTrend {
    pub key: &'static str,
    pub label: &'static str,
    pub series: Sourced<TrendSeries>,
}

/// Format with thousands separators and a fixed number of decimals: `28556.4 -> "28,556"`.
pub fn format_price(value: f64, decimals: usize) -> String {
    let raw = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match raw.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (raw.as_str(), None),
    };

    let mut grouped = String::with_capacity(raw.len() + int_part.len() / 3 + 1);
    if value < 0.0 && raw.chars().any(|c| c.is_ascii_digit() && c != '0') {
        grouped.push('-');
    }
    for (i, ch) in int_part.chars().enumerate() {
        if i != 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }
    grouped
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
