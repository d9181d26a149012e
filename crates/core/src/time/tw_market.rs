use anyhow::Context;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike, Utc};
use serde::Serialize;
use std::collections::HashSet;

const TPE_OFFSET_SECS: i32 = 8 * 3600;

// TWSE regular session, Taipei time.
const SESSION_OPEN: (u32, u32) = (9, 0);
const SESSION_CLOSE: (u32, u32) = (13, 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    Open,
    Closed,
}

impl MarketStatus {
    pub fn label(self) -> &'static str {
        match self {
            MarketStatus::Open => "盤中",
            MarketStatus::Closed => "收盤",
        }
    }
}

pub fn taipei_now(now_utc: DateTime<Utc>) -> anyhow::Result<DateTime<FixedOffset>> {
    let tpe = FixedOffset::east_opt(TPE_OFFSET_SECS).context("invalid Taipei offset")?;
    Ok(now_utc.with_timezone(&tpe))
}

/// `YYYY-MM-DD HH:MM` in Taipei time.
pub fn update_stamp(now_utc: DateTime<Utc>) -> anyhow::Result<String> {
    Ok(taipei_now(now_utc)?.format("%Y-%m-%d %H:%M").to_string())
}

pub fn market_status(now_utc: DateTime<Utc>) -> anyhow::Result<MarketStatus> {
    let now = taipei_now(now_utc)?;
    let date = now.date_naive();
    if is_weekend(date) || configured_holidays().contains(&date) {
        return Ok(MarketStatus::Closed);
    }

    let hm = (now.hour(), now.minute());
    if (SESSION_OPEN..=SESSION_CLOSE).contains(&hm) {
        Ok(MarketStatus::Open)
    } else {
        Ok(MarketStatus::Closed)
    }
}

/// `count` month labels (`YYYY-MM`) ending with the current Taipei month, oldest first.
pub fn trailing_month_labels(now_utc: DateTime<Utc>, count: usize) -> anyhow::Result<Vec<String>> {
    let today = taipei_now(now_utc)?.date_naive();
    let current = today.year() * 12 + today.month0() as i32;

    Ok((0..count as i32)
        .rev()
        .map(|back| {
            let m = current - back;
            format!("{:04}-{:02}", m.div_euclid(12), m.rem_euclid(12) + 1)
        })
        .collect())
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

fn configured_holidays() -> HashSet<NaiveDate> {
    // Fixed-date closures only; lunar holidays come from TW_MARKET_HOLIDAYS="YYYY-MM-DD,...".
    let mut out = HashSet::new();
    for y in 2024..=2030 {
        for (m, d) in [(1, 1), (2, 28), (10, 10)] {
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                out.insert(date);
            }
        }
    }

    if let Ok(s) = std::env::var("TW_MARKET_HOLIDAYS") {
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match NaiveDate::parse_from_str(part, "%Y-%m-%d") {
                Ok(d) => {
                    out.insert(d);
                }
                Err(err) => {
                    tracing::warn!(value = part, error = %err, "ignoring malformed TW_MARKET_HOLIDAYS entry");
                }
            }
        }
    }

    out
}
