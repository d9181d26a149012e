use crate::domain::analysis::{AiAnalysis, StockPick};
use anyhow::ensure;
use serde::{Deserialize, Serialize};

pub const MAX_SUMMARY_LINES: usize = 5;
pub const MAX_STOCK_PICKS: usize = 5;

/// Shape the model is asked to emit. Looser than `AiAnalysis`: models drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAnalysis {
    pub summary: OneOrMany,
    #[serde(default)]
    pub stocks: Vec<LlmStockPick>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmStockPick {
    pub code: StockCode,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Ticker codes come back as `"2330"` or `2330`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StockCode {
    Text(String),
    Number(u64),
}

impl StockCode {
    fn into_string(self) -> String {
        match self {
            StockCode::Text(s) => s.trim().to_string(),
            StockCode::Number(n) => n.to_string(),
        }
    }
}

impl LlmAnalysis {
    pub fn validate_and_into_analysis(self) -> anyhow::Result<AiAnalysis> {
        let lines = match self.summary {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        };
        let summary: Vec<String> = lines
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .take(MAX_SUMMARY_LINES)
            .collect();
        ensure!(!summary.is_empty(), "LLM output has no summary lines");

        let mut stocks = Vec::with_capacity(self.stocks.len().min(MAX_STOCK_PICKS));
        for pick in self.stocks {
            if stocks.len() == MAX_STOCK_PICKS {
                break;
            }
            // A bad pick drops only itself; the summary still stands.
            match pick.validate_and_into_pick() {
                Ok(pick) => stocks.push(pick),
                Err(err) => tracing::warn!(error = %err, "skipping invalid stock pick"),
            }
        }

        Ok(AiAnalysis { summary, stocks })
    }
}

impl LlmStockPick {
    fn validate_and_into_pick(self) -> anyhow::Result<StockPick> {
        let code = self.code.into_string();
        ensure!(!code.is_empty(), "stock code must be non-empty");

        let name = self.name.trim().to_string();
        ensure!(!name.is_empty(), "stock name must be non-empty (code={code})");

        let reason = self
            .reason
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        Ok(StockPick { code, name, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: serde_json::Value) -> anyhow::Result<AiAnalysis> {
        serde_json::from_value::<LlmAnalysis>(v)?.validate_and_into_analysis()
    }

    #[test]
    fn accepts_expected_shape() {
        let analysis = parse(json!({
            "summary": ["台股創高", "  金價走揚  "],
            "stocks": [{"code": "2330", "name": "台積電", "reason": "AI"}]
        }))
        .unwrap();
        assert_eq!(analysis.summary, vec!["台股創高", "金價走揚"]);
        assert_eq!(analysis.stocks[0].code, "2330");
    }

    #[test]
    fn accepts_numeric_codes_and_single_summary_string() {
        let analysis = parse(json!({
            "summary": "only one line",
            "stocks": [{"code": 2317, "name": "鴻海"}]
        }))
        .unwrap();
        assert_eq!(analysis.summary.len(), 1);
        assert_eq!(analysis.stocks[0].code, "2317");
        assert_eq!(analysis.stocks[0].reason, "");
    }

    #[test]
    fn caps_lines_and_picks() {
        let picks: Vec<_> = (0..8)
            .map(|i| json!({"code": format!("{}", 1000 + i), "name": format!("N{i}"), "reason": "r"}))
            .collect();
        let analysis = parse(json!({
            "summary": ["a", "b", "c", "d", "e", "f", "g"],
            "stocks": picks
        }))
        .unwrap();
        assert_eq!(analysis.summary.len(), MAX_SUMMARY_LINES);
        assert_eq!(analysis.stocks.len(), MAX_STOCK_PICKS);
    }

    #[test]
    fn rejects_blank_summary() {
        assert!(parse(json!({"summary": ["  ", ""], "stocks": []})).is_err());
    }

    #[test]
    fn drops_blank_picks_and_keeps_the_rest() {
        let analysis = parse(json!({
            "summary": ["a", "b"],
            "stocks": [
                {"code": "2330", "name": "台積電", "reason": "x"},
                {"code": "", "name": "?"},
                {"code": "2454", "name": " "},
                {"code": "2317"}
            ]
        }))
        .unwrap();
        assert_eq!(analysis.summary, vec!["a", "b"]);
        assert_eq!(analysis.stocks.len(), 1);
        assert_eq!(analysis.stocks[0].code, "2330");
    }

    #[test]
    fn cap_counts_only_valid_picks() {
        let mut picks = vec![json!({"code": "", "name": "blank"})];
        picks.extend((0..5).map(|i| json!({"code": format!("{}", 2000 + i), "name": format!("N{i}")})));
        let analysis = parse(json!({"summary": ["x"], "stocks": picks})).unwrap();
        assert_eq!(analysis.stocks.len(), MAX_STOCK_PICKS);
        assert_eq!(analysis.stocks[0].code, "2000");
    }

    #[test]
    fn missing_stocks_is_allowed() {
        let analysis = parse(json!({"summary": ["x"]})).unwrap();
        assert!(analysis.stocks.is_empty());
    }
}
