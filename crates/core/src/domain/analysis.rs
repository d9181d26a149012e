use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiAnalysis {
    pub summary: Vec<String>,
    pub stocks: Vec<StockPick>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockPick {
    pub code: String,
    pub name: String,
    pub reason: String,
}

impl AiAnalysis {
    pub fn fallback() -> Self {
        Self {
            summary: vec![
                "AI 摘要暫時無法產生，以下為市場重點提示。".to_string(),
                "台股維持高檔震盪，留意權值股與外資動向。".to_string(),
                "金價與美元走勢仍是避險資金的重要指標。".to_string(),
            ],
            stocks: vec![
                StockPick {
                    code: "2330".to_string(),
                    name: "台積電".to_string(),
                    reason: "半導體龍頭，AI 需求支撐營運。".to_string(),
                },
                StockPick {
                    code: "2317".to_string(),
                    name: "鴻海".to_string(),
                    reason: "AI 伺服器出貨動能延續。".to_string(),
                },
                StockPick {
                    code: "2454".to_string(),
                    name: "聯發科".to_string(),
                    reason: "手機與邊緣運算晶片布局完整。".to_string(),
                },
            ],
        }
    }
}
