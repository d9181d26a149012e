use crate::domain::analysis::AiAnalysis;
use crate::domain::contract::LlmAnalysis;
use anyhow::Context;

const FENCE: &str = "```";

/// Pull the JSON object out of free-form model output.
///
/// Handles fenced blocks anywhere in the text (```` ```json ... ``` ```` or bare
/// ```` ``` ````), and otherwise falls back to the outermost `{ ... }` span.
pub fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    if let Some(open) = trimmed.find(FENCE) {
        let after_open = &trimmed[open + FENCE.len()..];
        // Skip the info string (`json`, `JSON`, ...). On a one-line fence the body starts
        // at the first brace instead of the next line.
        let line_end = after_open.find('\n').unwrap_or(after_open.len());
        let body = match after_open[..line_end].find('{') {
            Some(brace) => &after_open[brace..],
            None => after_open.get(line_end + 1..).unwrap_or(""),
        };
        let body = match body.find(FENCE) {
            Some(close) => &body[..close],
            None => body,
        };
        let body = body.trim();
        if body.starts_with('{') || body.starts_with('[') {
            return Some(body);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim())
}

pub fn parse_analysis(text: &str) -> anyhow::Result<AiAnalysis> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim());
    let parsed = serde_json::from_str::<LlmAnalysis>(json_str)
        .with_context(|| format!("LLM output is not valid analysis JSON: {json_str}"))?;
    parsed.validate_and_into_analysis()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"summary":["台股創高"],"stocks":[{"code":"2330","name":"台積電","reason":"AI"}]}"#;

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let fenced = format!("```json\n{BODY}\n```\n");
        assert_eq!(extract_json(&fenced), Some(BODY));
    }

    #[test]
    fn extract_json_handles_fence_after_prose() {
        let text = format!("好的，以下是分析：\n```JSON\n{BODY}\n```\n祝投資順利");
        assert_eq!(extract_json(&text), Some(BODY));
    }

    #[test]
    fn extract_json_handles_unterminated_fence() {
        let text = format!("```\n{BODY}");
        assert_eq!(extract_json(&text), Some(BODY));
    }

    #[test]
    fn extract_json_handles_single_line_fence() {
        let text = format!("```json {BODY}```");
        assert_eq!(extract_json(&text), Some(BODY));

        let analysis = parse_analysis(r#"```json {"summary":["a"],"stocks":[]}```"#).unwrap();
        assert_eq!(analysis.summary, vec!["a"]);
        assert!(analysis.stocks.is_empty());
    }

    #[test]
    fn extract_json_skips_fenced_prose_for_braces() {
        let text = format!("```text\nsee below\n```\n{BODY}");
        assert_eq!(extract_json(&text), Some(BODY));
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "prefix {\"a\":1} suffix";
        assert_eq!(extract_json(s), Some("{\"a\":1}"));
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn parse_analysis_accepts_fenced_output() {
        let analysis = parse_analysis(&format!("```json\n{BODY}\n```")).unwrap();
        assert_eq!(analysis.summary, vec!["台股創高"]);
        assert_eq!(analysis.stocks.len(), 1);
        assert_eq!(analysis.stocks[0].name, "台積電");
    }

    #[test]
    fn parse_analysis_keeps_summary_when_one_pick_is_blank() {
        let text = r#"{"summary":["a","b"],"stocks":[{"code":"2330","name":"台積電","reason":"x"},{"code":"","name":"?"}]}"#;
        let analysis = parse_analysis(text).unwrap();
        assert_eq!(analysis.summary, vec!["a", "b"]);
        assert_eq!(analysis.stocks.len(), 1);
        assert_eq!(analysis.stocks[0].name, "台積電");
    }

    #[test]
    fn parse_analysis_rejects_prose() {
        assert!(parse_analysis("抱歉，我無法提供投資建議。").is_err());
    }

    #[test]
    fn parse_analysis_rejects_wrong_shape() {
        assert!(parse_analysis(r#"{"items": []}"#).is_err());
    }
}
