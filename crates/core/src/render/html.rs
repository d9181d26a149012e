use super::Dashboard;
use crate::domain::market::{AssetQuote, Direction};
use crate::domain::DataSource;
use crate::time::tw_market::MarketStatus;
use serde::Serialize;
use std::fmt::Write;

const TITLE: &str = "Jason TV | 專業財經監控終端";
const CHART_JS_URL: &str = "https://cdn.jsdelivr.net/npm/chart.js";
const FONTS_URL: &str = "https://fonts.googleapis.com/css2?family=JetBrains+Mono:wght@500;700&family=Noto+Sans+TC:wght@400;700&display=swap";
const CHART_PALETTE: &[&str] = &["#00e5ff", "#ff4d4d", "#fbbf24", "#a78bfa", "#00ff88"];
const VIDEO_DESCRIPTION_CHARS: usize = 240;

const STYLE: &str = r#"
:root { --bg: #05070a; --card: #11151c; --accent: #00e5ff; --up: #ff4d4d; --down: #00ff88; --text: #e2e8f0; --muted: #94a3b8; --border: #232a35; }
* { box-sizing: border-box; margin: 0; padding: 0; }
body { font-family: 'Noto Sans TC', sans-serif; background: var(--bg); color: var(--text); overflow-x: hidden; }
header { position: fixed; top: 0; width: 100%; height: 60px; background: rgba(17, 21, 28, 0.98); border-bottom: 1px solid var(--border); display: flex; align-items: center; justify-content: space-between; padding: 0 20px; z-index: 1000; }
.logo { font-size: 24px; font-weight: 900; color: var(--accent); letter-spacing: 2px; }
.market-status { font-family: 'JetBrains Mono', monospace; font-size: 11px; color: var(--down); }
.market-status.closed { color: var(--muted); }
.container { max-width: 1200px; margin: 80px auto 40px; padding: 0 20px; }
.panel { background: var(--card); border: 1px solid var(--border); border-radius: 12px; padding: 25px; margin-bottom: 30px; }
.hero-summary { border-color: var(--accent); }
.panel h2 { color: var(--accent); margin-bottom: 15px; font-size: 18px; }
.summary-item { margin-bottom: 12px; font-size: 15px; line-height: 1.6; padding-left: 20px; position: relative; color: #cbd5e1; }
.summary-item::before { content: '▶'; position: absolute; left: 0; color: var(--accent); font-size: 12px; top: 3px; }
.grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(220px, 1fr)); gap: 15px; margin-bottom: 30px; }
.card { background: var(--card); border: 1px solid var(--border); border-radius: 12px; padding: 20px; }
.card-label { color: var(--muted); font-size: 12px; }
.card-main { font-family: 'JetBrains Mono', monospace; font-size: 26px; font-weight: 700; display: flex; align-items: baseline; gap: 8px; }
.card-change { font-family: 'JetBrains Mono', monospace; font-size: 12px; }
.up { color: var(--up); } .down { color: var(--down); } .flat, .unknown { color: var(--text); }
.badge { display: inline-block; font-size: 10px; color: var(--muted); border: 1px solid var(--border); border-radius: 6px; padding: 1px 6px; margin-left: 6px; }
.picks { list-style: none; }
.picks li { padding: 10px 0; border-bottom: 1px solid var(--border); }
.picks .code { font-family: 'JetBrains Mono', monospace; color: var(--accent); margin-right: 8px; }
.video { display: flex; gap: 20px; align-items: flex-start; }
.video img { width: 240px; max-width: 40%; border-radius: 8px; }
.video a { color: var(--text); text-decoration: none; font-weight: 700; }
.video p { color: var(--muted); font-size: 13px; margin-top: 8px; line-height: 1.5; }
.chart-panel { min-height: 380px; position: relative; }
@media (max-width: 600px) { .logo { font-size: 20px; } .card-main { font-size: 22px; } .video { flex-direction: column; } .video img { max-width: 100%; } }
"#;

#[derive(Serialize)]
struct ChartSeries<'a> {
    label: &'a str,
    data: &'a [f64],
    color: &'a str,
}

pub fn render_dashboard(dashboard: &Dashboard) -> anyhow::Result<String> {
    let mut out = String::with_capacity(16 * 1024);

    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html lang=\"zh-TW\">")?;
    writeln!(out, "<head>")?;
    writeln!(out, "<meta charset=\"UTF-8\">")?;
    writeln!(
        out,
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">"
    )?;
    writeln!(out, "<title>{}</title>", escape_html(TITLE))?;
    writeln!(out, "<script src=\"{CHART_JS_URL}\"></script>")?;
    writeln!(out, "<link href=\"{}\" rel=\"stylesheet\">", escape_html(FONTS_URL))?;
    writeln!(out, "<style>{STYLE}</style>")?;
    writeln!(out, "</head>")?;
    writeln!(out, "<body>")?;

    render_header(&mut out, dashboard)?;
    writeln!(out, "<div class=\"container\">")?;
    render_summary(&mut out, dashboard)?;
    render_quotes(&mut out, dashboard)?;
    render_picks(&mut out, dashboard)?;
    render_video(&mut out, dashboard)?;
    writeln!(
        out,
        "<div class=\"panel chart-panel\"><h2>近一年走勢 (%)</h2><canvas id=\"mainChart\"></canvas></div>"
    )?;
    writeln!(out, "</div>")?;
    render_chart_script(&mut out, dashboard)?;

    writeln!(out, "</body>")?;
    writeln!(out, "</html>")?;
    Ok(out)
}

fn render_header(out: &mut String, d: &Dashboard) -> std::fmt::Result {
    let status_class = match d.market_status {
        MarketStatus::Open => "market-status",
        MarketStatus::Closed => "market-status closed",
    };
    writeln!(out, "<header>")?;
    writeln!(out, "<div class=\"logo\">JASON TV</div>")?;
    writeln!(
        out,
        "<div class=\"{status_class}\">● AUTO LIVE | {} | {}</div>",
        escape_html(d.market_status.label()),
        escape_html(&d.updated_at)
    )?;
    writeln!(out, "</header>")
}

fn render_summary(out: &mut String, d: &Dashboard) -> std::fmt::Result {
    writeln!(out, "<div class=\"panel hero-summary\">")?;
    writeln!(
        out,
        "<h2>📺 錢線百分百・自動化摘要{}</h2>",
        badge(d.analysis.source)
    )?;
    for line in &d.analysis.value.summary {
        writeln!(out, "<div class=\"summary-item\">{}</div>", escape_html(line))?;
    }
    writeln!(out, "</div>")
}

fn render_quotes(out: &mut String, d: &Dashboard) -> std::fmt::Result {
    writeln!(out, "<div class=\"grid\">")?;
    for q in &d.snapshot.quotes {
        render_quote_card(out, q)?;
    }
    writeln!(out, "</div>")
}

fn render_quote_card(out: &mut String, q: &AssetQuote) -> std::fmt::Result {
    let class = direction_class(q.direction);
    writeln!(out, "<div class=\"card\" data-asset=\"{}\">", escape_html(q.key))?;
    writeln!(
        out,
        "<div class=\"card-label\">{}{}</div>",
        escape_html(q.label),
        badge(q.source)
    )?;
    writeln!(
        out,
        "<div class=\"card-main {class}\">{} {}</div>",
        escape_html(&q.display),
        q.direction.arrow()
    )?;
    if let Some(change) = q.change_pct {
        writeln!(out, "<div class=\"card-change {class}\">{change:+.2}%</div>")?;
    }
    writeln!(out, "</div>")
}

fn render_picks(out: &mut String, d: &Dashboard) -> std::fmt::Result {
    let stocks = &d.analysis.value.stocks;
    if stocks.is_empty() {
        return Ok(());
    }
    writeln!(out, "<div class=\"panel\">")?;
    writeln!(out, "<h2>AI 關注個股</h2>")?;
    writeln!(out, "<ul class=\"picks\">")?;
    for pick in stocks {
        writeln!(
            out,
            "<li><span class=\"code\">{}</span><b>{}</b> — {}</li>",
            escape_html(&pick.code),
            escape_html(&pick.name),
            escape_html(&pick.reason)
        )?;
    }
    writeln!(out, "</ul>")?;
    writeln!(out, "</div>")
}

fn render_video(out: &mut String, d: &Dashboard) -> std::fmt::Result {
    let v = &d.video.value;
    writeln!(out, "<div class=\"panel\">")?;
    writeln!(out, "<h2>最新節目{}</h2>", badge(d.video.source))?;
    writeln!(out, "<div class=\"video\">")?;
    if !v.thumbnail_url.is_empty() {
        writeln!(
            out,
            "<a href=\"{}\" target=\"_blank\" rel=\"noopener\"><img src=\"{}\" alt=\"{}\"></a>",
            escape_html(&v.link),
            escape_html(&v.thumbnail_url),
            escape_html(&v.title)
        )?;
    }
    writeln!(out, "<div>")?;
    writeln!(
        out,
        "<a href=\"{}\" target=\"_blank\" rel=\"noopener\">{}</a>",
        escape_html(&v.link),
        escape_html(&v.title)
    )?;
    if let Some(published) = &v.published_at {
        writeln!(out, "<div class=\"card-label\">{}</div>", escape_html(published))?;
    }
    let description: String = v.description.chars().take(VIDEO_DESCRIPTION_CHARS).collect();
    writeln!(out, "<p>{}</p>", escape_html(&description))?;
    writeln!(out, "</div>")?;
    writeln!(out, "</div>")?;
    writeln!(out, "</div>")
}

fn render_chart_script(out: &mut String, d: &Dashboard) -> anyhow::Result<()> {
    let series: Vec<ChartSeries<'_>> = d
        .trends
        .iter()
        .enumerate()
        .map(|(i, t)| ChartSeries {
            label: t.label,
            data: &t.series.value.points,
            color: CHART_PALETTE[i % CHART_PALETTE.len()],
        })
        .collect();

    let labels = script_json(&d.month_labels)?;
    let series = script_json(&series)?;

    writeln!(out, "<script>")?;
    writeln!(out, "const labels = {labels};")?;
    writeln!(out, "const series = {series};")?;
    out.push_str(
        "new Chart(document.getElementById('mainChart').getContext('2d'), {\n\
         \x20 type: 'line',\n\
         \x20 data: { labels, datasets: series.map(s => ({ label: s.label, data: s.data, borderColor: s.color, tension: 0.4 })) },\n\
         \x20 options: { responsive: true, maintainAspectRatio: false }\n\
         });\n",
    );
    writeln!(out, "</script>")?;
    Ok(())
}

fn direction_class(direction: Direction) -> &'static str {
    match direction {
        Direction::Up => "up",
        Direction::Down => "down",
        Direction::Flat => "flat",
        Direction::Unknown => "unknown",
    }
}

fn badge(source: DataSource) -> &'static str {
    match source {
        DataSource::Live => "",
        DataSource::Fallback => "<span class=\"badge\">fallback</span>",
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// JSON that is safe to drop inside a `<script>` element.
fn script_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::{AiAnalysis, StockPick};
    use crate::domain::market::{
        AssetQuote, AssetTrend, MarketSnapshot, Quote, TrendSeries, DEFAULT_ASSETS,
    };
    use crate::domain::video::VideoInfo;
    use crate::domain::Sourced;


    fn fallback_dashboard() -> Dashboard {
        Dashboard {
            updated_at: "2026-10-18 08:00".to_string(),
            market_status: MarketStatus::Closed,
            snapshot: MarketSnapshot {
                quotes: DEFAULT_ASSETS.iter().map(AssetQuote::fallback).collect(),
            },
            trends: DEFAULT_ASSETS
                .iter()
                .map(|a| AssetTrend {
                    key: a.key,
                    label: a.label,
                    series: Sourced::fallback(TrendSeries::zeros()),
                })
                .collect(),
            month_labels: (1..=12).map(|m| format!("2026-{m:02}")).collect(),
            video: Sourced::fallback(VideoInfo::fallback()),
            analysis: Sourced::fallback(AiAnalysis::fallback()),
        }
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html("<b>\"A&B\"</b> 'x'"),
            "&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt; &#39;x&#39;"
        );
    }

    #[test]
    fn script_json_cannot_close_the_script_tag() {
        let s = script_json(&vec!["</script><script>alert(1)"]).unwrap();
        assert!(!s.contains("</script>"));
        assert!(s.contains("<\\/script>"));
    }

    #[test]
    fn all_fallback_dashboard_is_complete_html() {
        let html = render_dashboard(&fallback_dashboard()).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.trim_end().ends_with("</html>"));
        assert!(html.contains("28,556"));
        assert!(html.contains("$4,525"));
        assert!(html.contains("31.595"));
        assert!(html.contains("2026-10-18 08:00"));
        assert!(html.contains(FALLBACK_VIDEO_MARKER));
        assert!(html.contains("台積電"));
        assert!(html.contains("\"2026-12\""));
        assert!(html.contains("fallback"));
    }

    const FALLBACK_VIDEO_MARKER: &str = "錢線百分百・最新一集";

    #[test]
    fn live_values_are_escaped_and_marked() {
        let mut d = fallback_dashboard();
        let tsmc = DEFAULT_ASSETS.iter().find(|a| a.key == "tsmc").unwrap();
        d.snapshot.quotes[1] = AssetQuote::live(
            tsmc,
            Quote {
                price: 1480.0,
                previous_close: Some(1500.0),
            },
        );
        d.video = Sourced::live(VideoInfo {
            title: "台股 <創高> & \"金價\"".to_string(),
            description: "desc".to_string(),
            thumbnail_url: "https://i.ytimg.com/vi/abc/hqdefault.jpg".to_string(),
            link: VideoInfo::watch_url("abc"),
            published_at: Some("2026-10-17T12:00:00Z".to_string()),
        });
        d.analysis = Sourced::live(AiAnalysis {
            summary: vec!["<script>alert(1)</script>".to_string()],
            stocks: vec![StockPick {
                code: "2317".to_string(),
                name: "鴻海".to_string(),
                reason: "AI 伺服器".to_string(),
            }],
        });

        let html = render_dashboard(&d).unwrap();
        assert!(html.contains("台股 &lt;創高&gt; &amp; &quot;金價&quot;"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!html.contains("<script>alert(1)"));
        assert!(html.contains("https://www.youtube.com/watch?v=abc"));
        assert!(html.contains("1,480 ▼"));
        assert!(html.contains("-1.33%"));
        assert!(html.contains("2317"));
    }
}
