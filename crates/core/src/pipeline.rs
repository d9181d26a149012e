use crate::domain::analysis::AiAnalysis;
use crate::domain::market::{AssetSpec, TREND_POINTS};
use crate::domain::video::VideoInfo;
use crate::domain::Sourced;
use crate::ingest::market::{fetch_snapshot, fetch_trends};
use crate::ingest::provider::QuoteProvider;
use crate::ingest::youtube::VideoSource;
use crate::llm::{AnalyzeInput, LlmClient};
use crate::render::Dashboard;
use crate::time::tw_market::{self, MarketStatus};
use chrono::{DateTime, Utc};

/// The live backends for one run. `None` means the step goes straight to its fallback.
#[derive(Clone, Copy, Default)]
pub struct Sources<'a> {
    pub market: Option<&'a dyn QuoteProvider>,
    pub video: Option<&'a dyn VideoSource>,
    pub llm: Option<&'a dyn LlmClient>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub quotes_live: usize,
    pub quotes_fallback: usize,
    pub trends_live: usize,
    pub trends_fallback: usize,
    pub video_live: bool,
    pub analysis_live: bool,
}

impl RunReport {
    pub fn fully_live(&self) -> bool {
        self.quotes_fallback == 0 && self.trends_fallback == 0 && self.video_live && self.analysis_live
    }

    pub fn log(&self) {
        if self.fully_live() {
            tracing::info!(report = ?self, "dashboard built from live data");
        } else {
            tracing::warn!(report = ?self, "dashboard built with fallbacks");
        }
    }
}

/// Run every step in order. Each one degrades to its own fallback, so this never fails.
pub async fn build_dashboard(
    sources: Sources<'_>,
    assets: &[AssetSpec],
    now_utc: DateTime<Utc>,
) -> (Dashboard, RunReport) {
    let snapshot = fetch_snapshot(sources.market, assets).await;
    let trends = fetch_trends(sources.market, assets).await;
    let video = fetch_video(sources.video).await;
    let analysis = if video.is_fallback() {
        tracing::info!("no live video; skipping AI analysis");
        Sourced::fallback(AiAnalysis::fallback())
    } else {
        analyze(sources.llm, &video.value).await
    };

    let report = RunReport {
        quotes_live: snapshot.quotes.len() - snapshot.fallback_count(),
        quotes_fallback: snapshot.fallback_count(),
        trends_live: trends.iter().filter(|t| !t.series.is_fallback()).count(),
        trends_fallback: trends.iter().filter(|t| t.series.is_fallback()).count(),
        video_live: !video.is_fallback(),
        analysis_live: !analysis.is_fallback(),
    };

    let dashboard = Dashboard {
        updated_at: tw_market::update_stamp(now_utc).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "Taipei clock unavailable; stamping in UTC");
            now_utc.format("%Y-%m-%d %H:%M UTC").to_string()
        }),
        market_status: tw_market::market_status(now_utc).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "market status unavailable");
            MarketStatus::Closed
        }),
        snapshot,
        trends,
        month_labels: tw_market::trailing_month_labels(now_utc, TREND_POINTS).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "month labels unavailable");
            (1..=TREND_POINTS).map(|i| i.to_string()).collect()
        }),
        video,
        analysis,
    };

    (dashboard, report)
}

async fn fetch_video(source: Option<&dyn VideoSource>) -> Sourced<VideoInfo> {
    let Some(source) = source else {
        tracing::warn!("no video source configured; using fallback video");
        return Sourced::fallback(VideoInfo::fallback());
    };

    match source.latest_video().await {
        Ok(video) => {
            tracing::info!(source = source.source_name(), title = %video.title, "latest video fetched");
            Sourced::live(video)
        }
        Err(err) => {
            tracing::warn!(source = source.source_name(), error = %err, "latest video unavailable; using fallback");
            Sourced::fallback(VideoInfo::fallback())
        }
    }
}

async fn analyze(llm: Option<&dyn LlmClient>, video: &VideoInfo) -> Sourced<AiAnalysis> {
    let Some(llm) = llm else {
        tracing::warn!("no LLM configured; using fallback analysis");
        return Sourced::fallback(AiAnalysis::fallback());
    };

    match llm.analyze(AnalyzeInput::from_video(video)).await {
        Ok(analysis) => {
            tracing::info!(
                provider = ?llm.provider(),
                summary_lines = analysis.summary.len(),
                stocks = analysis.stocks.len(),
                "analysis generated"
            );
            Sourced::live(analysis)
        }
        Err(err) => {
            match err.downcast_ref::<crate::llm::error::LlmDiagnosticsError>() {
                Some(diag) => tracing::warn!(
                    provider = ?diag.provider,
                    stage = diag.stage,
                    raw = diag.raw_excerpt(),
                    error = %err,
                    "analysis failed; using fallback"
                ),
                None => tracing::warn!(provider = ?llm.provider(), error = %err, "analysis failed; using fallback"),
            }
            Sourced::fallback(AiAnalysis::fallback())
        }
    }
}
