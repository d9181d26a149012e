use clap::Parser;
use jasontv_core::config::{self, Settings};
use jasontv_core::domain::market::DEFAULT_ASSETS;
use jasontv_core::http::HttpClient;
use jasontv_core::ingest::provider::{QuoteProvider, YahooChartClient};
use jasontv_core::ingest::youtube::{VideoSource, YouTubeClient};
use jasontv_core::llm::gemini::GeminiClient;
use jasontv_core::llm::LlmClient;
use jasontv_core::pipeline::{build_dashboard, Sources};
use jasontv_core::render::{render_dashboard, write_dashboard};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "jasontv_worker")]
struct Args {
    /// Where to write the page. Overrides OUTPUT_PATH (default: index.html).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Skip every network call and render fallbacks only.
    #[arg(long)]
    offline: bool,

    /// Build and render, but do not write the page.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let _sentry_guard = config::sentry_dsn().map(|dsn| init_sentry(&dsn));
    let settings = Settings::from_env();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let settings = settings.unwrap_or_else(|err| {
        sentry_anyhow::capture_anyhow(&err);
        tracing::warn!(error = %err, "invalid configuration; continuing with defaults");
        Settings {
            sentry_dsn: config::sentry_dsn(),
            ..Settings::default()
        }
    });
    let output = args.output.clone().unwrap_or_else(|| settings.output_path.clone());

    let clients = if args.offline {
        tracing::info!("offline run; every step uses its fallback");
        Clients::default()
    } else {
        Clients::from_settings(&settings)
    };

    let (dashboard, report) = build_dashboard(clients.sources(), DEFAULT_ASSETS, chrono::Utc::now()).await;
    report.log();

    let html = match render_dashboard(&dashboard) {
        Ok(html) => html,
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "failed to render dashboard");
            return Ok(());
        }
    };

    if args.dry_run {
        tracing::info!(bytes = html.len(), output = %output.display(), dry_run = true, "dashboard rendered; not writing");
        return Ok(());
    }

    publish(&output, &html);
    Ok(())
}

/// Write the page. A failure is reported, never propagated: the run still succeeds.
fn publish(output: &Path, html: &str) -> bool {
    match write_dashboard(output, html) {
        Ok(()) => {
            tracing::info!(bytes = html.len(), output = %output.display(), "dashboard written");
            true
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(output = %output.display(), error = %err, "failed to write dashboard");
            false
        }
    }
}

/// Live backends; any that cannot be built is left out and its step falls back.
#[derive(Default)]
struct Clients {
    market: Option<YahooChartClient>,
    video: Option<YouTubeClient>,
    llm: Option<GeminiClient>,
}

impl Clients {
    fn from_settings(settings: &Settings) -> Self {
        let http = match HttpClient::from_settings(settings) {
            Ok(http) => http,
            Err(err) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "failed to build http client");
                return Self::default();
            }
        };

        let video = if settings.youtube_api_key.is_some() {
            log_unavailable("youtube", YouTubeClient::from_settings(settings, http.clone()))
        } else {
            tracing::warn!("YOUTUBE_API_KEY not set; video step will use its fallback");
            None
        };

        let llm = if settings.gemini_api_key.is_some() {
            log_unavailable("gemini", GeminiClient::from_settings(settings, &http))
        } else {
            tracing::warn!("GEMINI_API_KEY not set; analysis step will use its fallback");
            None
        };

        Self {
            market: Some(YahooChartClient::new(http)),
            video,
            llm,
        }
    }

    fn sources(&self) -> Sources<'_> {
        Sources {
            market: self.market.as_ref().map(|c| c as &dyn QuoteProvider),
            video: self.video.as_ref().map(|c| c as &dyn VideoSource),
            llm: self.llm.as_ref().map(|c| c as &dyn LlmClient),
        }
    }
}

fn log_unavailable<T>(client: &'static str, built: anyhow::Result<T>) -> Option<T> {
    match built {
        Ok(c) => Some(c),
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(client, error = %err, "failed to build client");
            None
        }
    }
}

fn init_sentry(dsn: &str) -> sentry::ClientInitGuard {
    sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    ))
}
