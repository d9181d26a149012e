pub mod html;

use crate::domain::analysis::AiAnalysis;
use crate::domain::market::{AssetTrend, MarketSnapshot};
use crate::domain::video::VideoInfo;
use crate::domain::Sourced;
use crate::time::tw_market::MarketStatus;
use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub use html::render_dashboard;

/// Everything one run gathered, ready to be spliced into the page.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub updated_at: String,
    pub market_status: MarketStatus,
    pub snapshot: MarketSnapshot,
    pub trends: Vec<AssetTrend>,
    pub month_labels: Vec<String>,
    pub video: Sourced<VideoInfo>,
    pub analysis: Sourced<AiAnalysis>,
}

/// Write via a sibling temp file and rename, so readers never see a half-written page.
pub fn write_dashboard(path: &Path, html: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output dir {}", parent.display()))?;
    }

    let tmp = temp_path(path);
    std::fs::write(&tmp, html).with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| {
        format!("failed to move {} into place at {}", tmp.display(), path.display())
    })?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "index.html".into());
    name.push(".tmp");
    path.with_file_name(name)
}
