pub mod error;
pub mod gemini;
pub mod json;

use crate::domain::analysis::AiAnalysis;
use crate::domain::video::VideoInfo;

#[derive(Debug, Clone)]
pub struct AnalyzeInput {
    pub title: String,
    pub description: String,
    pub link: String,
}

impl AnalyzeInput {
    pub fn from_video(video: &VideoInfo) -> Self {
        Self {
            title: video.title.clone(),
            description: video.description.clone(),
            link: video.link.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn analyze(&self, input: AnalyzeInput) -> anyhow::Result<AiAnalysis>;
}
