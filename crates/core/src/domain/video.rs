use serde::{Deserialize, Serialize};

pub const FALLBACK_VIDEO_URL: &str = "https://www.youtube.com/results?search_query=%E9%8C%A2%E7%B7%9A%E7%99%BE%E5%88%86%E7%99%BE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub title: String,
    pub description: String,
    pub thumbnail_url: String,
    pub link: String,
    pub published_at: Option<String>,
}

impl VideoInfo {
    pub fn fallback() -> Self {
        Self {
            title: "錢線百分百・最新一集".to_string(),
            description: "暫時無法取得最新影片資訊，請點擊前往頻道觀看。".to_string(),
            thumbnail_url: String::new(),
            link: FALLBACK_VIDEO_URL.to_string(),
            published_at: None,
        }
    }

    pub fn watch_url(video_id: &str) -> String {
        format!("https://www.youtube.com/watch?v={video_id}")
    }
}
