//! YouTube channel adapter using yt-dlp.
//!
//! Channel uploads are listed with `--flat-playlist`, so no video is
//! downloaded here. Linked content is queued for transcription.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::ingest::Ingest;
use super::{Collector, Result, SourceAdapter};
use crate::models::{DiscussionDraft, DiscussionField, SourceType};
use crate::utils::run_tool;

const MUTABLE: &[DiscussionField] = &[
    DiscussionField::Title,
    DiscussionField::Url,
    DiscussionField::Meta,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeSource {
    pub channel_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeConfig {
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
    #[serde(default)]
    pub sources: Vec<YoutubeSource>,
}

fn default_fetch_limit() -> usize {
    10
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            fetch_limit: default_fetch_limit(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Playlist {
    #[serde(default)]
    entries: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct VideoEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    upload_date: Option<String>,
    duration: Option<f64>,
    view_count: Option<u64>,
}

impl VideoEntry {
    fn watch_url(&self, id: &str) -> String {
        self.url
            .clone()
            .filter(|u| u.starts_with("http"))
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", id))
    }
}

/// `YYYYMMDD` as `YYYY-MM-DD`. Anything else is dropped.
fn format_upload_date(raw: &str) -> Option<String> {
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("{}-{}-{}", &raw[..4], &raw[4..6], &raw[6..]))
}

fn channel_videos_url(channel_id: &str) -> String {
    format!("https://www.youtube.com/channel/{}/videos", channel_id)
}

pub struct YoutubeCollector {
    ingest: Ingest,
    ytdlp_binary: String,
    proxy_url: Option<String>,
}

impl YoutubeCollector {
    pub fn new(ingest: Ingest, ytdlp_binary: impl Into<String>, proxy_url: Option<String>) -> Self {
        Self {
            ingest,
            ytdlp_binary: ytdlp_binary.into(),
            proxy_url,
        }
    }

    /// List a channel's most recent uploads.
    async fn list_channel(&self, channel_id: &str, limit: usize) -> Result<Vec<Value>> {
        let mut cmd = Command::new(&self.ytdlp_binary);
        cmd.args(["--flat-playlist", "--dump-single-json", "--no-warnings"]);
        if limit > 0 {
            cmd.args(["--playlist-end", &limit.to_string()]);
        }
        if let Some(ref proxy) = self.proxy_url {
            debug!("Using proxy for yt-dlp: {}", proxy);
            cmd.args(["--proxy", proxy]);
        }
        cmd.arg(channel_videos_url(channel_id));

        let stdout = run_tool(cmd, "yt-dlp").await?;
        let playlist: Playlist = serde_json::from_slice(&stdout)?;
        Ok(playlist.entries)
    }

    /// Store playlist entries, returning how many were new. Failures are
    /// per video.
    pub(crate) async fn store_videos(
        &self,
        source_id: i32,
        channel: &YoutubeSource,
        videos: Vec<Value>,
    ) -> usize {
        let mut new_count = 0;
        for raw in videos {
            match self.store_video(source_id, channel, raw).await {
                Ok(true) => new_count += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to store video from {}: {}", channel.name, e),
            }
        }
        new_count
    }

    async fn store_video(
        &self,
        source_id: i32,
        channel: &YoutubeSource,
        raw: Value,
    ) -> Result<bool> {
        let video: VideoEntry = match serde_json::from_value(raw.clone()) {
            Ok(video) => video,
            Err(e) => {
                warn!("Skipping malformed playlist entry: {}", e);
                return Ok(false);
            }
        };
        let Some(id) = video.id.clone().filter(|id| !id.is_empty()) else {
            return Ok(false);
        };

        self.ingest.store_raw(SourceType::Youtube, &id, &raw)?;

        let url = video.watch_url(&id);
        let draft = DiscussionDraft {
            title: video.title.clone(),
            author: Some(channel.name.clone()),
            url: Some(url.clone()),
            published_at: video.upload_date.as_deref().and_then(format_upload_date),
            meta: Some(json!({
                "channel_id": channel.channel_id,
                "channel_name": channel.name,
                "duration": video.duration,
                "view_count": video.view_count,
            })),
            ..DiscussionDraft::new(id)
        };

        let stored = self
            .ingest
            .store_discussion(source_id, SourceType::Youtube, Some(&url), &draft, MUTABLE)
            .await?;
        if let Some(content_id) = stored.content_id {
            self.ingest
                .db()
                .contents()
                .request_transcription(content_id)
                .await?;
        }
        Ok(stored.is_new())
    }

    async fn collect_channel(
        &self,
        channel: &YoutubeSource,
        fetch_limit: usize,
    ) -> Result<usize> {
        info!("Collecting YouTube channel {}", channel.name);
        let source_id = self
            .ingest
            .ensure_source(
                SourceType::Youtube,
                &channel.name,
                &json!({ "channel_id": channel.channel_id, "name": channel.name }),
            )
            .await?;

        let videos = self.list_channel(&channel.channel_id, fetch_limit).await?;

        let count = videos.len();
        let new_count = self.store_videos(source_id, channel, videos).await;
        info!("{}: {} new of {} videos", channel.name, new_count, count);

        self.ingest.update_last_fetched(source_id).await?;
        Ok(new_count)
    }
}

impl SourceAdapter for YoutubeCollector {
    fn source_type(&self) -> SourceType {
        SourceType::Youtube
    }
}

#[async_trait]
impl Collector for YoutubeCollector {
    type Config = YoutubeConfig;

    async fn collect(&self, config: &YoutubeConfig) -> Result<usize> {
        let mut total_new = 0;
        for channel in &config.sources {
            match self.collect_channel(channel, config.fetch_limit).await {
                Ok(new_count) => total_new += new_count,
                Err(e) => warn!("YouTube channel {} failed: {}", channel.name, e),
            }
        }
        Ok(total_new)
    }
}
