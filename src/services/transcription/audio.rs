//! Audio acquisition for video transcription.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::utils::{run_tool, ToolError};

#[derive(Debug, Error)]
pub enum AudioError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Audio I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio file not produced at {0}")]
    Missing(PathBuf),

    #[error("Audio is {size} bytes, over the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
}

/// Downloads the audio track of a video to a given path.
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn fetch_audio(&self, video_id: &str, dest: &Path) -> Result<(), AudioError>;
}

/// Audio extraction with `yt-dlp -x --audio-format opus`.
#[derive(Debug, Clone)]
pub struct YtDlpAudioFetcher {
    binary: String,
    proxy_url: Option<String>,
}

impl YtDlpAudioFetcher {
    pub fn new(binary: impl Into<String>, proxy_url: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            proxy_url,
        }
    }
}

#[async_trait]
impl AudioFetcher for YtDlpAudioFetcher {
    async fn fetch_audio(&self, video_id: &str, dest: &Path) -> Result<(), AudioError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // yt-dlp picks the extension itself; give it the stem.
        let template = dest.with_extension("%(ext)s");
        let url = format!("https://www.youtube.com/watch?v={}", video_id);
        info!("Downloading audio for {}", video_id);

        let mut cmd = Command::new(&self.binary);
        cmd.args(["-x", "--audio-format", "opus", "--no-playlist", "--no-progress"]);
        cmd.arg("-o").arg(&template);
        if let Some(ref proxy) = self.proxy_url {
            debug!("Using proxy for yt-dlp: {}", proxy);
            cmd.args(["--proxy", proxy]);
        }
        cmd.arg(&url);

        run_tool(cmd, "yt-dlp").await?;

        if !dest.exists() {
            return Err(AudioError::Missing(dest.to_path_buf()));
        }
        Ok(())
    }
}

/// Reject audio files above `limit` bytes.
pub fn check_audio_size(path: &Path, limit: u64) -> Result<u64, AudioError> {
    let size = std::fs::metadata(path)?.len();
    if size > limit {
        return Err(AudioError::TooLarge { size, limit });
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_audio_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.opus");
        std::fs::write(&path, vec![0u8; 64]).unwrap();

        assert_eq!(check_audio_size(&path, 64).unwrap(), 64);
        assert!(matches!(
            check_audio_size(&path, 63),
            Err(AudioError::TooLarge { size: 64, limit: 63 })
        ));
        assert!(matches!(
            check_audio_size(&dir.path().join("missing.opus"), 64),
            Err(AudioError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = YtDlpAudioFetcher::new("aggre-no-such-ytdlp", None);
        let err = fetcher
            .fetch_audio("abc123", &dir.path().join("audio.opus"))
            .await
            .unwrap_err();
        assert!(matches!(err, AudioError::Tool(ToolError::NotFound(_))));
    }
}
