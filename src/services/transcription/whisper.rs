//! Speech-to-text engines.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::info;

use super::TranscriptionError;
use crate::utils::run_tool;

/// Default whisper model.
pub const DEFAULT_WHISPER_MODEL: &str = "large-v3-turbo";

/// A finished transcript, as cached in bronze.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub transcript: String,
    pub language: Option<String>,
    pub language_probability: Option<f64>,
}

/// Turns an audio file into text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript, TranscriptionError>;
}

/// The `whisper` command-line tool.
#[derive(Debug, Clone)]
pub struct WhisperCli {
    binary: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    text: String,
    language: Option<String>,
    language_probability: Option<f64>,
}

impl WhisperCli {
    pub fn new(binary: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            model: model.into(),
        }
    }
}

/// Parse whisper's JSON output file.
fn parse_output(data: &[u8]) -> Result<Transcript, TranscriptionError> {
    let output: WhisperOutput = serde_json::from_slice(data)?;
    Ok(Transcript {
        transcript: output.text.trim().to_string(),
        language: output.language,
        language_probability: output.language_probability,
    })
}

#[async_trait]
impl SpeechToText for WhisperCli {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript, TranscriptionError> {
        let output_dir = tempfile::tempdir()?;
        info!("Transcribing {} with {}", audio.display(), self.model);

        let mut cmd = Command::new(&self.binary);
        cmd.arg(audio)
            .args(["--model", &self.model, "--output_format", "json"])
            .arg("--output_dir")
            .arg(output_dir.path());
        run_tool(cmd, "whisper").await?;

        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let json_path = output_dir.path().join(format!("{}.json", stem));
        let data = tokio::fs::read(&json_path).await?;
        parse_output(&data)
    }
}
