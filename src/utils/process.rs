//! Running external command-line tools.

use std::process::{Output, Stdio};

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0} not found in PATH")]
    NotFound(String),

    #[error("{tool} failed: {stderr}")]
    Failed { tool: String, stderr: String },

    #[error("Failed to run {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run a command to completion and return its stdout.
///
/// A missing binary is reported as [`ToolError::NotFound`], a non-zero exit
/// as [`ToolError::Failed`] carrying trimmed stderr.
pub async fn run_tool(mut cmd: Command, tool: &str) -> Result<Vec<u8>, ToolError> {
    debug!("Running {:?}", cmd.as_std());
    let result = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await;
    handle_output(result, tool)
}

fn handle_output(result: std::io::Result<Output>, tool: &str) -> Result<Vec<u8>, ToolError> {
    match result {
        Ok(output) if output.status.success() => Ok(output.stdout),
        Ok(output) => Err(ToolError::Failed {
            tool: tool.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ToolError::NotFound(tool.to_string()))
        }
        Err(e) => Err(ToolError::Io {
            tool: tool.to_string(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_not_found() {
        let cmd = Command::new("aggre-no-such-tool-xyz");
        let err = run_tool(cmd, "aggre-no-such-tool-xyz").await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[test]
    fn test_io_errors_keep_their_kind() {
        let err = handle_output(
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied")),
            "yt-dlp",
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::Io { .. }));
        assert!(err.to_string().contains("yt-dlp"));
    }
}
