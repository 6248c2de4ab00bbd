use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use url::Url;

/// Transport command issued to a running player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause,
    Resume,
    Seek(Duration),
    Stop,
    /// Ask the player to exit.
    Close,
}

impl ControlCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Seek(_) => "seek",
            Self::Stop => "stop",
            Self::Close => "close",
        }
    }
}

/// A native control action, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    /// GET against the player's command endpoint.
    Http { url: Url, password: Option<String> },
    /// Run the companion control executable.
    Companion { program: PathBuf, args: Vec<String> },
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("player rejected command (status {0})")]
    Status(u16),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

/// Execute a control request. Waits only for the request to be sent or the
/// companion process to start, never for the player to act on it.
pub async fn execute(client: &reqwest::Client, request: &ControlRequest) -> Result<(), ControlError> {
    match request {
        ControlRequest::Http { url, password } => {
            let mut req = client.get(url.clone());
            if let Some(password) = password {
                req = req.basic_auth("", Some(password));
            }
            let resp = req.send().await?;
            if !resp.status().is_success() {
                return Err(ControlError::Status(resp.status().as_u16()));
            }
            debug!(%url, "Control command accepted");
            Ok(())
        }
        ControlRequest::Companion { program, args } => {
            tokio::process::Command::new(program)
                .args(args)
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .spawn()
                .map_err(|source| ControlError::Spawn {
                    program: program.display().to_string(),
                    source,
                })?;
            debug!(program = %program.display(), ?args, "Companion command started");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_companion_reports_spawn_error() {
        let client = reqwest::Client::new();
        let request = ControlRequest::Companion {
            program: PathBuf::from("/nonexistent/outplay-companion"),
            args: vec!["/pause".into()],
        };
        let err = execute(&client, &request).await.unwrap_err();
        assert!(matches!(err, ControlError::Spawn { .. }));
    }
}
