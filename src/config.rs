use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::util::{is_local_endpoint_url, parse_bool_flag};

const DEFAULT_API_URL: &str = "http://localhost:8000/chat/stream";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_url: String,
    pub student: String,
    pub bearer_token: Option<String>,
    pub token_path: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub restore_history: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_url =
            std::env::var("STUDYCHAT_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let student = std::env::var("STUDYCHAT_STUDENT")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "default".to_string());

        let token_path = std::env::var("STUDYCHAT_TOKEN_FILE")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let bearer_token = load_bearer_token(token_path.as_deref())?;

        let data_dir = std::env::var("STUDYCHAT_DATA_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".studychat")))
            .unwrap_or_else(|| PathBuf::from(".studychat"));

        let restore_history = std::env::var("STUDYCHAT_RESTORE_HISTORY")
            .ok()
            .and_then(parse_bool_flag)
            .unwrap_or(true);

        Ok(Self {
            api_url,
            student,
            bearer_token,
            token_path,
            data_dir,
            restore_history,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!(
                "Invalid STUDYCHAT_API_URL '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        if !is_local_endpoint_url(&self.api_url) && self.bearer_token.is_none() {
            bail!(
                "A bearer credential is required for non-local endpoints (url: '{}'). \
                 Set STUDYCHAT_ID_TOKEN or STUDYCHAT_TOKEN_FILE.",
                self.api_url
            );
        }

        Ok(())
    }

    /// Remove the stored credential after an unauthorized response. Drops the
    /// in-memory token and deletes the token file when one was configured.
    pub fn purge_stored_token(&mut self) {
        self.bearer_token = None;
        if let Some(path) = &self.token_path {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Prefer the env token; fall back to the first line of the token file.
fn load_bearer_token(token_path: Option<&std::path::Path>) -> Result<Option<String>> {
    if let Some(token) = std::env::var("STUDYCHAT_ID_TOKEN")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    {
        return Ok(Some(token));
    }

    let Some(path) = token_path else {
        return Ok(None);
    };
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents
            .lines()
            .next()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error.into()),
    }
}
