use std::time::Duration;

use docdesk_core::{DeskClient, DeskError};

use crate::sync::engine::EngineSettings;
use crate::sync::retry::ConflictRetry;
use crate::sync::upload::UploadSettings;

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api/";
const DEFAULT_PAGE_SIZE: u64 = 100;
const DEFAULT_UPLOAD_CONCURRENCY: u64 = 4;
const DEFAULT_CONFLICT_RETRIES: u64 = 2;
const DEFAULT_CONFLICT_RETRY_MS: u64 = 200;
const DEFAULT_HISTORY_LIMIT: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeskConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub page_size: u32,
    pub upload_concurrency: usize,
    pub conflict_retry_attempts: u32,
    pub conflict_retry_delay: Duration,
    pub history_limit: usize,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            page_size: DEFAULT_PAGE_SIZE as u32,
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY as usize,
            conflict_retry_attempts: DEFAULT_CONFLICT_RETRIES as u32,
            conflict_retry_delay: Duration::from_millis(DEFAULT_CONFLICT_RETRY_MS),
            history_limit: DEFAULT_HISTORY_LIMIT as usize,
        }
    }
}

impl DeskConfig {
    pub fn from_env() -> Self {
        let api_url = std::env::var("DOCDESK_API_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let token = std::env::var("DOCDESK_TOKEN")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let page_size = read_u64_env("DOCDESK_PAGE_SIZE", DEFAULT_PAGE_SIZE).min(u32::MAX as u64);
        let upload_concurrency =
            read_u64_env("DOCDESK_UPLOAD_CONCURRENCY", DEFAULT_UPLOAD_CONCURRENCY);
        let conflict_retry_attempts =
            read_u64_env("DOCDESK_CONFLICT_RETRIES", DEFAULT_CONFLICT_RETRIES).min(u32::MAX as u64);
        let conflict_retry_delay = Duration::from_millis(read_u64_env(
            "DOCDESK_CONFLICT_RETRY_MS",
            DEFAULT_CONFLICT_RETRY_MS,
        ));
        let history_limit = read_u64_env("DOCDESK_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT);

        Self {
            api_url,
            token,
            page_size: page_size as u32,
            upload_concurrency: upload_concurrency as usize,
            conflict_retry_attempts: conflict_retry_attempts as u32,
            conflict_retry_delay,
            history_limit: history_limit as usize,
        }
    }

    pub fn client(&self) -> Result<DeskClient, DeskError> {
        let client = DeskClient::new(&self.api_url)?;
        Ok(match &self.token {
            Some(token) => client.with_token(token.clone()),
            None => client,
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            page_size: self.page_size,
            retry: ConflictRetry::new(self.conflict_retry_attempts, self.conflict_retry_delay),
        }
    }

    pub fn upload_settings(&self) -> UploadSettings {
        UploadSettings {
            concurrency: self.upload_concurrency,
        }
    }
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
