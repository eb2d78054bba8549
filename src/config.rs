// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Server configuration from built-in defaults and the process environment.
//!
//! Field names are the environment variable names, lowercased (`MCP_PORT` → `mcp_port`).

use std::time::Duration;

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::analysis::backend::{DEFAULT_ANALYZER_ID, DEFAULT_API_VERSION, DEFAULT_REQUEST_TIMEOUT};
use crate::analysis::job::{DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL};
use crate::analysis::PollPolicy;
use crate::transport::SessionMode;

/// Idle sessions are closed after this long unless configured otherwise.
pub const DEFAULT_SESSION_KEEP_ALIVE: Duration = Duration::from_secs(30 * 60);

/// Endpoint used when none is configured. Tools fail at call time; health stays live.
pub const PLACEHOLDER_ENDPOINT: &str = "https://placeholder.cognitiveservices.azure.com";

const ENV_KEYS: &[&str] = &[
    "MCP_HOST",
    "MCP_PORT",
    "MCP_STATELESS",
    "MCP_SESSION_KEEP_ALIVE_SECS",
    "AZURE_AI_SERVICES_ENDPOINT",
    "AZURE_AI_SERVICES_TOKEN",
    "CONTENT_UNDERSTANDING_ANALYZER",
    "CONTENT_UNDERSTANDING_API_VERSION",
    "ANALYSIS_POLL_ATTEMPTS",
    "ANALYSIS_POLL_INTERVAL_MS",
    "ANALYSIS_REQUEST_TIMEOUT_SECS",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),
    #[error("{key} must be {requirement}")]
    OutOfRange { key: &'static str, requirement: &'static str },
    #[error("AZURE_AI_SERVICES_ENDPOINT is not an http(s) URL: {0}")]
    Endpoint(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub mcp_host: String,
    pub mcp_port: u16,
    pub mcp_stateless: bool,
    /// Idle timeout for stateful sessions in seconds; `0` keeps sessions until deleted.
    pub mcp_session_keep_alive_secs: u64,
    pub azure_ai_services_endpoint: Option<String>,
    pub azure_ai_services_token: Option<String>,
    pub content_understanding_analyzer: String,
    pub content_understanding_api_version: String,
    pub analysis_poll_attempts: u32,
    pub analysis_poll_interval_ms: u64,
    pub analysis_request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mcp_host: "127.0.0.1".to_owned(),
            mcp_port: 8000,
            mcp_stateless: false,
            mcp_session_keep_alive_secs: DEFAULT_SESSION_KEEP_ALIVE.as_secs(),
            azure_ai_services_endpoint: None,
            azure_ai_services_token: None,
            content_understanding_analyzer: DEFAULT_ANALYZER_ID.to_owned(),
            content_understanding_api_version: DEFAULT_API_VERSION.to_owned(),
            analysis_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            analysis_poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            analysis_request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl ServerConfig {
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(ServerConfig::default()))
            .merge(Env::raw().only(ENV_KEYS))
    }

    /// Loads defaults overridden by the environment, then validates the result.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment())
    }

    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(Box::new)?;
        config.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.analysis_poll_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                key: "ANALYSIS_POLL_ATTEMPTS",
                requirement: "at least 1",
            });
        }
        if self.analysis_request_timeout_secs == 0 {
            return Err(ConfigError::OutOfRange {
                key: "ANALYSIS_REQUEST_TIMEOUT_SECS",
                requirement: "at least 1",
            });
        }
        if let Some(keep_alive) = self.session_keep_alive() {
            // The idle timer does not see a tool call in progress.
            let longest_job = self.poll_policy().interval * self.analysis_poll_attempts;
            if keep_alive <= longest_job {
                return Err(ConfigError::OutOfRange {
                    key: "MCP_SESSION_KEEP_ALIVE_SECS",
                    requirement: "0 or longer than ANALYSIS_POLL_ATTEMPTS x ANALYSIS_POLL_INTERVAL_MS",
                });
            }
        }
        if self.content_understanding_analyzer.trim().is_empty() {
            return Err(ConfigError::OutOfRange {
                key: "CONTENT_UNDERSTANDING_ANALYZER",
                requirement: "non-empty",
            });
        }
        if let Some(endpoint) = self.endpoint() {
            let parsed =
                reqwest::Url::parse(endpoint).map_err(|err| ConfigError::Endpoint(err.to_string()))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::Endpoint(endpoint.to_owned()));
            }
        }
        Ok(self)
    }

    /// Configured endpoint, ignoring blank values.
    pub fn endpoint(&self) -> Option<&str> {
        non_blank(self.azure_ai_services_endpoint.as_deref())
    }

    pub fn static_token(&self) -> Option<&str> {
        non_blank(self.azure_ai_services_token.as_deref())
    }

    pub fn endpoint_or_placeholder(&self) -> &str {
        self.endpoint().unwrap_or(PLACEHOLDER_ENDPOINT)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            max_attempts: self.analysis_poll_attempts,
            interval: Duration::from_millis(self.analysis_poll_interval_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_request_timeout_secs)
    }

    pub fn session_mode(&self) -> SessionMode {
        SessionMode::from_stateless_flag(self.mcp_stateless)
    }

    pub fn session_keep_alive(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.mcp_session_keep_alive_secs)).filter(|d| !d.is_zero())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
