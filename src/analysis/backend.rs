// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Document-analysis backend seam and its Azure Content Understanding implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};

use super::model::OperationStatus;
use super::token::BearerToken;

pub const DEFAULT_ANALYZER_ID: &str = "prebuilt-document";
pub const DEFAULT_API_VERSION: &str = "2025-11-01";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const OPERATION_LOCATION_HEADER: &str = "operation-location";
const ERROR_BODY_LIMIT: usize = 512;

/// Backend-issued reference to a running analysis (the `Operation-Location` URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationHandle(String);

impl OperationHandle {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("analysis backend rejected the credentials (HTTP {status}): {body}")]
    Auth { status: u16, body: String },
    #[error("analysis backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed analysis backend response: {0}")]
    Protocol(String),
    #[error("analysis backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Starts an analysis. `Ok(None)` means the backend accepted the request without telling
    /// us where to poll.
    async fn submit(
        &self,
        document_url: &str,
        token: &BearerToken,
    ) -> Result<Option<OperationHandle>, BackendError>;

    async fn poll(
        &self,
        handle: &OperationHandle,
        token: &BearerToken,
    ) -> Result<OperationStatus, BackendError>;
}

/// HTTP client for the Content Understanding `analyze` API.
#[derive(Debug, Clone)]
pub struct ContentUnderstandingClient {
    http: reqwest::Client,
    endpoint: String,
    analyzer_id: String,
    api_version: String,
}

impl ContentUnderstandingClient {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_owned(),
            analyzer_id: DEFAULT_ANALYZER_ID.to_owned(),
            api_version: DEFAULT_API_VERSION.to_owned(),
        })
    }

    pub fn with_analyzer_id(mut self, analyzer_id: impl Into<String>) -> Self {
        self.analyzer_id = analyzer_id.into();
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn analyze_url(&self) -> String {
        format!("{}/contentunderstanding/analyzers/{}:analyze", self.endpoint, self.analyzer_id)
    }
}

#[async_trait]
impl AnalysisBackend for ContentUnderstandingClient {
    async fn submit(
        &self,
        document_url: &str,
        token: &BearerToken,
    ) -> Result<Option<OperationHandle>, BackendError> {
        tracing::debug!(url = %self.analyze_url(), "submitting analysis");
        let response = self
            .http
            .post(self.analyze_url())
            .bearer_auth(token.secret())
            .query(&[("api-version", self.api_version.as_str())])
            .json(&serde_json::json!({ "inputs": [{ "url": document_url }] }))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(operation_location(response.headers()))
    }

    async fn poll(
        &self,
        handle: &OperationHandle,
        token: &BearerToken,
    ) -> Result<OperationStatus, BackendError> {
        let response = self.http.get(handle.as_str()).bearer_auth(token.secret()).send().await?;
        let response = ensure_success(response).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|err| BackendError::Protocol(format!("cannot decode operation status: {err}")))
    }
}

fn operation_location(headers: &HeaderMap) -> Option<OperationHandle> {
    headers
        .get(OPERATION_LOCATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(OperationHandle::new)
}

async fn ensure_success(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body = crate::extract::truncate_chars(body.trim(), ERROR_BODY_LIMIT).to_owned();
    tracing::warn!(status = status.as_u16(), %body, "analysis backend error");
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        Err(BackendError::Auth { status: status.as_u16(), body })
    } else {
        Err(BackendError::Status { status: status.as_u16(), body })
    }
}
