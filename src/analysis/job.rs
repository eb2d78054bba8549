// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Analysis job engine.
//!
//! A job walks `Submitted → Polling → {Succeeded | Failed | Canceled | TimedOut}`. Polling uses a
//! fixed attempt budget with a fixed delay before every attempt, so the worst-case wall-clock
//! time of a job is `max_attempts * interval` plus request latency. There is no backoff and no
//! retry outside the poll loop.
//!
//! The bearer token is fetched once per run and reused for every poll.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::backend::{AnalysisBackend, BackendError, OperationHandle};
use super::model::{AnalysisResult, OperationState};
use super::token::{TokenError, TokenProvider, COGNITIVE_SERVICES_SCOPE};

pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_POLL_ATTEMPTS, interval: DEFAULT_POLL_INTERVAL }
    }
}

impl PollPolicy {
    pub fn ceiling(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Submitted,
    Polling,
    Succeeded,
    Failed,
    Canceled,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Submitted | Self::Polling)
    }
}

/// One submission to the analysis backend. Lives for a single tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisJob {
    document_url: String,
    operation: Option<OperationHandle>,
    state: JobState,
    attempts: u32,
    result: Option<AnalysisResult>,
}

impl AnalysisJob {
    fn submitted(document_url: &str) -> Self {
        Self {
            document_url: document_url.to_owned(),
            operation: None,
            state: JobState::Submitted,
            attempts: 0,
            result: None,
        }
    }

    pub fn document_url(&self) -> &str {
        &self.document_url
    }

    pub fn operation(&self) -> Option<&OperationHandle> {
        self.operation.as_ref()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    pub fn into_result(self) -> Option<AnalysisResult> {
        self.result
    }

    fn transition(&mut self, next: JobState) {
        tracing::debug!(
            document_url = %self.document_url,
            from = ?self.state,
            to = ?next,
            attempts = self.attempts,
            "analysis job transition"
        );
        self.state = next;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("cannot obtain backend credentials: {0}")]
    Token(#[from] TokenError),
    #[error("analysis backend rejected the credentials (HTTP {status}): {message}")]
    BackendAuth { status: u16, message: String },
    #[error("analysis backend protocol error: {0}")]
    BackendProtocol(String),
    #[error("analysis backend unreachable: {0}")]
    Transport(String),
    #[error("analysis failed with status: {status}")]
    AnalysisFailed { status: String },
    #[error("document analysis timed out after {attempts} poll attempts")]
    AnalysisTimeout { attempts: u32 },
    #[error("analysis aborted before completion")]
    Aborted,
}

impl From<BackendError> for JobError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Auth { status, body } => Self::BackendAuth { status, message: body },
            BackendError::Status { status, body } => {
                Self::BackendProtocol(format!("unexpected HTTP {status}: {body}"))
            }
            BackendError::Protocol(message) => Self::BackendProtocol(message),
            BackendError::Transport(err) => Self::Transport(err.to_string()),
        }
    }
}

/// Runs analysis jobs against an injected backend and token provider.
#[derive(Clone)]
pub struct JobEngine {
    backend: Arc<dyn AnalysisBackend>,
    tokens: Arc<dyn TokenProvider>,
    policy: PollPolicy,
}

impl JobEngine {
    pub fn new(backend: Arc<dyn AnalysisBackend>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self { backend, tokens, policy: PollPolicy::default() }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Submits `document_url` and polls until the job reaches a terminal state.
    ///
    /// Returns the `Succeeded` job; every other terminal state is reported as an error. Firing
    /// `cancel` drops the in-flight request or delay and returns [`JobError::Aborted`].
    pub async fn run(
        &self,
        document_url: &str,
        cancel: &CancellationToken,
    ) -> Result<AnalysisJob, JobError> {
        let mut job = AnalysisJob::submitted(document_url);

        let token = abortable(cancel, self.fetch_token()).await??;
        let handle = abortable(cancel, self.backend.submit(document_url, &token)).await??;
        let Some(handle) = handle else {
            return Err(JobError::BackendProtocol(
                "backend accepted the analysis without an Operation-Location".to_owned(),
            ));
        };
        tracing::info!(%document_url, operation = handle.as_str(), "analysis submitted");
        job.operation = Some(handle.clone());
        job.transition(JobState::Polling);

        for attempt in 1..=self.policy.max_attempts {
            abortable(cancel, tokio::time::sleep(self.policy.interval)).await?;
            job.attempts = attempt;

            let status = abortable(cancel, self.backend.poll(&handle, &token)).await??;
            match status.state() {
                OperationState::Succeeded => {
                    let Some(result) = status.result else {
                        return Err(JobError::BackendProtocol(
                            "operation succeeded without a result".to_owned(),
                        ));
                    };
                    job.result = Some(result);
                    job.transition(JobState::Succeeded);
                    tracing::info!(%document_url, attempts = attempt, "analysis succeeded");
                    return Ok(job);
                }
                state if state.is_terminal_failure() => {
                    job.transition(if state == OperationState::Failed {
                        JobState::Failed
                    } else {
                        JobState::Canceled
                    });
                    tracing::warn!(%document_url, status = %state, "analysis failed");
                    return Err(JobError::AnalysisFailed { status: state.to_string() });
                }
                state => {
                    tracing::trace!(%document_url, attempt, status = %state, "analysis pending");
                }
            }
        }

        job.transition(JobState::TimedOut);
        tracing::warn!(%document_url, attempts = job.attempts, "analysis timed out");
        Err(JobError::AnalysisTimeout { attempts: job.attempts })
    }

    async fn fetch_token(&self) -> Result<super::token::BearerToken, JobError> {
        let tokens = Arc::clone(&self.tokens);
        let token = tokio::task::spawn_blocking(move || tokens.token(COGNITIVE_SERVICES_SCOPE))
            .await
            .map_err(|err| TokenError::Unavailable(format!("token task failed: {err}")))??;
        Ok(token)
    }
}

async fn abortable<T>(
    cancel: &CancellationToken,
    work: impl std::future::Future<Output = T>,
) -> Result<T, JobError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(JobError::Aborted),
        output = work => Ok(output),
    }
}
