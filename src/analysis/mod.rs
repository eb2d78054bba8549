// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Document analysis: backend client, credentials, and the polling job engine.

pub mod backend;
pub mod job;
pub mod model;
pub mod token;


pub use backend::{AnalysisBackend, BackendError, ContentUnderstandingClient, OperationHandle};
pub use job::{AnalysisJob, JobEngine, JobError, JobState, PollPolicy};
pub use model::{AnalysisResult, ContentSection, KeyValuePair, OperationStatus};
pub use token::{AzureCliTokenProvider, BearerToken, StaticTokenProvider, TokenError, TokenProvider};
