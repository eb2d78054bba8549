// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Session-aware transport: many concurrent MCP conversations over one HTTP endpoint.

pub mod http;
mod resolve;
mod rest;
pub mod sessions;

pub use http::{
    serve, HttpTransport, HEALTH_PATH, MCP_PATH, SESSION_HEADER, TOOLS_CALL_PATH, TOOLS_PATH,
};
pub use rest::ToolCall;
pub use sessions::{LoanSessionManager, SessionMode};
