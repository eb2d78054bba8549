// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Model Context Protocol (MCP) server surface.
//!
//! The MCP layer exposes the document tools; transports decide how conversations reach it.

pub mod dispatch;
mod server;
mod types;

pub use dispatch::{ContentBlock, Dispatcher, ToolError};
pub use server::{LoanMcp, SESSION_CLOSED_CODE};
pub(crate) use server::{session_closed_error, tool_error_result};
pub use types::DocumentArguments;
