// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Loan Intake: MCP tools that turn loan documents into structured applicant records.
//!
//! Documents are analyzed by Azure Content Understanding (`analysis`), mapped onto a fixed record
//! shape (`extract`), and exposed as MCP tools (`mcp`) over stdio or a session-multiplexed HTTP
//! endpoint (`transport`).

pub mod analysis;
pub mod config;
pub mod extract;
pub mod mcp;
pub mod transport;
