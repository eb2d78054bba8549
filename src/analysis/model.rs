// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Wire model of the document-analysis backend.
//!
//! Only the parts the extraction pipeline reads are modelled; everything else in the backend
//! payload is ignored during deserialization.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Body returned when polling an analysis operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub result: Option<AnalysisResult>,
}

impl OperationStatus {
    pub fn state(&self) -> OperationState {
        OperationState::parse(&self.status)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub contents: Vec<ContentSection>,
}

impl AnalysisResult {
    pub fn first_section(&self) -> Option<&ContentSection> {
        self.contents.first()
    }
}

/// One analysed section (page group, document part) of the input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSection {
    #[serde(default)]
    pub markdown: String,
    /// Structured fields keyed by field name. Values stay untyped; only `confidence` is read.
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub key_value_pairs: Vec<KeyValuePair>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyValuePair {
    #[serde(default)]
    pub key: Option<EvidenceText>,
    #[serde(default)]
    pub value: Option<EvidenceText>,
}

impl KeyValuePair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: Some(EvidenceText { content: key.into() }),
            value: Some(EvidenceText { content: value.into() }),
        }
    }

    pub fn key_text(&self) -> &str {
        self.key.as_ref().map(|text| text.content.as_str()).unwrap_or("")
    }

    pub fn value_text(&self) -> &str {
        self.value.as_ref().map(|text| text.content.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceText {
    #[serde(default)]
    pub content: String,
}

/// Interpreted `status` of an analysis operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Unrecognized(String),
}

impl OperationState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "NotStarted" => Self::NotStarted,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            "Canceled" => Self::Canceled,
            other => Self::Unrecognized(other.to_owned()),
        }
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => f.write_str("NotStarted"),
            Self::Running => f.write_str("Running"),
            Self::Succeeded => f.write_str("Succeeded"),
            Self::Failed => f.write_str("Failed"),
            Self::Canceled => f.write_str("Canceled"),
            Self::Unrecognized(raw) => f.write_str(raw),
        }
    }
}
