// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Loan field extraction.
//!
//! Maps a raw analysis result onto an [`ExtractedRecord`]. The mapping is pure and total: a field
//! the document does not provide (or provides in an unparseable form) is simply absent.
//!
//! Fields are resolved through [`FIELD_SYNONYMS`], an ordered table of candidate evidence keys.
//! The first candidate present in the evidence decides the field; later candidates are never
//! consulted, even if the winning value fails to parse.
//!
//! Only the first content section of a result is read. Multi-section documents lose everything
//! after the first section.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::analysis::model::{AnalysisResult, ContentSection, KeyValuePair};

/// Maximum number of characters of document text kept on a record.
pub const RAW_TEXT_LIMIT: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoanField {
    ApplicantName,
    SsnLast4,
    AnnualIncome,
    EmploymentStatus,
    EmployerName,
    LoanAmountRequested,
    LoanPurpose,
    PropertyAddress,
}

/// Candidate evidence keys per field, highest priority first. Keys are already normalized.
pub const FIELD_SYNONYMS: &[(LoanField, &[&str])] = &[
    (
        LoanField::ApplicantName,
        &["applicant name", "borrower name", "name", "full name", "applicant"],
    ),
    (LoanField::SsnLast4, &["ssn", "social security", "social security number", "ssn (last 4)"]),
    (
        LoanField::AnnualIncome,
        &["annual income", "yearly income", "income", "gross income", "annual salary"],
    ),
    (LoanField::EmploymentStatus, &["employment status", "employment", "work status"]),
    (LoanField::EmployerName, &["employer", "employer name", "company", "current employer"]),
    (
        LoanField::LoanAmountRequested,
        &["loan amount", "amount requested", "requested amount", "loan amount requested"],
    ),
    (LoanField::LoanPurpose, &["loan purpose", "purpose", "purpose of loan", "loan type"]),
    (
        LoanField::PropertyAddress,
        &["property address", "address", "property", "subject property"],
    ),
];

pub fn synonyms_for(field: LoanField) -> &'static [&'static str] {
    FIELD_SYNONYMS
        .iter()
        .find(|(candidate, _)| *candidate == field)
        .map(|(_, keys)| *keys)
        .unwrap_or(&[])
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    /// Full name of the loan applicant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicant_name: Option<String>,
    /// Last four digits of the applicant's SSN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssn_last_4: Option<String>,
    /// Annual income in USD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annual_income: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employment_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employer_name: Option<String>,
    /// Requested loan amount in USD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loan_amount_requested: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loan_purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_address: Option<String>,
    /// Mean confidence reported by the backend for its structured fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    /// Document text, truncated to [`RAW_TEXT_LIMIT`] characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_markdown: Option<String>,
}

impl ExtractedRecord {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Normalized key/value evidence of one content section.
///
/// Built once per result. When two pairs normalize to the same key, the later pair wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvidenceLookup {
    entries: HashMap<String, String>,
}

impl EvidenceLookup {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = &'a KeyValuePair>) -> Self {
        let mut entries = HashMap::new();
        for pair in pairs {
            let key = normalize_key(pair.key_text());
            let value = pair.value_text();
            if key.is_empty() || value.is_empty() {
                continue;
            }
            entries.insert(key, value.to_owned());
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&normalize_key(key)).map(String::as_str)
    }

    /// Value of the first candidate key present, in candidate order.
    pub fn first_hit(&self, candidates: &[&str]) -> Option<&str> {
        candidates.iter().find_map(|key| self.entries.get(*key)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn extract(result: &AnalysisResult) -> ExtractedRecord {
    let Some(section) = result.first_section() else {
        return ExtractedRecord::default();
    };

    let lookup = EvidenceLookup::from_pairs(&section.key_value_pairs);
    let text = |field| lookup.first_hit(synonyms_for(field)).map(str::to_owned);
    let amount = |field| lookup.first_hit(synonyms_for(field)).and_then(parse_amount);

    ExtractedRecord {
        applicant_name: text(LoanField::ApplicantName),
        ssn_last_4: lookup.first_hit(synonyms_for(LoanField::SsnLast4)).and_then(ssn_last_4),
        annual_income: amount(LoanField::AnnualIncome),
        employment_status: text(LoanField::EmploymentStatus),
        employer_name: text(LoanField::EmployerName),
        loan_amount_requested: amount(LoanField::LoanAmountRequested),
        loan_purpose: text(LoanField::LoanPurpose),
        property_address: text(LoanField::PropertyAddress),
        confidence_score: mean_confidence(section),
        raw_markdown: truncated_markdown(section),
    }
}

fn amount_noise() -> &'static Regex {
    static NOISE: OnceLock<Regex> = OnceLock::new();
    NOISE.get_or_init(|| Regex::new(r"[,\p{Sc}]").expect("valid amount noise pattern"))
}

/// Parses a money amount such as `"$1,250,000.00"`. Non-finite results are rejected.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned = amount_noise().replace_all(raw, "");
    let value = cleaned.trim().parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

pub fn ssn_last_4(raw: &str) -> Option<String> {
    let digits = raw.chars().filter(char::is_ascii_digit).collect::<Vec<_>>();
    if digits.len() < 4 {
        return None;
    }
    Some(digits[digits.len() - 4..].iter().collect())
}

fn mean_confidence(section: &ContentSection) -> Option<f64> {
    let confidences = section
        .fields
        .values()
        .filter_map(|field| field.get("confidence").and_then(serde_json::Value::as_f64))
        .collect::<Vec<_>>();
    if confidences.is_empty() {
        return None;
    }
    Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
}

fn truncated_markdown(section: &ContentSection) -> Option<String> {
    if section.markdown.is_empty() {
        return None;
    }
    Some(truncate_chars(&section.markdown, RAW_TEXT_LIMIT).to_owned())
}

pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
