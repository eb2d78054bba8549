// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

// Shared deterministic benchmark fixtures (no RNG).

use std::collections::BTreeMap;

use loan_intake::analysis::model::{AnalysisResult, ContentSection, KeyValuePair};
use loan_intake::extract::ExtractedRecord;

#[derive(Debug, Clone, Copy)]
pub enum Case {
    /// One-page application: only the fields of interest.
    Small,
    /// Multi-page form with unrelated evidence mixed in.
    MediumNoisy,
    /// Large scanned packet; long markdown and thousands of pairs.
    LargePacket,
}

impl Case {
    pub fn id(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::MediumNoisy => "medium_noisy",
            Self::LargePacket => "large_packet",
        }
    }

    fn noise_pairs(self) -> usize {
        match self {
            Self::Small => 0,
            Self::MediumNoisy => 200,
            Self::LargePacket => 5_000,
        }
    }

    fn markdown_lines(self) -> usize {
        match self {
            Self::Small => 20,
            Self::MediumNoisy => 400,
            Self::LargePacket => 10_000,
        }
    }
}

pub const ALL_CASES: [Case; 3] = [Case::Small, Case::MediumNoisy, Case::LargePacket];

pub fn document(case: Case) -> AnalysisResult {
    let mut pairs = Vec::with_capacity(case.noise_pairs() + 8);
    for idx in 0..case.noise_pairs() {
        pairs.push(KeyValuePair::new(format!("Schedule Line {idx}"), format!("{}", idx * 17)));
    }
    pairs.extend([
        KeyValuePair::new("Borrower Name", "Alex Example"),
        KeyValuePair::new("SSN", "123-45-6789"),
        KeyValuePair::new("Annual Salary", "$123,456.78"),
        KeyValuePair::new("Employment", "Full-time"),
        KeyValuePair::new("Current Employer", "Fabrikam Inc"),
        KeyValuePair::new("Loan Amount", "$350,000"),
        KeyValuePair::new("Purpose of Loan", "Refinance"),
        KeyValuePair::new("Property Address", "42 Elm Street, Riverton"),
    ]);

    let markdown = (0..case.markdown_lines())
        .map(|line| format!("| Line {line} | Amount {} | Note: ümlaut – dash |", line * 3))
        .collect::<Vec<_>>()
        .join("\n");

    let mut fields = BTreeMap::new();
    for (idx, name) in ["BorrowerName", "LoanAmount", "PropertyAddress"].into_iter().enumerate() {
        fields.insert(
            name.to_owned(),
            serde_json::json!({ "type": "string", "confidence": 0.7 + idx as f64 / 10.0 }),
        );
    }

    AnalysisResult { contents: vec![ContentSection { markdown, fields, key_value_pairs: pairs }] }
}

/// Cheap digest so the optimizer cannot drop the extraction.
pub fn checksum(record: &ExtractedRecord) -> u64 {
    let text_len = [
        record.applicant_name.as_deref(),
        record.employer_name.as_deref(),
        record.property_address.as_deref(),
        record.raw_markdown.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::len)
    .sum::<usize>() as u64;
    let amount = record.loan_amount_requested.unwrap_or_default() as u64;
    text_len.wrapping_mul(31).wrapping_add(amount)
}
