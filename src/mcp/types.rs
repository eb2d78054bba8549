// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::borrow::Cow;

use schemars::{json_schema, JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};

use super::dispatch::JsonObject;

/// Raw arguments of a document tool.
///
/// Kept as a JSON object so that a missing or malformed `document_url` reaches the dispatcher and
/// comes back as a tool error instead of a protocol-level `invalid_params`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentArguments(pub JsonObject);

impl DocumentArguments {
    pub fn as_object(&self) -> &JsonObject {
        &self.0
    }
}

impl JsonSchema for DocumentArguments {
    fn schema_name() -> Cow<'static, str> {
        "DocumentArguments".into()
    }

    fn json_schema(_generator: &mut SchemaGenerator) -> Schema {
        json_schema!({
            "type": "object",
            "properties": {
                "document_url": {
                    "type": "string",
                    "format": "uri",
                    "description": "Absolute http(s) URL of the loan document to analyze."
                }
            },
            "required": ["document_url"]
        })
    }
}
