// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-LoanIntake-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Loan Intake and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;
use std::process::Command;

/// OAuth scope for Azure AI services.
pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

/// Bearer credential for the analysis backend. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token provider unavailable: {0}")]
    Unavailable(String),
    #[error("token provider returned an empty token for scope {scope}")]
    Empty { scope: String },
}

/// Source of bearer tokens. Calls are synchronous and expected to be cheap compared to a job.
pub trait TokenProvider: Send + Sync {
    fn token(&self, scope: &str) -> Result<BearerToken, TokenError>;
}

/// Always hands out the same pre-issued token.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: BearerToken,
}

impl StaticTokenProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { token: BearerToken::new(secret) }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn token(&self, scope: &str) -> Result<BearerToken, TokenError> {
        if self.token.secret().is_empty() {
            return Err(TokenError::Empty { scope: scope.to_owned() });
        }
        Ok(self.token.clone())
    }
}

/// Asks the Azure CLI (`az account get-access-token`) for a token of the signed-in identity.
#[derive(Debug, Clone)]
pub struct AzureCliTokenProvider {
    program: String,
}

impl Default for AzureCliTokenProvider {
    fn default() -> Self {
        Self { program: "az".to_owned() }
    }
}

impl AzureCliTokenProvider {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

impl TokenProvider for AzureCliTokenProvider {
    fn token(&self, scope: &str) -> Result<BearerToken, TokenError> {
        let output = Command::new(&self.program)
            .args(["account", "get-access-token", "--scope", scope])
            .args(["--query", "accessToken", "--output", "tsv"])
            .output()
            .map_err(|err| TokenError::Unavailable(format!("cannot run {}: {err}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TokenError::Unavailable(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let secret = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if secret.is_empty() {
            return Err(TokenError::Empty { scope: scope.to_owned() });
        }
        Ok(BearerToken::new(secret))
    }
}
