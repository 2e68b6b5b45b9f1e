// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorization inputs and outcomes.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AuthError;

/// One ranked classification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Candidate {
    pub label: String,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
}

impl Candidate {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionReason {
    /// Caller holds the required role
    RoleGranted,
    /// Caller lacks the required role
    MissingRole,
    /// A candidate above threshold maps to a role the caller holds
    CandidateMatched,
    /// Caller holds the administrative override role
    AdminOverride,
    /// No candidate satisfied both threshold and role
    NoMatchingCandidate,
    /// Candidate list was empty
    NoCandidates,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::RoleGranted => "role-granted",
            DecisionReason::MissingRole => "missing-role",
            DecisionReason::CandidateMatched => "candidate-matched",
            DecisionReason::AdminOverride => "admin-override",
            DecisionReason::NoMatchingCandidate => "no-matching-candidate",
            DecisionReason::NoCandidates => "no-candidates",
        }
    }
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an authorization check. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AuthorizationDecision {
    allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    matched_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    matched_role: Option<String>,
    reason: DecisionReason,
    /// Role that satisfies the check: the required role for a role check,
    /// the top candidate's role for a ranked check.
    #[serde(skip_serializing_if = "Option::is_none")]
    required_role: Option<String>,
    /// Candidates considered by a ranked check, in the order given
    #[serde(skip_serializing_if = "Vec::is_empty")]
    candidates: Vec<Candidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    threshold: Option<f64>,
}

impl AuthorizationDecision {
    pub(crate) fn role_check(allowed: bool, required_role: String) -> Self {
        Self {
            allowed,
            matched_label: None,
            matched_role: allowed.then(|| required_role.clone()),
            reason: if allowed {
                DecisionReason::RoleGranted
            } else {
                DecisionReason::MissingRole
            },
            required_role: Some(required_role),
            candidates: Vec::new(),
            threshold: None,
        }
    }

    pub(crate) fn ranked(
        reason: DecisionReason,
        matched: Option<(String, String)>,
        required_role: Option<String>,
        candidates: Vec<Candidate>,
        threshold: f64,
    ) -> Self {
        let allowed = matches!(
            reason,
            DecisionReason::CandidateMatched | DecisionReason::AdminOverride
        );
        let (matched_label, matched_role) = matched.unzip();
        Self {
            allowed,
            matched_label,
            matched_role,
            reason,
            required_role,
            candidates,
            threshold: Some(threshold),
        }
    }

    pub fn allowed(&self) -> bool {
        self.allowed
    }

    pub fn matched_label(&self) -> Option<&str> {
        self.matched_label.as_deref()
    }

    pub fn matched_role(&self) -> Option<&str> {
        self.matched_role.as_deref()
    }

    pub fn reason(&self) -> DecisionReason {
        self.reason
    }

    pub fn required_role(&self) -> Option<&str> {
        self.required_role.as_deref()
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    /// `Ok` when allowed, otherwise the error an HTTP layer should render.
    pub fn into_result(self) -> Result<Self, AuthError> {
        if self.allowed {
            return Ok(self);
        }
        match self.reason {
            DecisionReason::NoCandidates => Err(AuthError::NoCandidates),
            _ => Err(AuthError::Forbidden(Denial::from(self))),
        }
    }
}

/// Client-facing detail of a denied decision.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Denial {
    pub message: String,
    pub reason: DecisionReason,
    pub required_role: Option<String>,
    pub candidates: Vec<Candidate>,
}

impl From<AuthorizationDecision> for Denial {
    fn from(decision: AuthorizationDecision) -> Self {
        let required = decision.required_role.as_deref().unwrap_or("unknown");
        let message = match (decision.reason, decision.threshold) {
            (DecisionReason::NoMatchingCandidate, Some(threshold)) => format!(
                "No candidate among the top {} with confidence >= {threshold:.2} matches one of your roles. Typically required: {required}.",
                decision.candidates.len()
            ),
            (DecisionReason::NoCandidates, _) => AuthError::NoCandidates.to_string(),
            _ => format!("Missing required role(s): {required}"),
        };
        Self {
            message,
            reason: decision.reason,
            required_role: decision.required_role,
            candidates: decision.candidates,
        }
    }
}
