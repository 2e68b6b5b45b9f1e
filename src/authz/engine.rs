// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Allow/deny decisions over a caller's [`RoleSet`].
//!
//! ## Modes
//!
//! - **Role check**: allowed iff the caller holds the required role.
//! - **Ranked check**: scan classifier candidates in the order given and allow
//!   on the first one that is at or above the confidence threshold *and* whose
//!   derived role (`label + suffix`) the caller holds. Candidates below the
//!   threshold are skipped whatever the caller's roles; role mismatches move
//!   the scan on to the next candidate. The list is never re-sorted.
//!
//! Holding the admin-override role allows any non-empty ranked check.

use tracing::debug;

use super::decision::{AuthorizationDecision, Candidate, DecisionReason};
use crate::auth::RoleSet;

/// Default minimum confidence for a candidate to count.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.40;

/// Default suffix turning a label into its role (`cat` -> `cat-access`).
pub const DEFAULT_ROLE_SUFFIX: &str = "-access";

/// Default administrative override role.
pub const DEFAULT_ADMIN_ROLE: &str = "admin";

/// Authorization policy: admin role, threshold, suffix and optional top-k cap.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationEngine {
    admin_role: String,
    threshold: f64,
    role_suffix: String,
    top_k: Option<usize>,
}

impl Default for AuthorizationEngine {
    fn default() -> Self {
        Self::new(DEFAULT_ADMIN_ROLE)
    }
}

impl AuthorizationEngine {
    pub fn new(admin_role: impl Into<String>) -> Self {
        Self {
            admin_role: admin_role.into(),
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            role_suffix: DEFAULT_ROLE_SUFFIX.to_string(),
            top_k: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_role_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.role_suffix = suffix.into();
        self
    }

    /// Only consider the first `top_k` candidates of a ranked check.
    pub fn with_top_k(mut self, top_k: Option<usize>) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn admin_role(&self) -> &str {
        &self.admin_role
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn role_suffix(&self) -> &str {
        &self.role_suffix
    }

    pub fn top_k(&self) -> Option<usize> {
        self.top_k
    }

    /// Role that grants access to `label`.
    pub fn role_for_label(&self, label: &str) -> String {
        format!("{label}{}", self.role_suffix)
    }

    /// Allowed iff `roles` contains `required`.
    pub fn authorize(&self, roles: &RoleSet, required: &str) -> AuthorizationDecision {
        let decision = AuthorizationDecision::role_check(roles.contains(required), required.to_string());
        debug!(allowed = decision.allowed(), reason = %decision.reason(), required, "Role check");
        decision
    }

    /// Allowed iff `roles` contains at least one of `required`.
    ///
    /// On success the matched role is the first held one in `required` order;
    /// on denial all required roles are reported.
    pub fn authorize_any(&self, roles: &RoleSet, required: &[&str]) -> AuthorizationDecision {
        match required.iter().find(|role| roles.contains(role)) {
            Some(held) => self.authorize(roles, held),
            None => {
                let mut needed: Vec<&str> = required.to_vec();
                needed.sort_unstable();
                let decision = AuthorizationDecision::role_check(false, needed.join(", "));
                debug!(
                    allowed = false,
                    reason = %decision.reason(),
                    required = decision.required_role(),
                    "Role check"
                );
                decision
            }
        }
    }

    /// Role check for the role derived from `label`.
    pub fn authorize_label(&self, roles: &RoleSet, label: &str) -> AuthorizationDecision {
        self.authorize(roles, &self.role_for_label(label))
    }

    /// Ranked check with the configured threshold and suffix.
    pub fn authorize_ranked(&self, roles: &RoleSet, candidates: &[Candidate]) -> AuthorizationDecision {
        self.authorize_ranked_with(roles, candidates, self.threshold, &self.role_suffix)
    }

    /// Ranked check with an explicit threshold and suffix.
    pub fn authorize_ranked_with(
        &self,
        roles: &RoleSet,
        candidates: &[Candidate],
        threshold: f64,
        role_suffix: &str,
    ) -> AuthorizationDecision {
        let considered = match self.top_k {
            Some(k) => &candidates[..k.min(candidates.len())],
            None => candidates,
        };

        let Some(top) = considered.first() else {
            debug!(reason = %DecisionReason::NoCandidates, "Ranked check");
            return AuthorizationDecision::ranked(
                DecisionReason::NoCandidates,
                None,
                None,
                Vec::new(),
                threshold,
            );
        };
        let top_role = format!("{}{role_suffix}", top.label);

        let (reason, matched) = if roles.contains(&self.admin_role) {
            (
                DecisionReason::AdminOverride,
                Some((top.label.clone(), self.admin_role.clone())),
            )
        } else {
            let matched = considered
                .iter()
                .filter(|candidate| candidate.confidence >= threshold)
                .map(|candidate| (candidate, format!("{}{role_suffix}", candidate.label)))
                .find(|(_, role)| roles.contains(role))
                .map(|(candidate, role)| (candidate.label.clone(), role));
            match matched {
                Some(matched) => (DecisionReason::CandidateMatched, Some(matched)),
                None => (DecisionReason::NoMatchingCandidate, None),
            }
        };

        let decision = AuthorizationDecision::ranked(
            reason,
            matched,
            Some(top_role),
            considered.to_vec(),
            threshold,
        );
        debug!(
            allowed = decision.allowed(),
            reason = %decision.reason(),
            matched_label = decision.matched_label(),
            "Ranked check"
        );
        decision
    }
}
