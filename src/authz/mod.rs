// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role-based authorization over ranked classifier output.

pub mod decision;
pub mod engine;

pub use decision::{AuthorizationDecision, Candidate, DecisionReason, Denial};
pub use engine::AuthorizationEngine;
