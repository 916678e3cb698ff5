// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pagewerk — Core types, failure taxonomy, and parameter bundles shared across
// all crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    DecodeLimits, PageDetectParams, QuadSelectionConfig, RectifySizeParams, guardrails,
};
pub use error::{FailureCode, FailureStage, Outcome, PageDetectFailure};
pub use types::*;
