// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stage-tagged failure taxonomy for page detection.
//
// Stage and code names are a stable contract consumed by downstream writers
// and UI. Do not rename, reorder, or reuse them for different semantics.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stage that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureStage {
    Preprocess,
    Edges,
    Contours,
    QuadSelect,
    Order,
    Refine,
    LoadUpright,
    RectifySize,
}

impl FailureStage {
    /// Stable wire name of the stage.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureStage::Preprocess => "PREPROCESS",
            FailureStage::Edges => "EDGES",
            FailureStage::Contours => "CONTOURS",
            FailureStage::QuadSelect => "QUAD_SELECT",
            FailureStage::Order => "ORDER",
            FailureStage::Refine => "REFINE",
            FailureStage::LoadUpright => "LOAD_UPRIGHT",
            FailureStage::RectifySize => "RECTIFY_SIZE",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    /// Raw image decode failed or the bounds could not be read.
    DecodeFailed,
    /// Decoded (upright) image still exceeds the size caps.
    InputTooLarge,
    /// An allocation would exceed the memory guardrails.
    OomRisk,
    /// EXIF orientation read failed.
    ExifFailed,
    /// Edge detection failed.
    EdgesFailed,
    /// Contour extraction produced no usable contours.
    ContoursEmpty,
    /// No contours were available for quad selection.
    PageNotFound,
    /// No convex quad could be formed from the contours.
    NoConvexQuad,
    /// Convex quads exist but all fall below the area threshold.
    QuadTooSmall,
    /// Ordering received a point list that is not four distinct points.
    OrderNotFourPoints,
    /// Degenerate or invalid geometry.
    OrderDegenerate,
    /// Corner refinement failed.
    RefineFailed,
    /// Rectified output size cannot satisfy the configured caps.
    RectifiedTooLarge,
    /// The caller's time budget ran out before a stage started.
    TimeBudgetExceeded,
    /// Unknown or unclassified failure.
    Unknown,
}

impl FailureCode {
    /// Stable wire name of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureCode::DecodeFailed => "DECODE_FAILED",
            FailureCode::InputTooLarge => "INPUT_TOO_LARGE",
            FailureCode::OomRisk => "OOM_RISK",
            FailureCode::ExifFailed => "EXIF_FAILED",
            FailureCode::EdgesFailed => "EDGES_FAILED",
            FailureCode::ContoursEmpty => "CONTOURS_EMPTY",
            FailureCode::PageNotFound => "PAGE_NOT_FOUND",
            FailureCode::NoConvexQuad => "NO_CONVEX_QUAD",
            FailureCode::QuadTooSmall => "QUAD_TOO_SMALL",
            FailureCode::OrderNotFourPoints => "ORDER_NOT_FOUR_POINTS",
            FailureCode::OrderDegenerate => "ORDER_DEGENERATE",
            FailureCode::RefineFailed => "REFINE_FAILED",
            FailureCode::RectifiedTooLarge => "RECTIFIED_TOO_LARGE",
            FailureCode::TimeBudgetExceeded => "TIME_BUDGET_EXCEEDED",
            FailureCode::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal failure of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{stage} failed with {code}{}", message_suffix(.message))]
pub struct PageDetectFailure {
    pub stage: FailureStage,
    pub code: FailureCode,
    pub message: Option<String>,
}

impl PageDetectFailure {
    pub fn new(stage: FailureStage, code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            stage,
            code,
            message: Some(message.into()),
        }
    }

    /// A failure with no diagnostic message.
    pub fn bare(stage: FailureStage, code: FailureCode) -> Self {
        Self {
            stage,
            code,
            message: None,
        }
    }
}

fn message_suffix(message: &Option<String>) -> String {
    match message {
        Some(text) => format!(": {text}"),
        None => String::new(),
    }
}

/// Tagged stage outcome: `Ok` on success, a stage-tagged failure otherwise.
pub type Outcome<T> = std::result::Result<T, PageDetectFailure>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_stage_code_and_message() {
        let failure = PageDetectFailure::new(
            FailureStage::QuadSelect,
            FailureCode::NoConvexQuad,
            "nothing simplified to four points",
        );
        assert_eq!(
            failure.to_string(),
            "QUAD_SELECT failed with NO_CONVEX_QUAD: nothing simplified to four points"
        );
    }

    #[test]
    fn display_without_message() {
        let failure = PageDetectFailure::bare(FailureStage::Refine, FailureCode::RefineFailed);
        assert_eq!(failure.to_string(), "REFINE failed with REFINE_FAILED");
    }

    #[test]
    fn serde_names_match_display_names() {
        let json = serde_json::to_string(&PageDetectFailure::bare(
            FailureStage::LoadUpright,
            FailureCode::OomRisk,
        ))
        .unwrap();
        assert!(json.contains("\"LOAD_UPRIGHT\""), "{json}");
        assert!(json.contains("\"OOM_RISK\""), "{json}");

        for code in [
            FailureCode::OrderNotFourPoints,
            FailureCode::TimeBudgetExceeded,
            FailureCode::RectifiedTooLarge,
        ] {
            let encoded = serde_json::to_string(&code).unwrap();
            assert_eq!(encoded, format!("\"{}\"", code.as_str()));
        }
    }
}
