// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rectified-size policy — aspect-preserving output size for the page warp.

use pagewerk_core::{
    FailureCode, FailureStage, OrderedCorners, Outcome, PageDetectFailure, RectifiedSize,
    RectifySizeParams,
};
use tracing::{debug, info, warn};

const STAGE: FailureStage = FailureStage::RectifySize;

/// Pages more elongated than this are rejected.
const MAX_ASPECT_RATIO: f64 = 4.0;
/// Edges at or below this length make the quad degenerate.
const MIN_EDGE_PX: f64 = 1.0;
/// Slack for float drift when comparing the scaled side to the cap.
const SCALE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Default)]
pub struct RectifySizePolicy;

impl RectifySizePolicy {
    /// Compute the output size for `corners`.
    ///
    /// Width is the longer of the top and bottom edges, height the longer of
    /// the left and right edges. A single scale then fits both into
    /// `[min_side, max_side]`; the min-side floor may upscale. With
    /// `enforce_even`, odd sides are nudged up (or down if up would overflow).
    pub fn compute(corners: &OrderedCorners, params: &RectifySizeParams) -> Outcome<RectifiedSize> {
        if params.min_side == 0 || params.max_side < params.min_side || params.max_pixels == 0 {
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::Unknown,
                "invalid size bounds: max_side must be >= min_side > 0",
            ));
        }

        let raw_width = corners
            .top_left
            .distance(&corners.top_right)
            .max(corners.bottom_left.distance(&corners.bottom_right));
        let raw_height = corners
            .top_left
            .distance(&corners.bottom_left)
            .max(corners.top_right.distance(&corners.bottom_right));
        if !(raw_width > MIN_EDGE_PX && raw_height > MIN_EDGE_PX) {
            warn!(raw_width, raw_height, "Degenerate quad for rectification");
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::OrderDegenerate,
                "quad width or height too small",
            ));
        }

        let long = raw_width.max(raw_height);
        let short = raw_width.min(raw_height);
        let aspect = long / short;
        if !aspect.is_finite() || aspect > MAX_ASPECT_RATIO {
            warn!(aspect, "Aspect ratio out of range");
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::OrderDegenerate,
                format!("aspect ratio {aspect:.3} exceeds {MAX_ASPECT_RATIO}:1"),
            ));
        }

        let max_side = params.max_side as f64;
        let min_side = params.min_side as f64;
        let mut scale = 1.0;
        if long > max_side {
            scale = max_side / long;
        }
        if short * scale < min_side {
            scale = min_side / short;
        }
        if long * scale > max_side + SCALE_TOLERANCE {
            warn!(aspect, "No uniform scale satisfies both side bounds");
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::RectifiedTooLarge,
                "size bounds cannot be met with the aspect ratio preserved",
            ));
        }

        let mut width = ((raw_width * scale).round() as u32).max(1);
        let mut height = ((raw_height * scale).round() as u32).max(1);
        if params.enforce_even {
            width = nudge_even(width, params).ok_or_else(|| parity_failure("width"))?;
            height = nudge_even(height, params).ok_or_else(|| parity_failure("height"))?;
        }
        debug!(scale, width, height, "Rectified size rounded");

        let in_bounds = |side: u32| (params.min_side..=params.max_side).contains(&side);
        if !in_bounds(width) || !in_bounds(height) {
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::RectifiedTooLarge,
                format!("rounded size {width}x{height} outside bounds"),
            ));
        }
        if width as u64 * height as u64 > params.max_pixels {
            warn!(width, height, max_pixels = params.max_pixels, "Rectified size over pixel cap");
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::RectifiedTooLarge,
                format!("{width}x{height} exceeds {} pixels", params.max_pixels),
            ));
        }

        info!(width, height, "Rectified size computed");
        Ok(RectifiedSize { width, height })
    }
}

fn nudge_even(value: u32, params: &RectifySizeParams) -> Option<u32> {
    if value % 2 == 0 {
        return Some(value);
    }
    if value + 1 <= params.max_side {
        Some(value + 1)
    } else if value - 1 >= params.min_side {
        Some(value - 1)
    } else {
        None
    }
}

fn parity_failure(side: &str) -> PageDetectFailure {
    PageDetectFailure::new(
        STAGE,
        FailureCode::RectifiedTooLarge,
        format!("no even {side} fits the bounds"),
    )
}
