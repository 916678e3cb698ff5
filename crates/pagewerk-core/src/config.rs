// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page detection parameters and hard resource guardrails.

use serde::{Deserialize, Serialize};

use crate::types::RefineParams;

/// Platform guardrails. Caller limits are always clamped by these; raising a
/// caller limit can never exceed them.
pub mod guardrails {
    /// Longest side of a decoded (upright) image.
    pub const MAX_DECODE_SIDE: u32 = 8192;
    /// Pixel count of a decoded (upright) image.
    pub const MAX_DECODE_PIXELS: u64 = 40_000_000;
    /// Allocation budget handed to the image decoder.
    pub const MAX_DECODE_ALLOC_BYTES: u64 = 512 * 1024 * 1024;
    /// Longest side of the rectified output.
    pub const MAX_RECTIFIED_SIDE: u32 = 4096;
    /// Pixel count of the rectified output.
    pub const MAX_RECTIFIED_PIXELS: u64 = 16_777_216;
}

/// Effective size caps for the bounded decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeLimits {
    pub max_side: u32,
    pub max_pixels: u64,
}

/// Polygon simplification and scoring knobs for quad selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadSelectionConfig {
    /// Minimum quad area as a fraction of the frame area.
    pub min_area_fraction: f64,
    /// Ramer–Douglas–Peucker epsilon as a fraction of the hull perimeter.
    pub approx_epsilon_ratio: f64,
    /// Aspect ratio above which the aspect score starts to fall off.
    pub max_aspect_ratio: f64,
}

impl Default for QuadSelectionConfig {
    fn default() -> Self {
        Self {
            min_area_fraction: 0.15,
            approx_epsilon_ratio: 0.02,
            max_aspect_ratio: 4.0,
        }
    }
}

/// Bounds for the rectified output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RectifySizeParams {
    pub max_side: u32,
    pub min_side: u32,
    pub enforce_even: bool,
    pub max_pixels: u64,
}

/// Full parameter bundle for one page detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageDetectParams {
    /// Longest side of the detection frame; also caps the decode.
    pub max_side: u32,
    /// Pixel cap for the decode.
    pub max_pixels: u64,
    /// Caller's decode side cap (clamped by the guardrail).
    pub max_decode_side: u32,
    /// Caller's decode pixel cap (clamped by the guardrail).
    pub max_decode_pixels: u64,
    pub edge_low_threshold: u32,
    pub edge_high_threshold: u32,
    /// Edge components with fewer pixels are discarded as noise.
    pub min_contour_points: usize,
    pub quad: QuadSelectionConfig,
    /// `None` disables refinement.
    pub refine: Option<RefineParams>,
    /// Continue with unrefined corners when refinement fails.
    pub refine_best_effort: bool,
    pub min_side: u32,
    pub max_rectified_side: u32,
    pub max_rectified_pixels: u64,
    pub enforce_even: bool,
    /// Wall-clock budget for the whole run, checked between stages.
    pub time_budget_ms: Option<u64>,
}

impl Default for PageDetectParams {
    fn default() -> Self {
        Self {
            max_side: 1024,
            max_pixels: 4_194_304,
            max_decode_side: guardrails::MAX_DECODE_SIDE,
            max_decode_pixels: guardrails::MAX_DECODE_PIXELS,
            edge_low_threshold: 60,
            edge_high_threshold: 180,
            min_contour_points: 20,
            quad: QuadSelectionConfig::default(),
            refine: Some(RefineParams::default()),
            refine_best_effort: false,
            min_side: 256,
            max_rectified_side: 2048,
            max_rectified_pixels: guardrails::MAX_RECTIFIED_PIXELS,
            enforce_even: true,
            time_budget_ms: None,
        }
    }
}

impl PageDetectParams {
    /// Decode caps: the minimum of caller intent and the platform guardrails.
    pub fn effective_decode_limits(&self) -> DecodeLimits {
        DecodeLimits {
            max_side: self
                .max_side
                .min(self.max_decode_side)
                .min(guardrails::MAX_DECODE_SIDE),
            max_pixels: self
                .max_pixels
                .min(self.max_decode_pixels)
                .min(guardrails::MAX_DECODE_PIXELS),
        }
    }

    /// Rectified-size bounds clamped by the platform guardrails.
    pub fn effective_rectify_params(&self) -> RectifySizeParams {
        RectifySizeParams {
            max_side: self.max_rectified_side.min(guardrails::MAX_RECTIFIED_SIDE),
            min_side: self.min_side,
            enforce_even: self.enforce_even,
            max_pixels: self
                .max_rectified_pixels
                .min(guardrails::MAX_RECTIFIED_PIXELS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_limits_honor_caller_max_side() {
        let params = PageDetectParams {
            max_side: 512,
            max_decode_side: 8000,
            ..Default::default()
        };
        assert_eq!(params.effective_decode_limits().max_side, 512);
    }

    #[test]
    fn decode_limits_honor_stricter_decode_side() {
        let params = PageDetectParams {
            max_side: 1024,
            max_decode_side: 512,
            ..Default::default()
        };
        assert_eq!(params.effective_decode_limits().max_side, 512);
    }

    #[test]
    fn decode_limits_cannot_exceed_guardrails() {
        let params = PageDetectParams {
            max_side: 12_000,
            max_decode_side: 50_000,
            max_pixels: u64::MAX,
            max_decode_pixels: u64::MAX,
            ..Default::default()
        };
        let limits = params.effective_decode_limits();
        assert_eq!(limits.max_side, guardrails::MAX_DECODE_SIDE);
        assert_eq!(limits.max_pixels, guardrails::MAX_DECODE_PIXELS);
    }

    #[test]
    fn decode_limits_honor_caller_max_pixels() {
        let params = PageDetectParams {
            max_pixels: 1_000_000,
            ..Default::default()
        };
        assert_eq!(params.effective_decode_limits().max_pixels, 1_000_000);
    }

    #[test]
    fn rectify_params_are_clamped() {
        let params = PageDetectParams {
            max_rectified_side: 100_000,
            max_rectified_pixels: u64::MAX,
            ..Default::default()
        };
        let rectify = params.effective_rectify_params();
        assert_eq!(rectify.max_side, guardrails::MAX_RECTIFIED_SIDE);
        assert_eq!(rectify.max_pixels, guardrails::MAX_RECTIFIED_PIXELS);
        assert!(rectify.enforce_even);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let params: PageDetectParams =
            serde_json::from_str(r#"{"max_side": 640, "refine": null}"#).unwrap();
        assert_eq!(params.max_side, 640);
        assert!(params.refine.is_none());
        assert_eq!(params.edge_high_threshold, 180);
        assert_eq!(params.quad, QuadSelectionConfig::default());
    }
}
