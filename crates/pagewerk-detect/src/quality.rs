// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Capture-quality metrics and the pass/warn/fail gate built on them.
//
// Skew and exposure are measured in detection-frame space. Blur is measured on
// whatever grayscale buffer the caller supplies (normally the rectified page).

use pagewerk_core::{CornerPoint, Frame, OrderedCorners};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Luma at or below this counts as a clipped shadow.
pub const SHADOW_CLIP_THRESHOLD: u8 = 8;
/// Luma at or above this counts as a clipped highlight.
pub const HIGHLIGHT_CLIP_THRESHOLD: u8 = 247;

const MIN_EDGE: f64 = 1e-6;

// -- Metrics ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricStatus {
    Ok,
    Degenerate,
}

/// Perspective distortion of the detected page quad.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkewMetrics {
    /// Largest |interior angle - 90°| over the four corners.
    pub angle_max_abs_deg: f64,
    pub angle_mean_abs_deg: f64,
    /// max(top/bottom, bottom/top) edge length.
    pub keystone_width_ratio: f64,
    /// max(left/right, right/left) edge length.
    pub keystone_height_ratio: f64,
    /// Quad area over image area.
    pub page_fill_ratio: f64,
    pub status: MetricStatus,
}

impl SkewMetrics {
    fn degenerate() -> Self {
        Self {
            angle_max_abs_deg: 0.0,
            angle_mean_abs_deg: 0.0,
            keystone_width_ratio: 1.0,
            keystone_height_ratio: 1.0,
            page_fill_ratio: 0.0,
            status: MetricStatus::Degenerate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExposureMetrics {
    pub mean_luma: f64,
    pub clip_low_pct: f64,
    pub clip_high_pct: f64,
}

/// Skew metrics for `corners` inside an `image_width x image_height` image.
pub fn skew_from_quad(
    corners: &OrderedCorners,
    image_width: u32,
    image_height: u32,
) -> SkewMetrics {
    let image_area = image_width as f64 * image_height as f64;
    let [tl, tr, br, bl] = corners.as_array();
    let top = tl.distance(&tr);
    let bottom = bl.distance(&br);
    let left = tl.distance(&bl);
    let right = tr.distance(&br);
    let quad_area = corners.signed_area().abs();

    let deviations = [
        angle_deviation(bl, tl, tr),
        angle_deviation(tl, tr, br),
        angle_deviation(tr, br, bl),
        angle_deviation(br, bl, tl),
    ];
    let degenerate = image_area <= 0.0
        || quad_area <= 0.0
        || [top, bottom, left, right].iter().any(|&side| side <= MIN_EDGE)
        || deviations.iter().any(Option::is_none);
    if degenerate {
        return SkewMetrics::degenerate();
    }

    let deviations: Vec<f64> = deviations.into_iter().flatten().collect();
    let angle_max_abs_deg = deviations.iter().copied().fold(0.0, f64::max);
    let angle_mean_abs_deg = deviations.iter().sum::<f64>() / deviations.len() as f64;

    SkewMetrics {
        angle_max_abs_deg,
        angle_mean_abs_deg,
        keystone_width_ratio: symmetric_ratio(top, bottom),
        keystone_height_ratio: symmetric_ratio(left, right),
        page_fill_ratio: quad_area / image_area,
        status: MetricStatus::Ok,
    }
}

/// Mean luma and clipped-pixel percentages of a frame.
pub fn exposure(frame: &Frame) -> ExposureMetrics {
    let total = frame.gray.len();
    if total == 0 {
        return ExposureMetrics {
            mean_luma: 0.0,
            clip_low_pct: 0.0,
            clip_high_pct: 0.0,
        };
    }
    let mut sum = 0u64;
    let mut low = 0usize;
    let mut high = 0usize;
    for &luma in &frame.gray {
        sum += luma as u64;
        if luma <= SHADOW_CLIP_THRESHOLD {
            low += 1;
        }
        if luma >= HIGHLIGHT_CLIP_THRESHOLD {
            high += 1;
        }
    }
    ExposureMetrics {
        mean_luma: sum as f64 / total as f64,
        clip_low_pct: low as f64 * 100.0 / total as f64,
        clip_high_pct: high as f64 * 100.0 / total as f64,
    }
}

/// Variance of the 4-neighbour Laplacian over interior pixels. Sharper images
/// score higher; 0 for images smaller than 3x3 or mismatched buffers.
pub fn blur_variance_laplacian(gray: &[u8], width: u32, height: u32) -> f64 {
    let (w, h) = (width as usize, height as usize);
    if w < 3 || h < 3 || gray.len() != w * h {
        return 0.0;
    }
    let mut sum = 0i64;
    let mut sum_sq = 0i64;
    let mut count = 0i64;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let idx = y * w + x;
            let lap = gray[idx - w] as i64 + gray[idx + w] as i64 + gray[idx - 1] as i64
                + gray[idx + 1] as i64
                - 4 * gray[idx] as i64;
            sum += lap;
            sum_sq += lap * lap;
            count += 1;
        }
    }
    let mean = sum as f64 / count as f64;
    let variance = sum_sq as f64 / count as f64 - mean * mean;
    if variance.is_finite() {
        variance.max(0.0)
    } else {
        0.0
    }
}

fn symmetric_ratio(a: f64, b: f64) -> f64 {
    if a <= 0.0 || b <= 0.0 {
        return 1.0;
    }
    (a / b).max(b / a)
}

/// |angle(prev, center, next) - 90°| in degrees.
fn angle_deviation(prev: CornerPoint, center: CornerPoint, next: CornerPoint) -> Option<f64> {
    let (v1x, v1y) = (prev.x - center.x, prev.y - center.y);
    let (v2x, v2y) = (next.x - center.x, next.y - center.y);
    let len1 = v1x.hypot(v1y);
    let len2 = v2x.hypot(v2y);
    if len1 <= MIN_EDGE || len2 <= MIN_EDGE {
        return None;
    }
    let cos = ((v1x * v2x + v1y * v2y) / (len1 * len2)).clamp(-1.0, 1.0);
    Some((cos.acos().to_degrees() - 90.0).abs())
}

// -- Gate ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityDecision {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityReasonCode {
    BlurTooHigh,
    BlurWarn,
    ExposureTooDark,
    ExposureTooBright,
    ClipShadowsHigh,
    ClipHighlightsHigh,
    KeystoneWidthHigh,
    KeystoneHeightHigh,
    AngleDeviationHigh,
    PageFillLow,
    DegenerateQuad,
}

impl QualityReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BlurTooHigh => "BLUR_TOO_HIGH",
            Self::BlurWarn => "BLUR_WARN",
            Self::ExposureTooDark => "EXPOSURE_TOO_DARK",
            Self::ExposureTooBright => "EXPOSURE_TOO_BRIGHT",
            Self::ClipShadowsHigh => "CLIP_SHADOWS_HIGH",
            Self::ClipHighlightsHigh => "CLIP_HIGHLIGHTS_HIGH",
            Self::KeystoneWidthHigh => "KEYSTONE_WIDTH_HIGH",
            Self::KeystoneHeightHigh => "KEYSTONE_HEIGHT_HIGH",
            Self::AngleDeviationHigh => "ANGLE_DEVIATION_HIGH",
            Self::PageFillLow => "PAGE_FILL_LOW",
            Self::DegenerateQuad => "DEGENERATE_QUAD",
        }
    }

    /// Short human hint for a capture UI.
    pub fn hint(self) -> &'static str {
        match self {
            Self::BlurTooHigh => "blurry",
            Self::BlurWarn => "slightly blurry",
            Self::ExposureTooDark => "too dark",
            Self::ExposureTooBright => "too bright",
            Self::ClipShadowsHigh => "shadows clipped",
            Self::ClipHighlightsHigh => "highlights clipped",
            Self::KeystoneWidthHigh => "keystone width",
            Self::KeystoneHeightHigh => "keystone height",
            Self::AngleDeviationHigh => "angle deviation",
            Self::PageFillLow => "page fill low",
            Self::DegenerateQuad => "degenerate quad",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Fail,
    Warn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReason {
    pub code: QualityReasonCode,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub decision: QualityDecision,
    /// Failures first, then warnings, each group sorted by code name.
    pub reasons: Vec<QualityReason>,
}

/// Thresholds for [`QualityGate::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityGateParams {
    pub blur_fail_min: f64,
    pub blur_warn_min: f64,
    pub mean_luma_low_fail: f64,
    pub mean_luma_high_fail: f64,
    pub clip_low_fail_pct: f64,
    pub clip_high_fail_pct: f64,
    pub keystone_fail_ratio: f64,
    pub keystone_warn_ratio: f64,
    pub angle_fail_deg: f64,
    pub angle_warn_deg: f64,
    pub page_fill_fail_min: f64,
    pub page_fill_warn_min: f64,
}

impl Default for QualityGateParams {
    fn default() -> Self {
        Self {
            blur_fail_min: 80.0,
            blur_warn_min: 140.0,
            mean_luma_low_fail: 60.0,
            mean_luma_high_fail: 200.0,
            clip_low_fail_pct: 18.0,
            clip_high_fail_pct: 18.0,
            keystone_fail_ratio: 1.35,
            keystone_warn_ratio: 1.18,
            angle_fail_deg: 10.0,
            angle_warn_deg: 6.0,
            page_fill_fail_min: 0.45,
            page_fill_warn_min: 0.62,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QualityGate {
    params: QualityGateParams,
}

impl QualityGate {
    pub fn new(params: QualityGateParams) -> Self {
        Self { params }
    }

    /// Judge a capture. `blur` is optional because it needs the rectified
    /// page, which not every caller produces.
    pub fn evaluate(
        &self,
        blur: Option<f64>,
        exposure: &ExposureMetrics,
        skew: &SkewMetrics,
    ) -> QualityVerdict {
        use QualityReasonCode as Code;
        let p = &self.params;
        let mut reasons = Vec::new();
        let mut push = |code, severity| reasons.push(QualityReason { code, severity });

        if skew.status == MetricStatus::Degenerate {
            push(Code::DegenerateQuad, Severity::Fail);
        }
        if let Some(blur) = blur {
            if blur < p.blur_fail_min {
                push(Code::BlurTooHigh, Severity::Fail);
            } else if blur < p.blur_warn_min {
                push(Code::BlurWarn, Severity::Warn);
            }
        }
        if exposure.mean_luma < p.mean_luma_low_fail {
            push(Code::ExposureTooDark, Severity::Fail);
        }
        if exposure.mean_luma > p.mean_luma_high_fail {
            push(Code::ExposureTooBright, Severity::Fail);
        }
        if exposure.clip_low_pct > p.clip_low_fail_pct {
            push(Code::ClipShadowsHigh, Severity::Fail);
        }
        if exposure.clip_high_pct > p.clip_high_fail_pct {
            push(Code::ClipHighlightsHigh, Severity::Fail);
        }

        if skew.status == MetricStatus::Ok {
            let above = |value: f64, fail: f64, warn: f64| {
                if value > fail {
                    Some(Severity::Fail)
                } else if value > warn {
                    Some(Severity::Warn)
                } else {
                    None
                }
            };
            let checks = [
                (
                    Code::KeystoneWidthHigh,
                    above(skew.keystone_width_ratio, p.keystone_fail_ratio, p.keystone_warn_ratio),
                ),
                (
                    Code::KeystoneHeightHigh,
                    above(skew.keystone_height_ratio, p.keystone_fail_ratio, p.keystone_warn_ratio),
                ),
                (
                    Code::AngleDeviationHigh,
                    above(skew.angle_max_abs_deg, p.angle_fail_deg, p.angle_warn_deg),
                ),
                (
                    Code::PageFillLow,
                    if skew.page_fill_ratio < p.page_fill_fail_min {
                        Some(Severity::Fail)
                    } else if skew.page_fill_ratio < p.page_fill_warn_min {
                        Some(Severity::Warn)
                    } else {
                        None
                    },
                ),
            ];
            for (code, severity) in checks {
                if let Some(severity) = severity {
                    push(code, severity);
                }
            }
        }

        reasons.sort_by(|a, b| {
            let rank = |s: Severity| matches!(s, Severity::Warn) as u8;
            rank(a.severity)
                .cmp(&rank(b.severity))
                .then_with(|| a.code.as_str().cmp(b.code.as_str()))
        });
        let decision = if reasons.iter().any(|r| r.severity == Severity::Fail) {
            QualityDecision::Fail
        } else if reasons.is_empty() {
            QualityDecision::Pass
        } else {
            QualityDecision::Warn
        };
        debug!(?decision, reasons = reasons.len(), "Quality evaluated");
        QualityVerdict { decision, reasons }
    }
}
