// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Preprocessor — deterministic downscale-to-budget plus Rec.601 integer luma.

use image::DynamicImage;
use image::imageops::{self, FilterType};
use pagewerk_core::{FailureCode, FailureStage, Frame, Outcome, PageDetectFailure};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::geometry::scratch;

const STAGE: FailureStage = FailureStage::Preprocess;

/// Aspect-preserving target dimensions and the actual downscale factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
    pub downscale_factor: f64,
}

/// Converts an upright image into a grayscale detection [`Frame`].
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    max_side: u32,
}

impl Preprocessor {
    pub fn new(max_side: u32) -> Self {
        Self { max_side }
    }

    /// Downscale `upright` so its longest side fits `max_side`, then convert
    /// to luma. `rotation_applied_deg` is carried through from the decoder.
    #[instrument(skip(self, upright), fields(width = upright.width(), height = upright.height()))]
    pub fn preprocess(&self, upright: &DynamicImage, rotation_applied_deg: u16) -> Outcome<Frame> {
        let (original_width, original_height) = (upright.width(), upright.height());
        let target = compute_target_size(original_width, original_height, self.max_side)?;

        let rgb = upright.to_rgb8();
        let scaled = if target.width == original_width && target.height == original_height {
            rgb
        } else {
            debug!(
                target_width = target.width,
                target_height = target.height,
                "Resampling to detection budget"
            );
            imageops::resize(&rgb, target.width, target.height, FilterType::Triangle)
        };

        let mut gray = scratch(target.width as usize * target.height as usize, 0u8, STAGE)?;
        for (dst, px) in gray.iter_mut().zip(scaled.pixels()) {
            *dst = rec601_luma(px.0[0], px.0[1], px.0[2]);
        }

        info!(
            frame_width = target.width,
            frame_height = target.height,
            downscale_factor = target.downscale_factor,
            "Frame prepared"
        );

        Ok(Frame {
            width: target.width,
            height: target.height,
            gray,
            original_width,
            original_height,
            downscale_factor: target.downscale_factor,
            rotation_applied_deg,
        })
    }
}

/// `(77 R + 150 G + 29 B) >> 8`, integer only.
#[inline]
pub fn rec601_luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

/// Compute the detection frame size for an `original_width x original_height`
/// image.
///
/// Within budget the size is unchanged and the factor is exactly 1.0.
/// Otherwise each side is scaled by `max_side / longest`, floored (min 1), and
/// the factor is recomputed from the floored longest side so that corner
/// coordinates map back exactly.
pub fn compute_target_size(
    original_width: u32,
    original_height: u32,
    max_side: u32,
) -> Outcome<TargetSize> {
    if original_width == 0 || original_height == 0 {
        return Err(PageDetectFailure::new(
            STAGE,
            FailureCode::Unknown,
            "invalid source size",
        ));
    }
    if max_side == 0 {
        return Err(PageDetectFailure::new(
            STAGE,
            FailureCode::Unknown,
            "max_side must be > 0",
        ));
    }
    let original_max = original_width.max(original_height);
    if original_max <= max_side {
        return Ok(TargetSize {
            width: original_width,
            height: original_height,
            downscale_factor: 1.0,
        });
    }
    let ratio = max_side as f64 / original_max as f64;
    let width = ((original_width as f64 * ratio).floor() as u32).max(1);
    let height = ((original_height as f64 * ratio).floor() as u32).max(1);
    let downscale_factor = original_max as f64 / width.max(height) as f64;
    Ok(TargetSize {
        width,
        height,
        downscale_factor,
    })
}
