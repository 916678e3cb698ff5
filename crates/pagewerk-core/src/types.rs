// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Value types passed between page detection stages.
//
// Every value is created by exactly one stage and consumed by the next. Large
// pixel buffers (`Frame`, `EdgeMap`) are not serialized; everything a
// downstream writer needs is.

use serde::{Deserialize, Serialize};

/// A grayscale working frame produced by the preprocessor.
///
/// `gray.len()` must equal `width * height`; stages verify this before use.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row-major Rec.601 luma, one byte per pixel.
    pub gray: Vec<u8>,
    /// Dimensions of the upright image the frame was derived from.
    pub original_width: u32,
    pub original_height: u32,
    /// `original / frame` size ratio, always >= 1.0.
    pub downscale_factor: f64,
    /// EXIF rotation applied upstream: 0, 90, 180, or 270.
    pub rotation_applied_deg: u16,
}

impl Frame {
    /// Wrap a raw grayscale buffer with no recorded downscale or rotation.
    pub fn from_gray(width: u32, height: u32, gray: Vec<u8>) -> Self {
        Self {
            width,
            height,
            gray,
            original_width: width,
            original_height: height,
            downscale_factor: 1.0,
            rotation_applied_deg: 0,
        }
    }

    /// Whether the buffer length matches the declared dimensions.
    pub fn has_valid_buffer(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.gray.len() as u64 == self.width as u64 * self.height as u64
    }
}

/// Binary edge map: one byte per pixel, `1` for an edge and `0` otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeMap {
    pub width: u32,
    pub height: u32,
    pub edges: Vec<u8>,
}

impl EdgeMap {
    pub fn edge_count(&self) -> usize {
        self.edges.iter().filter(|&&flag| flag != 0).count()
    }

    #[inline]
    pub fn is_edge(&self, x: u32, y: u32) -> bool {
        self.edges[y as usize * self.width as usize + x as usize] != 0
    }
}

/// Integer pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box; `width` and `height` are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bbox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Bbox {
    /// Inclusive bounds of a point set.
    pub fn from_extents(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            x: min_x,
            y: min_y,
            width: (max_x - min_x + 1).max(1) as u32,
            height: (max_y - min_y + 1).max(1) as u32,
        }
    }

    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }
}

/// One connected edge component summarized by its convex hull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    /// Hull vertices in monotone-chain order.
    pub points: Vec<Point>,
    pub area: f64,
    pub perimeter: f64,
    /// Extents of the raw component pixels, not of the hull.
    pub bbox: Bbox,
}

/// A simplified four-point polygon that survived quad selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadCandidate {
    pub points: [Point; 4],
    pub contour_area: f64,
    pub score: f64,
}

/// Sub-pixel corner coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CornerPoint {
    pub x: f64,
    pub y: f64,
}

impl CornerPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance(&self, other: &CornerPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Clamp into `[0, width-1] x [0, height-1]`.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let max_x = width.saturating_sub(1) as f64;
        let max_y = height.saturating_sub(1) as f64;
        Self {
            x: self.x.clamp(0.0, max_x),
            y: self.y.clamp(0.0, max_y),
        }
    }
}

impl From<Point> for CornerPoint {
    fn from(point: Point) -> Self {
        Self::new(point.x as f64, point.y as f64)
    }
}

/// Page corners in canonical `[TL, TR, BR, BL]` order.
///
/// The polygon they form has strictly positive signed (shoelace) area in
/// image coordinates, i.e. it runs clockwise on screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderedCorners {
    pub top_left: CornerPoint,
    pub top_right: CornerPoint,
    pub bottom_right: CornerPoint,
    pub bottom_left: CornerPoint,
}

impl OrderedCorners {
    pub fn from_array(points: [CornerPoint; 4]) -> Self {
        Self {
            top_left: points[0],
            top_right: points[1],
            bottom_right: points[2],
            bottom_left: points[3],
        }
    }

    pub fn as_array(&self) -> [CornerPoint; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    /// Shoelace signed area; positive for the canonical winding.
    pub fn signed_area(&self) -> f64 {
        let points = self.as_array();
        let mut sum = 0.0;
        for i in 0..4 {
            let j = (i + 1) % 4;
            sum += points[i].x * points[j].y - points[j].x * points[i].y;
        }
        sum / 2.0
    }

    /// Scale every corner per axis, e.g. from frame space to upright space.
    pub fn scale(&self, scale_x: f64, scale_y: f64) -> Self {
        let scaled = self
            .as_array()
            .map(|p| CornerPoint::new(p.x * scale_x, p.y * scale_y));
        Self::from_array(scaled)
    }
}

/// Local search parameters for corner refinement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefineParams {
    /// Half-size of both the scoring window and the search window, in pixels.
    pub window_radius: u32,
    pub max_iters: u32,
    /// Stop once a round moves the corner less than this many pixels.
    pub epsilon: f64,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            window_radius: 6,
            max_iters: 6,
            epsilon: 0.25,
        }
    }
}

/// How corner refinement ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefineStatus {
    Refined,
    /// Refinement was disabled; corners are the ordered input.
    Skipped,
    /// Refinement failed in best-effort mode; corners are the ordered input.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefineResult {
    pub corners: OrderedCorners,
    /// Movement of each corner in `[TL, TR, BR, BL]` order, in pixels.
    pub deltas_px: [f64; 4],
    pub status: RefineStatus,
}

impl RefineResult {
    /// Pass the input corners through unchanged with the given status.
    pub fn unchanged(corners: OrderedCorners, status: RefineStatus) -> Self {
        Self {
            corners,
            deltas_px: [0.0; 4],
            status,
        }
    }
}

/// Target size of the perspective-corrected page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RectifiedSize {
    pub width: u32,
    pub height: u32,
}

/// What the bounded decoder did to produce the upright image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeInfo {
    pub original_width: u32,
    pub original_height: u32,
    /// Upright dimensions after subsampling and EXIF correction.
    pub decoded_width: u32,
    pub decoded_height: u32,
    /// Power-of-two subsampling factor.
    pub sample_size: u32,
    pub rotation_applied_deg: u16,
    pub max_pixels: u64,
    pub max_side: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> OrderedCorners {
        OrderedCorners::from_array([
            CornerPoint::new(0.0, 0.0),
            CornerPoint::new(10.0, 0.0),
            CornerPoint::new(10.0, 10.0),
            CornerPoint::new(0.0, 10.0),
        ])
    }

    #[test]
    fn canonical_winding_has_positive_area() {
        assert!((unit_square().signed_area() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn scale_is_per_axis() {
        let scaled = unit_square().scale(2.0, 0.5);
        assert_eq!(scaled.bottom_right, CornerPoint::new(20.0, 5.0));
        assert!((scaled.signed_area() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn clamp_keeps_points_inside_frame() {
        let clamped = CornerPoint::new(-3.5, 42.0).clamp_to(10, 20);
        assert_eq!(clamped, CornerPoint::new(0.0, 19.0));
    }

    #[test]
    fn bbox_from_extents_is_inclusive() {
        let bbox = Bbox::from_extents(2, 3, 2, 9);
        assert_eq!((bbox.width, bbox.height), (1, 7));
        assert_eq!(bbox.area(), 7.0);
    }

    #[test]
    fn frame_buffer_validation() {
        let frame = Frame::from_gray(4, 3, vec![0; 12]);
        assert!(frame.has_valid_buffer());
        let short = Frame::from_gray(4, 3, vec![0; 11]);
        assert!(!short.has_valid_buffer());
        let empty = Frame::from_gray(0, 3, Vec::new());
        assert!(!empty.has_valid_buffer());
    }
}
