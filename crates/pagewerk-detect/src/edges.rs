// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Deterministic Canny-style edge detector:
//
// 1. 5x5 Gaussian blur (integer kernel normalized by 159, border-clamped)
// 2. Sobel 3x3 gradients, magnitude = sqrt(gx^2 + gy^2)
// 3. Non-maximum suppression over four orientation classes
// 4. Double-threshold hysteresis with 8-connected promotion
//
// Everything except the magnitude is integer arithmetic, and the magnitude is
// a single correctly-rounded sqrt per pixel, so identical frames always give
// byte-identical edge maps.

use pagewerk_core::{EdgeMap, FailureCode, FailureStage, Frame, Outcome, PageDetectFailure};
use tracing::{debug, instrument, warn};

use crate::boundary::catch_panic;
use crate::geometry::scratch;

const STAGE: FailureStage = FailureStage::Edges;

#[rustfmt::skip]
const GAUSSIAN_5X5: [i32; 25] = [
    2,  4,  5,  4, 2,
    4,  9, 12,  9, 4,
    5, 12, 15, 12, 5,
    4,  9, 12,  9, 4,
    2,  4,  5,  4, 2,
];
const GAUSSIAN_SUM: i32 = 159;

const TAN_22_5: f64 = 0.414_213_562_373_095_1;
const TAN_67_5: f64 = 2.414_213_562_373_095;

/// Hysteresis pixel states.
const WEAK: u8 = 1;
const STRONG: u8 = 2;

/// Gradient orientation class, each covering ±22.5°.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
    Deg0,
    Deg45,
    Deg90,
    Deg135,
}

/// Binary edge detector with fixed hysteresis thresholds.
#[derive(Debug, Clone, Copy)]
pub struct EdgeDetector {
    low_threshold: u32,
    high_threshold: u32,
}

impl Default for EdgeDetector {
    fn default() -> Self {
        Self::new(60, 180)
    }
}

impl EdgeDetector {
    pub fn new(low_threshold: u32, high_threshold: u32) -> Self {
        Self {
            low_threshold,
            high_threshold,
        }
    }

    /// Compute the binary edge map of `frame`.
    #[instrument(skip_all, fields(width = frame.width, height = frame.height))]
    pub fn detect(&self, frame: &Frame) -> Outcome<EdgeMap> {
        if frame.width == 0 || frame.height == 0 {
            warn!("Edge detection on empty frame");
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::EdgesFailed,
                "frame size must be > 0",
            ));
        }
        if !frame.has_valid_buffer() {
            warn!(len = frame.gray.len(), "Grayscale buffer size mismatch");
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::EdgesFailed,
                "invalid grayscale buffer size",
            ));
        }
        catch_panic(STAGE, FailureCode::EdgesFailed, || self.run(frame))
    }

    fn run(&self, frame: &Frame) -> Outcome<EdgeMap> {
        let width = frame.width as usize;
        let height = frame.height as usize;

        let blurred = gaussian_blur_5x5(&frame.gray, width, height)?;
        let gradients = sobel(&blurred, width, height)?;
        let suppressed = non_max_suppression(&gradients, width, height)?;
        let edges = self.hysteresis(&suppressed, width, height)?;

        let edge_map = EdgeMap {
            width: frame.width,
            height: frame.height,
            edges,
        };
        debug!(edge_pixels = edge_map.edge_count(), "Edge map computed");
        Ok(edge_map)
    }

    fn hysteresis(&self, suppressed: &[f64], width: usize, height: usize) -> Outcome<Vec<u8>> {
        let size = width * height;
        let high = self.high_threshold as f64;
        let low = self.low_threshold as f64;

        let mut state = scratch(size, 0u8, STAGE)?;
        let mut stack = scratch(size, 0usize, STAGE)?;
        let mut top = 0usize;

        for (i, &value) in suppressed.iter().enumerate() {
            if value >= high {
                state[i] = STRONG;
                stack[top] = i;
                top += 1;
            } else if value >= low {
                state[i] = WEAK;
            }
        }

        // Each pixel is pushed at most once (WEAK -> STRONG happens once), so
        // the stack never exceeds `size`.
        while top > 0 {
            top -= 1;
            let idx = stack[top];
            let x = idx % width;
            let y = idx / width;
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    let n = ny * width + nx;
                    if state[n] == WEAK {
                        state[n] = STRONG;
                        stack[top] = n;
                        top += 1;
                    }
                }
            }
        }

        for flag in state.iter_mut() {
            *flag = u8::from(*flag == STRONG);
        }
        Ok(state)
    }
}

fn gaussian_blur_5x5(gray: &[u8], width: usize, height: usize) -> Outcome<Vec<i32>> {
    let mut out = scratch(width * height, 0i32, STAGE)?;
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0i32;
            let mut k = 0usize;
            for ky in -2i64..=2 {
                let yy = (y as i64 + ky).clamp(0, height as i64 - 1) as usize;
                let row = yy * width;
                for kx in -2i64..=2 {
                    let xx = (x as i64 + kx).clamp(0, width as i64 - 1) as usize;
                    acc += gray[row + xx] as i32 * GAUSSIAN_5X5[k];
                    k += 1;
                }
            }
            out[y * width + x] = acc / GAUSSIAN_SUM;
        }
    }
    Ok(out)
}

struct Gradients {
    gx: Vec<i32>,
    gy: Vec<i32>,
    magnitude: Vec<f64>,
}

/// Sobel over interior pixels; the one-pixel border keeps zero gradient.
/// `gy` is positive when the image is brighter above the pixel.
fn sobel(blurred: &[i32], width: usize, height: usize) -> Outcome<Gradients> {
    let size = width * height;
    let mut gx = scratch(size, 0i32, STAGE)?;
    let mut gy = scratch(size, 0i32, STAGE)?;
    let mut magnitude = scratch(size, 0f64, STAGE)?;
    if width < 3 || height < 3 {
        return Ok(Gradients { gx, gy, magnitude });
    }
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let idx = y * width + x;
            let p00 = blurred[idx - width - 1];
            let p01 = blurred[idx - width];
            let p02 = blurred[idx - width + 1];
            let p10 = blurred[idx - 1];
            let p12 = blurred[idx + 1];
            let p20 = blurred[idx + width - 1];
            let p21 = blurred[idx + width];
            let p22 = blurred[idx + width + 1];

            let gx_val = (p02 - p00) + 2 * (p12 - p10) + (p22 - p20);
            let gy_val = (p00 + 2 * p01 + p02) - (p20 + 2 * p21 + p22);
            gx[idx] = gx_val;
            gy[idx] = gy_val;
            let sq = gx_val as i64 * gx_val as i64 + gy_val as i64 * gy_val as i64;
            magnitude[idx] = (sq as f64).sqrt();
        }
    }
    Ok(Gradients { gx, gy, magnitude })
}

fn orientation(gx: i32, gy: i32) -> Orientation {
    let ax = gx.unsigned_abs() as f64;
    let ay = gy.unsigned_abs() as f64;
    if ay <= ax * TAN_22_5 {
        Orientation::Deg0
    } else if ay >= ax * TAN_67_5 {
        Orientation::Deg90
    } else if (gx > 0) == (gy > 0) {
        Orientation::Deg45
    } else {
        Orientation::Deg135
    }
}

fn non_max_suppression(g: &Gradients, width: usize, height: usize) -> Outcome<Vec<f64>> {
    let mut out = scratch(width * height, 0f64, STAGE)?;
    if width < 3 || height < 3 {
        return Ok(out);
    }
    let mag = &g.magnitude;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let idx = y * width + x;
            let (a, b) = match orientation(g.gx[idx], g.gy[idx]) {
                Orientation::Deg0 => (mag[idx - 1], mag[idx + 1]),
                Orientation::Deg45 => (mag[idx - width + 1], mag[idx + width - 1]),
                Orientation::Deg90 => (mag[idx - width], mag[idx + width]),
                Orientation::Deg135 => (mag[idx - width - 1], mag[idx + width + 1]),
            };
            let m = mag[idx];
            if m >= a && m >= b {
                out[idx] = m;
            }
        }
    }
    Ok(out)
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    /// Bright filled rectangle `[x0, x1) x [y0, y1)` on a dark background.
    fn rect_frame(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> Frame {
        let mut gray = vec![30u8; (w * h) as usize];
        for y in y0..y1 {
            for x in x0..x1 {
                gray[(y * w + x) as usize] = 230;
            }
        }
        Frame::from_gray(w, h, gray)
    }

    fn digest(map: &EdgeMap) -> String {
        hex::encode(Sha256::digest(&map.edges))
    }

    #[test]
    fn uniform_frame_has_no_edges() {
        let frame = Frame::from_gray(32, 32, vec![128; 32 * 32]);
        let map = EdgeDetector::default().detect(&frame).unwrap();
        assert_eq!(map.edge_count(), 0);
    }

    #[test]
    fn rectangle_boundary_is_detected() {
        let frame = rect_frame(80, 60, 20, 15, 60, 45);
        let map = EdgeDetector::default().detect(&frame).unwrap();
        assert!(map.edges.iter().all(|&v| v <= 1));
        assert!(map.edge_count() > 100, "edges: {}", map.edge_count());

        // Edges hug the boundary, never the flat interior or far background.
        assert!(!map.is_edge(40, 30));
        assert!(!map.is_edge(5, 5));
        let near_left = (18..=21).any(|x| map.is_edge(x, 30));
        assert!(near_left);
    }

    #[test]
    fn detection_is_byte_identical_across_runs() {
        let frame = rect_frame(97, 71, 13, 9, 80, 60);
        let detector = EdgeDetector::new(40, 120);
        let first = detector.detect(&frame).unwrap();
        let second = detector.detect(&frame).unwrap();
        assert_eq!(digest(&first), digest(&second));
        assert_eq!(first, second);
    }

    #[test]
    fn higher_thresholds_never_add_edges() {
        let frame = rect_frame(64, 64, 10, 10, 50, 50);
        let loose = EdgeDetector::new(20, 60).detect(&frame).unwrap();
        let strict = EdgeDetector::new(200, 2000).detect(&frame).unwrap();
        assert!(strict.edge_count() <= loose.edge_count());
        assert_eq!(strict.edge_count(), 0);
    }

    #[test]
    fn buffer_mismatch_fails() {
        let frame = Frame::from_gray(10, 10, vec![0; 99]);
        let err = EdgeDetector::default().detect(&frame).unwrap_err();
        assert_eq!(err.stage, FailureStage::Edges);
        assert_eq!(err.code, FailureCode::EdgesFailed);
    }

    #[test]
    fn empty_frame_fails() {
        let frame = Frame::from_gray(0, 0, Vec::new());
        let err = EdgeDetector::default().detect(&frame).unwrap_err();
        assert_eq!(err.code, FailureCode::EdgesFailed);
    }

    #[test]
    fn tiny_frames_are_handled() {
        let frame = Frame::from_gray(2, 1, vec![0, 255]);
        let map = EdgeDetector::default().detect(&frame).unwrap();
        assert_eq!(map.edges.len(), 2);
        assert_eq!(map.edge_count(), 0);
    }

    #[test]
    fn orientation_classes() {
        assert_eq!(orientation(10, 0), Orientation::Deg0);
        assert_eq!(orientation(0, 0), Orientation::Deg0);
        assert_eq!(orientation(0, -10), Orientation::Deg90);
        assert_eq!(orientation(10, 10), Orientation::Deg45);
        assert_eq!(orientation(-10, -10), Orientation::Deg45);
        assert_eq!(orientation(10, -10), Orientation::Deg135);
    }
}
