// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Corner refinement — local search for the position with the densest edge
// neighbourhood around each ordered corner.

use pagewerk_core::{
    CornerPoint, EdgeMap, FailureCode, FailureStage, Frame, OrderedCorners, Outcome,
    PageDetectFailure, RefineParams, RefineResult, RefineStatus,
};
use tracing::{debug, info, instrument, warn};

use crate::boundary::catch_panic;
use crate::edges::EdgeDetector;

const STAGE: FailureStage = FailureStage::Refine;

/// Moves each corner to the nearby position whose window holds the most edge
/// pixels. A corner never moves further than `window_radius` from where it
/// started.
#[derive(Debug, Clone, Copy, Default)]
pub struct CornerRefiner {
    detector: EdgeDetector,
}

impl CornerRefiner {
    /// Refine against edges computed with `detector`'s thresholds.
    pub fn new(detector: EdgeDetector) -> Self {
        Self { detector }
    }

    #[instrument(skip(self, frame, ordered), fields(width = frame.width, height = frame.height))]
    pub fn refine(
        &self,
        frame: &Frame,
        ordered: &OrderedCorners,
        params: &RefineParams,
    ) -> Outcome<RefineResult> {
        if params.window_radius == 0
            || params.max_iters == 0
            || !(params.epsilon > 0.0 && params.epsilon.is_finite())
        {
            warn!(?params, "Invalid refine parameters");
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::RefineFailed,
                "refine parameters must all be > 0",
            ));
        }
        if frame.width <= 1 || frame.height <= 1 || !frame.has_valid_buffer() {
            warn!(len = frame.gray.len(), "Invalid refine frame");
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::RefineFailed,
                "invalid frame",
            ));
        }

        let edges = self.detector.detect(frame).map_err(|failure| {
            PageDetectFailure::new(
                STAGE,
                FailureCode::RefineFailed,
                format!("edge recompute: {failure}"),
            )
        })?;

        catch_panic(STAGE, FailureCode::RefineFailed, || {
            refine_all(&edges, ordered, params)
        })
    }
}

fn refine_all(
    edges: &EdgeMap,
    ordered: &OrderedCorners,
    params: &RefineParams,
) -> Outcome<RefineResult> {
    let input = ordered.as_array();
    let mut refined = input;
    let mut deltas_px = [0.0; 4];
    for (i, corner) in input.iter().enumerate() {
        let moved = refine_corner(edges, *corner, params);
        if !moved.is_finite() {
            warn!(corner = i, "Refined corner is not finite");
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::RefineFailed,
                format!("corner {i} is not finite"),
            ));
        }
        let clamped = moved.clamp_to(edges.width, edges.height);
        deltas_px[i] = corner.distance(&clamped);
        refined[i] = clamped;
    }
    info!(?deltas_px, "Corners refined");
    Ok(RefineResult {
        corners: OrderedCorners::from_array(refined),
        deltas_px,
        status: RefineStatus::Refined,
    })
}

fn refine_corner(edges: &EdgeMap, corner: CornerPoint, params: &RefineParams) -> CornerPoint {
    let start = corner.clamp_to(edges.width, edges.height);
    let mut current = start;
    let mut current_score = score_at(edges, current, params.window_radius);

    for iter in 0..params.max_iters {
        let Some((candidate, score)) = local_search(edges, current, start, params.window_radius)
        else {
            break;
        };
        let step = current.distance(&candidate);
        if score >= current_score {
            current = candidate;
            current_score = score;
        }
        if step < params.epsilon {
            debug!(iter, score = current_score, "Corner settled");
            break;
        }
    }
    current
}

/// Best integer position within `radius` (Chebyshev) of `center` and within
/// `radius` (Euclidean) of `start`. Ties go to the position nearest `start`.
fn local_search(
    edges: &EdgeMap,
    center: CornerPoint,
    start: CornerPoint,
    radius: u32,
) -> Option<(CornerPoint, u32)> {
    let r = radius as i64;
    let cx = center.x.round() as i64;
    let cy = center.y.round() as i64;
    let min_x = (cx - r).max(0);
    let max_x = (cx + r).min(edges.width as i64 - 1);
    let min_y = (cy - r).max(0);
    let max_y = (cy + r).min(edges.height as i64 - 1);

    let mut best: Option<(CornerPoint, u32, f64)> = None;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let candidate = CornerPoint::new(x as f64, y as f64);
            // Intentionally tighter than the sliding window: edge density keeps
            // growing into the page interior, and the disc caps every reported
            // delta at `radius`.
            let from_start = candidate.distance(&start);
            if from_start > radius as f64 {
                continue;
            }
            let score = window_score(edges, x, y, r);
            let better = match best {
                None => true,
                Some((_, best_score, best_dist)) => {
                    score > best_score || (score == best_score && from_start < best_dist)
                }
            };
            if better {
                best = Some((candidate, score, from_start));
            }
        }
    }
    best.map(|(point, score, _)| (point, score))
}

fn score_at(edges: &EdgeMap, point: CornerPoint, radius: u32) -> u32 {
    let x = (point.x.round() as i64).clamp(0, edges.width as i64 - 1);
    let y = (point.y.round() as i64).clamp(0, edges.height as i64 - 1);
    window_score(edges, x, y, radius as i64)
}

/// Number of edge pixels in the square window of half-size `radius`.
fn window_score(edges: &EdgeMap, cx: i64, cy: i64, radius: i64) -> u32 {
    let width = edges.width as i64;
    let min_x = (cx - radius).max(0) as usize;
    let max_x = (cx + radius).min(width - 1) as usize;
    let min_y = (cy - radius).max(0);
    let max_y = (cy + radius).min(edges.height as i64 - 1);
    let mut count = 0u32;
    for y in min_y..=max_y {
        let row = y as usize * edges.width as usize;
        count += edges.edges[row + min_x..=row + max_x]
            .iter()
            .filter(|&&flag| flag != 0)
            .count() as u32;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_frame() -> Frame {
        let (w, h) = (120u32, 100u32);
        let mut gray = vec![25u8; (w * h) as usize];
        for y in 30..70 {
            for x in 40..80 {
                gray[(y * w + x) as usize] = 225;
            }
        }
        Frame::from_gray(w, h, gray)
    }

    fn corners(raw: [(f64, f64); 4]) -> OrderedCorners {
        OrderedCorners::from_array(raw.map(|(x, y)| CornerPoint::new(x, y)))
    }

    #[test]
    fn invalid_params_fail_immediately() {
        let frame = square_frame();
        let ordered = corners([(40.0, 30.0), (80.0, 30.0), (80.0, 70.0), (40.0, 70.0)]);
        for params in [
            RefineParams {
                window_radius: 0,
                ..Default::default()
            },
            RefineParams {
                max_iters: 0,
                ..Default::default()
            },
            RefineParams {
                epsilon: 0.0,
                ..Default::default()
            },
            RefineParams {
                epsilon: f64::NAN,
                ..Default::default()
            },
        ] {
            let err = CornerRefiner::default()
                .refine(&frame, &ordered, &params)
                .unwrap_err();
            assert_eq!(err.stage, FailureStage::Refine);
            assert_eq!(err.code, FailureCode::RefineFailed);
        }
    }

    #[test]
    fn invalid_frame_fails() {
        let frame = Frame::from_gray(10, 10, vec![0; 20]);
        let ordered = corners([(1.0, 1.0), (8.0, 1.0), (8.0, 8.0), (1.0, 8.0)]);
        let err = CornerRefiner::default()
            .refine(&frame, &ordered, &RefineParams::default())
            .unwrap_err();
        assert_eq!(err.code, FailureCode::RefineFailed);
    }

    #[test]
    fn corners_far_from_edges_stay_put() {
        let frame = square_frame();
        let ordered = corners([(5.0, 5.0), (114.0, 5.0), (114.0, 94.0), (5.0, 94.0)]);
        let result = CornerRefiner::default()
            .refine(&frame, &ordered, &RefineParams::default())
            .unwrap();
        assert_eq!(result.status, RefineStatus::Refined);
        assert_eq!(result.corners, ordered);
        assert_eq!(result.deltas_px, [0.0; 4]);
    }

    #[test]
    fn offset_corner_is_pulled_toward_the_page_corner() {
        let frame = square_frame();
        let ordered = corners([(36.0, 26.0), (83.0, 26.0), (83.0, 73.0), (36.0, 73.0)]);
        let params = RefineParams::default();
        let result = CornerRefiner::default()
            .refine(&frame, &ordered, &params)
            .unwrap();
        let truth = CornerPoint::new(40.0, 30.0);
        let before = ordered.top_left.distance(&truth);
        let after = result.corners.top_left.distance(&truth);
        assert!(after < before, "before {before}, after {after}");
        for delta in result.deltas_px {
            assert!(delta <= params.window_radius as f64 + 1e-9, "delta {delta}");
        }
    }

    #[test]
    fn refinement_is_deterministic() {
        let frame = square_frame();
        let ordered = corners([(38.0, 29.0), (81.0, 31.0), (79.0, 71.0), (41.0, 68.0)]);
        let refiner = CornerRefiner::default();
        let a = refiner.refine(&frame, &ordered, &RefineParams::default()).unwrap();
        let b = refiner.refine(&frame, &ordered, &RefineParams::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn out_of_bounds_corners_are_clamped() {
        let frame = square_frame();
        let ordered = corners([(-4.0, -4.0), (200.0, -1.0), (200.0, 300.0), (-1.0, 300.0)]);
        let result = CornerRefiner::default()
            .refine(&frame, &ordered, &RefineParams::default())
            .unwrap();
        for c in result.corners.as_array() {
            assert!((0.0..=119.0).contains(&c.x) && (0.0..=99.0).contains(&c.y));
        }
    }

    #[test]
    fn window_score_counts_edges() {
        let mut edges = vec![0u8; 25];
        edges[12] = 1;
        edges[0] = 1;
        let map = EdgeMap { width: 5, height: 5, edges };
        assert_eq!(window_score(&map, 2, 2, 1), 1);
        assert_eq!(window_score(&map, 2, 2, 2), 2);
        assert_eq!(window_score(&map, 0, 0, 1), 1);
    }
}
