// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Quad selection — simplify each contour hull, keep convex quadrilaterals that
// cover enough of the frame, and pick the most page-like one.

use pagewerk_core::{
    Contour, FailureCode, FailureStage, Outcome, PageDetectFailure, Point, QuadCandidate,
    QuadSelectionConfig,
};
use tracing::{debug, info, instrument, warn};

use crate::geometry::{bounding_box, cross, distance, polygon_area};

const STAGE: FailureStage = FailureStage::QuadSelect;

#[derive(Debug, Clone, Copy, Default)]
pub struct QuadSelector {
    config: QuadSelectionConfig,
}

impl QuadSelector {
    pub fn new(config: QuadSelectionConfig) -> Self {
        Self { config }
    }

    /// Choose the best page quad among `contours` for a
    /// `frame_width x frame_height` frame.
    ///
    /// Fails with `PAGE_NOT_FOUND` when there are no contours, `NO_CONVEX_QUAD`
    /// when no contour simplifies to a convex quadrilateral, and
    /// `QUAD_TOO_SMALL` when convex quads exist but none is large enough.
    #[instrument(skip(self, contours), fields(contours = contours.len()))]
    pub fn select(
        &self,
        contours: &[Contour],
        frame_width: u32,
        frame_height: u32,
    ) -> Outcome<QuadCandidate> {
        if contours.is_empty() {
            warn!("No contours to select from");
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::PageNotFound,
                "no contours available for page detection",
            ));
        }
        if frame_width == 0 || frame_height == 0 {
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::Unknown,
                "frame size must be > 0",
            ));
        }

        let min_area = frame_width as f64 * frame_height as f64 * self.config.min_area_fraction;
        let mut convex_quads = 0usize;
        let mut best: Option<QuadCandidate> = None;

        for contour in contours {
            let epsilon = contour.perimeter * self.config.approx_epsilon_ratio;
            let simplified = simplify(&contour.points, epsilon);
            let Ok(quad) = <[Point; 4]>::try_from(simplified.as_slice()) else {
                continue;
            };
            if !is_convex(&quad) {
                continue;
            }
            convex_quads += 1;

            let area = polygon_area(&quad);
            if area <= 0.0 || area < min_area {
                continue;
            }
            let score = self.score(&quad, area);
            if score <= 0.0 {
                continue;
            }
            debug!(?quad, area, score, "Viable quad");

            let candidate = QuadCandidate {
                points: quad,
                contour_area: contour.area,
                score,
            };
            let replace = match &best {
                None => true,
                Some(current) => {
                    candidate.score > current.score
                        || (candidate.score == current.score
                            && candidate.contour_area > current.contour_area)
                }
            };
            if replace {
                best = Some(candidate);
            }
        }

        if convex_quads == 0 {
            warn!("No convex quad after polygon approximation");
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::NoConvexQuad,
                "no convex quad candidates after polygon approximation",
            ));
        }
        let Some(best) = best else {
            warn!(convex_quads, min_area, "All convex quads below area threshold");
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::QuadTooSmall,
                "convex quad candidates found but area below threshold",
            ));
        };
        info!(score = best.score, contour_area = best.contour_area, "Page quad selected");
        Ok(best)
    }

    /// `area * rectangularity * aspect_score`, zero for a degenerate bbox.
    fn score(&self, quad: &[Point; 4], area: f64) -> f64 {
        let Some(bbox) = bounding_box(quad) else {
            return 0.0;
        };
        let bbox_area = bbox.area();
        if bbox_area <= 0.0 {
            return 0.0;
        }
        let rectangularity = area / bbox_area;
        let (w, h) = (bbox.width as f64, bbox.height as f64);
        let aspect = w.max(h) / w.min(h);
        let aspect_score = if aspect.is_finite() {
            (self.config.max_aspect_ratio / aspect).min(1.0)
        } else {
            0.0
        };
        area * rectangularity * aspect_score
    }
}

/// Ramer–Douglas–Peucker over a closed polygon such as a convex hull.
///
/// The ring is split at two mutually distant vertices, each half is simplified
/// as an open chain, and the halves are joined again. Either split vertex is
/// dropped afterwards if it lies within `epsilon` of the line through its
/// neighbours, so the result does not depend on where the ring starts.
pub fn simplify(points: &[Point], epsilon: f64) -> Vec<Point> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }
    let start = farthest_from(points, 0);
    let end = farthest_from(points, start);
    if start == end {
        return vec![points[start]];
    }

    let ring: Vec<Point> = points[start..]
        .iter()
        .chain(&points[..start])
        .copied()
        .collect();
    let split = (end + n - start) % n;

    let mut out = simplify_chain(&ring[..=split], epsilon);
    let front_len = out.len();
    let mut back = ring[split..].to_vec();
    back.push(ring[0]);
    let back = simplify_chain(&back, epsilon);
    out.extend_from_slice(&back[1..back.len() - 1]);

    for anchor in [front_len - 1, 0] {
        if out.len() > 3 && is_flat(&out, anchor, epsilon) {
            out.remove(anchor);
        }
    }
    out
}

/// Index of the point farthest from `points[from]`; the first one wins ties.
fn farthest_from(points: &[Point], from: usize) -> usize {
    let origin = points[from];
    let mut best = from;
    let mut best_dist = 0.0;
    for (i, &p) in points.iter().enumerate() {
        let dist = distance(p, origin);
        if dist > best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best
}

fn is_flat(ring: &[Point], i: usize, epsilon: f64) -> bool {
    let n = ring.len();
    let prev = ring[(i + n - 1) % n];
    let next = ring[(i + 1) % n];
    perpendicular_distance(ring[i], prev, next) <= epsilon
}

/// Open-chain RDP driven by an explicit stack of index ranges. Both endpoints
/// are always kept.
fn simplify_chain(points: &[Point], epsilon: f64) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;

    let mut stack = vec![(0usize, points.len() - 1)];
    while let Some((first, last)) = stack.pop() {
        if last <= first + 1 {
            continue;
        }
        let mut max_dist = 0.0;
        let mut index = first;
        for i in first + 1..last {
            let dist = perpendicular_distance(points[i], points[first], points[last]);
            if dist > max_dist {
                max_dist = dist;
                index = i;
            }
        }
        if max_dist > epsilon {
            keep[index] = true;
            stack.push((index, last));
            stack.push((first, index));
        }
    }

    points
        .iter()
        .zip(&keep)
        .filter_map(|(&p, &k)| k.then_some(p))
        .collect()
}

fn perpendicular_distance(p: Point, start: Point, end: Point) -> f64 {
    let dx = (end.x - start.x) as f64;
    let dy = (end.y - start.y) as f64;
    if dx == 0.0 && dy == 0.0 {
        return distance(p, start);
    }
    let numerator = (dy * p.x as f64 - dx * p.y as f64 + end.x as f64 * start.y as f64
        - end.y as f64 * start.x as f64)
        .abs();
    numerator / dx.hypot(dy)
}

/// Every consecutive turn is non-zero and turns the same way.
pub fn is_convex(quad: &[Point; 4]) -> bool {
    let mut sign = 0i64;
    for i in 0..4 {
        let turn = cross(quad[i], quad[(i + 1) % 4], quad[(i + 2) % 4]).signum();
        if turn == 0 || (sign != 0 && turn != sign) {
            return false;
        }
        sign = turn;
    }
    true
}
