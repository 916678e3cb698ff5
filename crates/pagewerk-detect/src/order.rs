// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Corner ordering — label four points TL/TR/BR/BL with positive winding.

use std::cmp::Ordering;

use pagewerk_core::{
    CornerPoint, FailureCode, FailureStage, OrderedCorners, Outcome, PageDetectFailure, Point,
};
use tracing::{debug, warn};

const STAGE: FailureStage = FailureStage::Order;

/// Anything with |signed area| at or below this is treated as flat.
const MIN_AREA_EPSILON: f64 = 1e-3;

/// Stateless corner labeller.
#[derive(Debug, Clone, Copy, Default)]
pub struct CornerOrderer;

impl CornerOrderer {
    /// Order the integer vertices of a selected quad.
    pub fn order(points: &[Point]) -> Outcome<OrderedCorners> {
        let corners: Vec<CornerPoint> = points.iter().copied().map(CornerPoint::from).collect();
        Self::order_corners(&corners)
    }

    /// Order four sub-pixel corners.
    ///
    /// Points are sorted by angle about their centroid, rotated so the one
    /// with the smallest `y * 1000 + x` leads, and flipped if needed so the
    /// result has positive signed area in image coordinates.
    pub fn order_corners(points: &[CornerPoint]) -> Outcome<OrderedCorners> {
        let Ok(points) = <[CornerPoint; 4]>::try_from(points) else {
            warn!(count = points.len(), "Corner ordering needs exactly four points");
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::OrderNotFourPoints,
                format!("expected 4 points, got {}", points.len()),
            ));
        };
        if points.iter().any(|p| !p.is_finite()) {
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::OrderDegenerate,
                "non-finite corner",
            ));
        }
        for i in 0..4 {
            for j in i + 1..4 {
                if points[i] == points[j] {
                    warn!(?points, "Duplicate corners");
                    return Err(PageDetectFailure::new(
                        STAGE,
                        FailureCode::OrderDegenerate,
                        "duplicate points",
                    ));
                }
            }
        }

        let cx = points.iter().map(|p| p.x).sum::<f64>() / 4.0;
        let cy = points.iter().map(|p| p.y).sum::<f64>() / 4.0;
        let mut sorted = points;
        sorted.sort_by(|a, b| {
            let angle_a = (a.y - cy).atan2(a.x - cx);
            let angle_b = (b.y - cy).atan2(b.x - cx);
            angle_a
                .total_cmp(&angle_b)
                .then_with(|| a.y.total_cmp(&b.y))
                .then_with(|| a.x.total_cmp(&b.x))
        });

        let lead = (0..4)
            .min_by(|&i, &j| {
                let key = |p: &CornerPoint| p.y * 1000.0 + p.x;
                key(&sorted[i])
                    .partial_cmp(&key(&sorted[j]))
                    .unwrap_or(Ordering::Equal)
            })
            .unwrap_or(0);
        sorted.rotate_left(lead);

        let v1 = (sorted[1].x - sorted[0].x, sorted[1].y - sorted[0].y);
        let v2 = (sorted[3].x - sorted[0].x, sorted[3].y - sorted[0].y);
        if v1.0 * v2.1 - v1.1 * v2.0 < 0.0 {
            sorted = [sorted[0], sorted[3], sorted[2], sorted[1]];
        }

        if is_self_crossing(&sorted) {
            warn!(?sorted, "Ordered quad crosses itself");
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::OrderDegenerate,
                "self-crossing quad",
            ));
        }
        let ordered = OrderedCorners::from_array(sorted);
        let area = ordered.signed_area();
        if area.abs() <= MIN_AREA_EPSILON || area < 0.0 {
            warn!(area, "Degenerate quad area");
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::OrderDegenerate,
                format!("signed area {area}"),
            ));
        }
        debug!(?ordered, area, "Corners ordered");
        Ok(ordered)
    }
}

fn is_self_crossing(p: &[CornerPoint; 4]) -> bool {
    segments_intersect(p[0], p[1], p[2], p[3]) || segments_intersect(p[1], p[2], p[3], p[0])
}

fn segments_intersect(a: CornerPoint, b: CornerPoint, c: CornerPoint, d: CornerPoint) -> bool {
    let o1 = orientation(a, b, c);
    let o2 = orientation(a, b, d);
    let o3 = orientation(c, d, a);
    let o4 = orientation(c, d, b);
    if (o1 == 0 && on_segment(a, c, b))
        || (o2 == 0 && on_segment(a, d, b))
        || (o3 == 0 && on_segment(c, a, d))
        || (o4 == 0 && on_segment(c, b, d))
    {
        return true;
    }
    o1 != o2 && o3 != o4
}

fn orientation(a: CornerPoint, b: CornerPoint, c: CornerPoint) -> i8 {
    let value = (b.y - a.y) * (c.x - b.x) - (b.x - a.x) * (c.y - b.y);
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

/// `q` lies within the bounding box of segment `p`-`r`.
fn on_segment(p: CornerPoint, q: CornerPoint, r: CornerPoint) -> bool {
    q.x >= p.x.min(r.x) && q.x <= p.x.max(r.x) && q.y >= p.y.min(r.y) && q.y <= p.y.max(r.y)
}
