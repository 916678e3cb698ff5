// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared integer/float polygon helpers and guarded scratch allocation.

use pagewerk_core::{Bbox, FailureCode, FailureStage, Outcome, PageDetectFailure, Point};

/// Z component of `(b - a) x (c - a)`. Widened to i64 so pixel coordinates
/// cannot overflow.
#[inline]
pub(crate) fn cross(a: Point, b: Point, c: Point) -> i64 {
    (b.x as i64 - a.x as i64) * (c.y as i64 - a.y as i64)
        - (b.y as i64 - a.y as i64) * (c.x as i64 - a.x as i64)
}

/// Absolute shoelace area of a closed polygon.
pub(crate) fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut sum: i64 = 0;
    for i in 0..points.len() {
        let j = (i + 1) % points.len();
        sum += points[i].x as i64 * points[j].y as i64 - points[j].x as i64 * points[i].y as i64;
    }
    sum.abs() as f64 / 2.0
}

/// Sum of edge lengths around a closed polygon. A two-point "polygon" is
/// walked there and back.
pub(crate) fn polygon_perimeter(points: &[Point]) -> f64 {
    match points.len() {
        0 | 1 => 0.0,
        2 => 2.0 * distance(points[0], points[1]),
        n => (0..n).map(|i| distance(points[i], points[(i + 1) % n])).sum(),
    }
}

#[inline]
pub(crate) fn distance(a: Point, b: Point) -> f64 {
    ((b.x - a.x) as f64).hypot((b.y - a.y) as f64)
}

/// Inclusive bounding box of a non-empty point set.
pub(crate) fn bounding_box(points: &[Point]) -> Option<Bbox> {
    let first = points.first()?;
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
    for p in &points[1..] {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    Some(Bbox::from_extents(min_x, min_y, max_x, max_y))
}

/// Allocate an image-sized scratch buffer, reporting `OOM_RISK` instead of
/// aborting when the allocator refuses.
pub(crate) fn scratch<T: Clone>(len: usize, fill: T, stage: FailureStage) -> Outcome<Vec<T>> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(len).map_err(|err| {
        PageDetectFailure::new(
            stage,
            FailureCode::OomRisk,
            format!("scratch buffer of {len} elements: {err}"),
        )
    })?;
    buffer.resize(len, fill);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(side: i32) -> Vec<Point> {
        vec![
            Point::new(0, 0),
            Point::new(side, 0),
            Point::new(side, side),
            Point::new(0, side),
        ]
    }

    #[test]
    fn area_and_perimeter_of_square() {
        let sq = square(10);
        assert_eq!(polygon_area(&sq), 100.0);
        assert!((polygon_perimeter(&sq) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn cross_sign_follows_turn_direction() {
        let a = Point::new(0, 0);
        let b = Point::new(10, 0);
        assert!(cross(a, b, Point::new(10, 10)) > 0);
        assert!(cross(a, b, Point::new(10, -10)) < 0);
        assert_eq!(cross(a, b, Point::new(20, 0)), 0);
    }

    #[test]
    fn two_point_perimeter_walks_both_ways() {
        let pts = [Point::new(0, 0), Point::new(3, 4)];
        assert!((polygon_perimeter(&pts) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn bbox_of_points() {
        let bbox = bounding_box(&square(5)).unwrap();
        assert_eq!((bbox.x, bbox.y, bbox.width, bbox.height), (0, 0, 6, 6));
        assert!(bounding_box(&[]).is_none());
    }
}
