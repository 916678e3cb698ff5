// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Contour extraction — 8-connected component labelling over an edge map,
// each surviving component summarized by its convex hull.

use pagewerk_core::{
    Bbox, Contour, EdgeMap, FailureCode, FailureStage, Outcome, PageDetectFailure, Point,
};
use tracing::{debug, info, instrument, warn};

use crate::geometry::{bounding_box, cross, polygon_area, polygon_perimeter, scratch};

const STAGE: FailureStage = FailureStage::Contours;

/// Groups edge pixels into components and discards the noisy ones.
#[derive(Debug, Clone, Copy)]
pub struct ContourExtractor {
    min_points: usize,
}

impl Default for ContourExtractor {
    fn default() -> Self {
        Self::new(20)
    }
}

impl ContourExtractor {
    /// Components with fewer than `min_points` pixels are dropped.
    pub fn new(min_points: usize) -> Self {
        Self { min_points }
    }

    #[instrument(skip_all, fields(width = edges.width, height = edges.height))]
    pub fn extract(&self, edges: &EdgeMap) -> Outcome<Vec<Contour>> {
        let width = edges.width as usize;
        let height = edges.height as usize;
        let size = width * height;
        if size == 0 || edges.edges.len() != size {
            warn!(len = edges.edges.len(), "Edge map size mismatch");
            return Err(PageDetectFailure::new(
                STAGE,
                FailureCode::ContoursEmpty,
                "edge map buffer does not match its dimensions",
            ));
        }

        let mut visited = scratch(size, false, STAGE)?;
        // Every pixel is enqueued at most once, so a pixel-count queue is
        // enough for any component.
        let mut queue = scratch(size, 0usize, STAGE)?;
        let mut contours = Vec::new();
        let mut rejected = 0usize;

        for start in 0..size {
            if edges.edges[start] == 0 || visited[start] {
                continue;
            }
            visited[start] = true;
            queue[0] = start;
            let (mut head, mut tail) = (0usize, 1usize);

            while head < tail {
                let idx = queue[head];
                head += 1;
                let x = idx % width;
                let y = idx / width;
                for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                    for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                        let n = ny * width + nx;
                        if edges.edges[n] != 0 && !visited[n] {
                            visited[n] = true;
                            queue[tail] = n;
                            tail += 1;
                        }
                    }
                }
            }

            if tail < self.min_points {
                rejected += 1;
                continue;
            }
            let pixels: Vec<Point> = queue[..tail]
                .iter()
                .map(|&idx| Point::new((idx % width) as i32, (idx / width) as i32))
                .collect();
            contours.push(summarize(&pixels));
        }

        debug!(kept = contours.len(), rejected, "Components labelled");
        if contours.is_empty() {
            warn!(min_points = self.min_points, "No component survived the size filter");
            return Err(PageDetectFailure::bare(STAGE, FailureCode::ContoursEmpty));
        }
        info!(contours = contours.len(), "Contours extracted");
        Ok(contours)
    }
}

fn summarize(pixels: &[Point]) -> Contour {
    let hull = convex_hull(pixels);
    let points = if hull.is_empty() { pixels.to_vec() } else { hull };
    let bbox = bounding_box(pixels).unwrap_or_else(|| Bbox::from_extents(0, 0, 0, 0));
    Contour {
        area: polygon_area(&points),
        perimeter: polygon_perimeter(&points),
        points,
        bbox,
    }
}

/// Andrew's monotone chain. Collinear points are dropped; fewer than three
/// distinct points come back sorted and deduplicated.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut sorted = points.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.len() < 3 {
        return sorted;
    }

    let mut hull: Vec<Point> = Vec::with_capacity(sorted.len() * 2);
    for &p in &sorted {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in sorted.iter().rev().skip(1) {
        while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    // Last point repeats the first.
    hull.pop();
    hull
}
