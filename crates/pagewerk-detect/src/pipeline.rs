// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sequential page detection pipeline.
//
// LOAD_UPRIGHT -> PREPROCESS -> EDGES -> CONTOURS -> QUAD_SELECT -> ORDER ->
// REFINE -> RECTIFY_SIZE. The first failing stage ends the run; nothing is
// retried. Each stage runs inside a boundary that enforces the optional time
// budget, opens a tracing span and turns panics into `UNKNOWN`.

use std::path::Path;
use std::time::{Duration, Instant};

use pagewerk_core::{
    DecodeInfo, FailureCode, FailureStage, Frame, OrderedCorners, Outcome, PageDetectFailure,
    PageDetectParams, QuadCandidate, RectifiedSize, RefineResult, RefineStatus,
};
use serde::Serialize;
use tracing::{debug, info, info_span, instrument, warn};

use crate::boundary::catch_panic;
use crate::contours::ContourExtractor;
use crate::decode::SafeDecoder;
use crate::edges::EdgeDetector;
use crate::order::CornerOrderer;
use crate::preprocess::Preprocessor;
use crate::quad::QuadSelector;
use crate::quality::{self, ExposureMetrics, QualityGate, QualityVerdict, SkewMetrics};
use crate::rectify::RectifySizePolicy;
use crate::refine::CornerRefiner;

/// Everything a downstream warp or writer needs from one detection run.
#[derive(Debug, Clone, Serialize)]
pub struct PageDetectReport {
    /// Absent when the run started from an in-memory frame.
    pub decode_info: Option<DecodeInfo>,
    pub frame_width: u32,
    pub frame_height: u32,
    pub downscale_factor: f64,
    pub candidate: QuadCandidate,
    /// Ordered corners in detection-frame pixels.
    pub ordered_frame: OrderedCorners,
    /// Refinement outcome, in detection-frame pixels.
    pub refine: RefineResult,
    /// `ordered_frame` mapped to upright-image pixels.
    pub ordered_upright: OrderedCorners,
    /// Refined corners mapped to upright-image pixels.
    pub refined_upright: OrderedCorners,
    pub rectified_size: RectifiedSize,
    pub skew: SkewMetrics,
    pub exposure: ExposureMetrics,
    pub quality: QualityVerdict,
}

/// Wall-clock budget shared by all stages of one run.
struct StageClock {
    started: Instant,
    budget: Option<Duration>,
}

impl StageClock {
    fn start(budget_ms: Option<u64>) -> Self {
        Self {
            started: Instant::now(),
            budget: budget_ms.map(Duration::from_millis),
        }
    }

    /// Fail if the budget is spent before `stage` starts.
    fn check(&self, stage: FailureStage) -> Outcome<()> {
        let Some(budget) = self.budget else {
            return Ok(());
        };
        let elapsed = self.started.elapsed();
        if elapsed >= budget {
            warn!(%stage, elapsed_ms = elapsed.as_millis() as u64, "Time budget exhausted");
            return Err(PageDetectFailure::new(
                stage,
                FailureCode::TimeBudgetExceeded,
                format!(
                    "{} ms elapsed of a {} ms budget",
                    elapsed.as_millis(),
                    budget.as_millis()
                ),
            ));
        }
        Ok(())
    }
}

/// Runs every detection stage in order with one parameter bundle.
#[derive(Debug, Clone, Default)]
pub struct PageDetectPipeline {
    params: PageDetectParams,
    gate: QualityGate,
}

impl PageDetectPipeline {
    pub fn new(params: PageDetectParams) -> Self {
        Self {
            params,
            gate: QualityGate::default(),
        }
    }

    pub fn with_quality_gate(mut self, gate: QualityGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn params(&self) -> &PageDetectParams {
        &self.params
    }

    /// Decode `path` and run the full pipeline on it.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn run(&self, path: impl AsRef<Path>) -> Outcome<PageDetectReport> {
        let clock = StageClock::start(self.params.time_budget_ms);
        let decoder = SafeDecoder::new(self.params.effective_decode_limits());
        let decoded = stage(&clock, FailureStage::LoadUpright, || {
            decoder.decode_upright(path.as_ref())
        })?;

        let preprocessor = Preprocessor::new(self.params.max_side);
        let frame = stage(&clock, FailureStage::Preprocess, || {
            preprocessor.preprocess(&decoded.image, decoded.info.rotation_applied_deg)
        })?;
        drop(decoded.image);

        self.detect(&clock, &frame, Some(decoded.info))
    }

    /// Run from EDGES onward on a frame the caller already prepared.
    #[instrument(skip_all, fields(width = frame.width, height = frame.height))]
    pub fn run_frame(&self, frame: &Frame) -> Outcome<PageDetectReport> {
        let clock = StageClock::start(self.params.time_budget_ms);
        self.detect(&clock, frame, None)
    }

    fn detect(
        &self,
        clock: &StageClock,
        frame: &Frame,
        decode_info: Option<DecodeInfo>,
    ) -> Outcome<PageDetectReport> {
        let params = &self.params;
        let detector = EdgeDetector::new(params.edge_low_threshold, params.edge_high_threshold);

        let edges = stage(clock, FailureStage::Edges, || detector.detect(frame))?;
        let contours = stage(clock, FailureStage::Contours, || {
            ContourExtractor::new(params.min_contour_points).extract(&edges)
        })?;
        drop(edges);
        let candidate = stage(clock, FailureStage::QuadSelect, || {
            QuadSelector::new(params.quad).select(&contours, frame.width, frame.height)
        })?;
        let ordered = stage(clock, FailureStage::Order, || {
            CornerOrderer::order(&candidate.points)
        })?;
        let refine = self.refine(clock, detector, frame, &ordered)?;

        let scale_x = frame.original_width as f64 / frame.width as f64;
        let scale_y = frame.original_height as f64 / frame.height as f64;
        let ordered_upright = ordered.scale(scale_x, scale_y);
        let refined_upright = refine.corners.scale(scale_x, scale_y);

        let rectify_params = params.effective_rectify_params();
        let rectified_size = stage(clock, FailureStage::RectifySize, || {
            RectifySizePolicy::compute(&refined_upright, &rectify_params)
        })?;

        let skew = quality::skew_from_quad(&refine.corners, frame.width, frame.height);
        let exposure = quality::exposure(frame);
        let verdict = self.gate.evaluate(None, &exposure, &skew);

        info!(
            width = rectified_size.width,
            height = rectified_size.height,
            refine = ?refine.status,
            quality = ?verdict.decision,
            "Page detected"
        );

        Ok(PageDetectReport {
            decode_info,
            frame_width: frame.width,
            frame_height: frame.height,
            downscale_factor: frame.downscale_factor,
            candidate,
            ordered_frame: ordered,
            refine,
            ordered_upright,
            refined_upright,
            rectified_size,
            skew,
            exposure,
            quality: verdict,
        })
    }

    fn refine(
        &self,
        clock: &StageClock,
        detector: EdgeDetector,
        frame: &Frame,
        ordered: &OrderedCorners,
    ) -> Outcome<RefineResult> {
        let Some(refine_params) = self.params.refine else {
            debug!("Refinement disabled");
            return Ok(RefineResult::unchanged(*ordered, RefineStatus::Skipped));
        };
        let refiner = CornerRefiner::new(detector);
        match stage(clock, FailureStage::Refine, || {
            refiner.refine(frame, ordered, &refine_params)
        }) {
            Ok(result) => Ok(result),
            Err(failure)
                if self.params.refine_best_effort
                    && failure.code != FailureCode::TimeBudgetExceeded =>
            {
                warn!(%failure, "Refinement failed, keeping ordered corners");
                Ok(RefineResult::unchanged(*ordered, RefineStatus::Failed))
            }
            Err(failure) => Err(failure),
        }
    }
}

/// Stage boundary: budget check, span, panic capture, outcome logging.
fn stage<T>(
    clock: &StageClock,
    stage: FailureStage,
    body: impl FnOnce() -> Outcome<T>,
) -> Outcome<T> {
    clock.check(stage)?;
    let span = info_span!("stage", stage = stage.as_str());
    let _guard = span.enter();
    let started = Instant::now();
    let outcome = catch_panic(stage, FailureCode::Unknown, body);
    match &outcome {
        Ok(_) => debug!(elapsed_us = started.elapsed().as_micros() as u64, "Stage complete"),
        Err(failure) => warn!(code = %failure.code, message = ?failure.message, "Stage failed"),
    }
    outcome
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use imageproc::drawing::{draw_filled_rect_mut, draw_polygon_mut};
    use imageproc::point::Point as DrawPoint;
    use imageproc::rect::Rect;
    use pagewerk_core::{CornerPoint, RefineParams};

    const SIZE: u32 = 200;
    const SQUARE_ORIGIN: i32 = 50;
    const SQUARE_SIDE: u32 = 100;
    /// Edge smoothing rounds the corners off by a few pixels.
    const CORNER_TOLERANCE: f64 = 7.0;

    /// Bright axis-aligned square on a dark background.
    fn square_image() -> GrayImage {
        let mut img = GrayImage::from_pixel(SIZE, SIZE, Luma([20]));
        draw_filled_rect_mut(
            &mut img,
            Rect::at(SQUARE_ORIGIN, SQUARE_ORIGIN).of_size(SQUARE_SIDE, SQUARE_SIDE),
            Luma([235]),
        );
        img
    }

    fn square_frame() -> Frame {
        Frame::from_gray(SIZE, SIZE, square_image().into_raw())
    }

    fn square_corners() -> [CornerPoint; 4] {
        let lo = SQUARE_ORIGIN as f64;
        let hi = (SQUARE_ORIGIN + SQUARE_SIDE as i32 - 1) as f64;
        [
            CornerPoint::new(lo, lo),
            CornerPoint::new(hi, lo),
            CornerPoint::new(hi, hi),
            CornerPoint::new(lo, hi),
        ]
    }

    #[test]
    fn synthetic_square_yields_one_quad_at_its_corners() {
        let frame = square_frame();
        let edges = EdgeDetector::default().detect(&frame).unwrap();
        let contours = ContourExtractor::default().extract(&edges).unwrap();
        assert_eq!(contours.len(), 1);

        let candidate = QuadSelector::default().select(&contours, SIZE, SIZE).unwrap();
        assert!(candidate.score > 0.0);
        let ordered = CornerOrderer::order(&candidate.points).unwrap();
        for (found, expected) in ordered.as_array().iter().zip(square_corners()) {
            assert!(
                found.distance(&expected) <= CORNER_TOLERANCE,
                "corner {found:?} too far from {expected:?}"
            );
        }
    }

    /// Vertices of a `SQUARE_SIDE` square centred in the frame and turned by
    /// `degrees`, starting from the top-most corner and going clockwise on
    /// screen.
    fn rotated_square(degrees: f64) -> [CornerPoint; 4] {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let centre = SIZE as f64 / 2.0;
        let half = SQUARE_SIDE as f64 / 2.0;
        [(-half, -half), (half, -half), (half, half), (-half, half)].map(|(x, y)| {
            CornerPoint::new(
                (centre + x * cos - y * sin).round(),
                (centre + x * sin + y * cos).round(),
            )
        })
    }

    fn rotated_frame(corners: &[CornerPoint; 4]) -> Frame {
        let mut img = GrayImage::from_pixel(SIZE, SIZE, Luma([20]));
        let poly = corners.map(|c| DrawPoint::new(c.x as i32, c.y as i32));
        draw_polygon_mut(&mut img, &poly, Luma([235]));
        Frame::from_gray(SIZE, SIZE, img.into_raw())
    }

    #[test]
    fn rotated_pages_are_found_at_their_corners() {
        for degrees in [3.0, 15.0, 30.0] {
            let drawn = rotated_square(degrees);
            let report = PageDetectPipeline::default()
                .run_frame(&rotated_frame(&drawn))
                .unwrap_or_else(|err| panic!("{degrees} deg: {err}"));
            for (found, expected) in report.ordered_frame.as_array().iter().zip(drawn) {
                assert!(
                    found.distance(&expected) <= CORNER_TOLERANCE,
                    "{degrees} deg: corner {found:?} too far from {expected:?}"
                );
            }
        }
    }

    #[test]
    fn full_run_on_frame_refines_within_radius() {
        let params = PageDetectParams::default();
        let radius = params.refine.map(|r| r.window_radius).unwrap_or_default() as f64;
        let report = PageDetectPipeline::new(params).run_frame(&square_frame()).unwrap();

        assert!(report.decode_info.is_none());
        assert_eq!(report.refine.status, RefineStatus::Refined);
        for delta in report.refine.deltas_px {
            assert!(delta <= radius + 1e-9, "delta {delta} exceeds {radius}");
        }
        assert!(report.ordered_frame.signed_area() > 0.0);
        // Frame and upright space coincide without a downscale.
        assert_eq!(report.ordered_upright, report.ordered_frame);

        let size = report.rectified_size;
        assert!((256..=2048).contains(&size.width) && (256..=2048).contains(&size.height));
        assert_eq!(size.width % 2, 0);
        assert_eq!(report.skew.status, quality::MetricStatus::Ok);
    }

    #[test]
    fn identical_frames_give_identical_reports() {
        let pipeline = PageDetectPipeline::default();
        let a = pipeline.run_frame(&square_frame()).unwrap();
        let b = pipeline.run_frame(&square_frame()).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn run_decodes_file_and_maps_corners_upright() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        square_image().save(&path).unwrap();

        // Force a 2x downscale between upright image and detection frame.
        let params = PageDetectParams {
            max_side: 100,
            min_side: 32,
            ..Default::default()
        };
        let report = PageDetectPipeline::new(params).run(&path).unwrap();
        let info = report.decode_info.unwrap();
        // 200 > 100 forces a decode subsample of 2 as well.
        assert_eq!(info.sample_size, 2);
        assert_eq!((info.decoded_width, info.decoded_height), (100, 100));
        assert_eq!(report.frame_width, 100);
        assert_eq!(report.downscale_factor, 1.0);
        assert_eq!(report.ordered_upright, report.ordered_frame);
    }

    #[test]
    fn upright_corners_scale_with_downscale() {
        let params = PageDetectParams::default();
        let mut frame = square_frame();
        frame.original_width = SIZE * 2;
        frame.original_height = SIZE * 3;
        let report = PageDetectPipeline::new(params).run_frame(&frame).unwrap();
        let f = report.ordered_frame.top_right;
        let u = report.ordered_upright.top_right;
        assert!((u.x - f.x * 2.0).abs() < 1e-9);
        assert!((u.y - f.y * 3.0).abs() < 1e-9);
    }

    #[test]
    fn blank_frame_fails_at_contours() {
        let frame = Frame::from_gray(64, 64, vec![120; 64 * 64]);
        let err = PageDetectPipeline::default().run_frame(&frame).unwrap_err();
        assert_eq!(err.stage, FailureStage::Contours);
        assert_eq!(err.code, FailureCode::ContoursEmpty);
    }

    #[test]
    fn missing_file_fails_at_load() {
        let err = PageDetectPipeline::default()
            .run("/no/such/page.jpg")
            .unwrap_err();
        assert_eq!(err.stage, FailureStage::LoadUpright);
        assert_eq!(err.code, FailureCode::DecodeFailed);
    }

    #[test]
    fn refine_failure_aborts_by_default() {
        let params = PageDetectParams {
            refine: Some(RefineParams {
                window_radius: 0,
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = PageDetectPipeline::new(params).run_frame(&square_frame()).unwrap_err();
        assert_eq!(err.stage, FailureStage::Refine);
        assert_eq!(err.code, FailureCode::RefineFailed);
    }

    #[test]
    fn refine_failure_is_tolerated_in_best_effort_mode() {
        let params = PageDetectParams {
            refine: Some(RefineParams {
                window_radius: 0,
                ..Default::default()
            }),
            refine_best_effort: true,
            ..Default::default()
        };
        let report = PageDetectPipeline::new(params).run_frame(&square_frame()).unwrap();
        assert_eq!(report.refine.status, RefineStatus::Failed);
        assert_eq!(report.refine.corners, report.ordered_frame);
        assert_eq!(report.refine.deltas_px, [0.0; 4]);
    }

    #[test]
    fn disabled_refinement_is_skipped() {
        let params = PageDetectParams {
            refine: None,
            ..Default::default()
        };
        let report = PageDetectPipeline::new(params).run_frame(&square_frame()).unwrap();
        assert_eq!(report.refine.status, RefineStatus::Skipped);
        assert_eq!(report.refined_upright, report.ordered_upright);
    }

    #[test]
    fn spent_budget_fails_before_first_stage() {
        let params = PageDetectParams {
            time_budget_ms: Some(0),
            ..Default::default()
        };
        let err = PageDetectPipeline::new(params).run_frame(&square_frame()).unwrap_err();
        assert_eq!(err.stage, FailureStage::Edges);
        assert_eq!(err.code, FailureCode::TimeBudgetExceeded);
    }

    #[test]
    fn report_serializes_stable_names() {
        let report = PageDetectPipeline::default().run_frame(&square_frame()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["refine"]["status"], "REFINED");
        assert!(json["rectified_size"]["width"].is_u64());
        assert!(json["decode_info"].is_null());
    }
}
