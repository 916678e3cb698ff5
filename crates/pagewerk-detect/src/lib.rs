// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pagewerk-detect — Page detection for photographed drawings.
//
// Provides a bounded, EXIF-aware decoder, a deterministic grayscale
// preprocessor, a Canny-style edge detector, contour extraction, quad
// selection, corner ordering and refinement, the rectified-size policy, and a
// sequential pipeline that chains them with stage-tagged failures.

mod boundary;
pub mod contours;
pub mod decode;
pub mod edges;
mod geometry;
pub mod order;
pub mod pipeline;
pub mod preprocess;
pub mod quad;
pub mod quality;
pub mod rectify;
pub mod refine;

// Re-export the primary entry points so callers can use
// `pagewerk_detect::EdgeDetector` etc.
pub use contours::ContourExtractor;
pub use decode::{DecodeResult, SafeDecoder};
pub use edges::EdgeDetector;
pub use order::CornerOrderer;
pub use pipeline::{PageDetectPipeline, PageDetectReport};
pub use preprocess::Preprocessor;
pub use quad::QuadSelector;
pub use quality::QualityGate;
pub use rectify::RectifySizePolicy;
pub use refine::CornerRefiner;
