// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded image decode — reads bounds first, picks a power-of-two subsample
// factor that fits the caps, decodes under an allocation budget, and applies
// the EXIF orientation to produce an upright image.

use std::path::Path;

use image::metadata::Orientation;
use image::{
    ColorType, DynamicImage, GrayAlphaImage, GrayImage, ImageDecoder, ImageError, ImageReader,
    ImageResult, Limits, RgbImage, RgbaImage,
};
use pagewerk_core::{
    DecodeInfo, DecodeLimits, FailureCode, FailureStage, Outcome, PageDetectFailure, guardrails,
};
use tracing::{debug, info, instrument, warn};

use crate::geometry::scratch;

const STAGE: FailureStage = FailureStage::LoadUpright;

/// An upright, size-bounded image together with how it was produced.
#[derive(Debug, Clone)]
pub struct DecodeResult {
    pub image: DynamicImage,
    pub info: DecodeInfo,
}

/// Decoder that never hands back an image larger than its caps.
#[derive(Debug, Clone, Copy)]
pub struct SafeDecoder {
    limits: DecodeLimits,
}

impl SafeDecoder {
    pub fn new(limits: DecodeLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> DecodeLimits {
        self.limits
    }

    /// Decode `path` into an upright image within `max_side` / `max_pixels`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn decode_upright(&self, path: impl AsRef<Path>) -> Outcome<DecodeResult> {
        let path = path.as_ref();
        let DecodeLimits {
            max_side,
            max_pixels,
        } = self.limits;
        if max_side == 0 || max_pixels == 0 {
            return Err(fail(FailureCode::Unknown, "max_pixels and max_side must be > 0"));
        }

        let mut reader = open_reader(path)?;
        let mut limits = Limits::default();
        limits.max_alloc = Some(guardrails::MAX_DECODE_ALLOC_BYTES);
        reader.limits(limits);
        let mut decoder = reader.into_decoder().map_err(decode_error)?;

        // -- Bounds only ------------------------------------------------------
        let (original_width, original_height) = decoder.dimensions();
        if original_width == 0 || original_height == 0 {
            return Err(fail(
                FailureCode::DecodeFailed,
                format!("image {} has empty bounds", path.display()),
            ));
        }

        // The native buffer is the only full-resolution allocation.
        let native_bytes = decoder.total_bytes();
        let native_len = usize::try_from(native_bytes)
            .ok()
            .filter(|_| native_bytes <= guardrails::MAX_DECODE_ALLOC_BYTES)
            .ok_or_else(|| {
                warn!(
                    original_width,
                    original_height, native_bytes, "Decode would exceed the allocation guardrail"
                );
                fail(
                    FailureCode::OomRisk,
                    format!(
                        "decoding {original_width}x{original_height} needs {native_bytes} bytes"
                    ),
                )
            })?;

        let sample_size =
            compute_sample_size(original_width, original_height, max_pixels, max_side);
        debug!(original_width, original_height, sample_size, native_bytes, "Bounds read");

        // -- Bounded decode ---------------------------------------------------
        let orientation = read_orientation(decoder.orientation())?;
        let color = decoder.color_type();
        let mut native = scratch(native_len, 0u8, STAGE)?;
        decoder.read_image(&mut native).map_err(decode_error)?;

        let sampled = subsample(&native, original_width, original_height, color, sample_size)?;
        drop(native);
        let (upright, rotation_applied_deg) = apply_orientation(sampled, orientation);

        // -- Post-rotation re-check -------------------------------------------
        let (decoded_width, decoded_height) = (upright.width(), upright.height());
        let decoded_pixels = decoded_width as u64 * decoded_height as u64;
        if decoded_pixels > max_pixels || decoded_width.max(decoded_height) > max_side {
            warn!(
                decoded_width,
                decoded_height, max_side, max_pixels, "Upright image exceeds caps"
            );
            return Err(fail(
                FailureCode::InputTooLarge,
                format!("decoded image exceeds limits ({decoded_width}x{decoded_height})"),
            ));
        }

        info!(
            original_width,
            original_height,
            decoded_width,
            decoded_height,
            sample_size,
            rotation_applied_deg,
            "Upright image decoded"
        );

        Ok(DecodeResult {
            image: upright,
            info: DecodeInfo {
                original_width,
                original_height,
                decoded_width,
                decoded_height,
                sample_size,
                rotation_applied_deg,
                max_pixels,
                max_side,
            },
        })
    }
}

fn fail(code: FailureCode, message: impl Into<String>) -> PageDetectFailure {
    PageDetectFailure::new(STAGE, code, message)
}

fn open_reader(path: &Path) -> Outcome<ImageReader<std::io::BufReader<std::fs::File>>> {
    ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|err| {
            fail(
                FailureCode::DecodeFailed,
                format!("failed to open {}: {err}", path.display()),
            )
        })
}

fn read_orientation(result: ImageResult<Orientation>) -> Outcome<Orientation> {
    result.map_err(|err| {
        warn!(%err, "EXIF orientation read failed");
        fail(FailureCode::ExifFailed, err.to_string())
    })
}

fn decode_error(err: ImageError) -> PageDetectFailure {
    match err {
        ImageError::Limits(limit) => {
            warn!(%limit, "Decoder refused allocation");
            fail(FailureCode::OomRisk, limit.to_string())
        }
        other => {
            warn!(err = %other, "Image decode failed");
            fail(FailureCode::DecodeFailed, other.to_string())
        }
    }
}

/// Smallest power of two such that the subsampled size fits both caps. Stops
/// doubling once either side would reach zero.
pub fn compute_sample_size(width: u32, height: u32, max_pixels: u64, max_side: u32) -> u32 {
    let mut sample: u32 = 1;
    let mut target_w = width;
    let mut target_h = height;
    while target_w > max_side
        || target_h > max_side
        || target_w as u64 * target_h as u64 > max_pixels
    {
        sample = match sample.checked_mul(2) {
            Some(next) => next,
            None => break,
        };
        target_w = width / sample;
        target_h = height / sample;
        if target_w == 0 || target_h == 0 {
            break;
        }
    }
    sample.max(1)
}

/// Box-average `sample x sample` blocks of a native decoder buffer into an
/// 8-bit image with the same channel layout. Samples are widened to a 16-bit
/// scale before averaging so 8-bit, 16-bit and float sources share one path.
fn subsample(
    native: &[u8],
    width: u32,
    height: u32,
    color: ColorType,
    sample: u32,
) -> Outcome<DynamicImage> {
    let channels = color.channel_count() as usize;
    let depth = match (color.bytes_per_pixel() as usize).checked_div(channels) {
        Some(1) => SampleDepth::U8,
        Some(2) => SampleDepth::U16,
        Some(4) => SampleDepth::F32,
        _ => {
            return Err(fail(
                FailureCode::DecodeFailed,
                format!("unsupported color type {color:?}"),
            ));
        }
    };
    let pixel_bytes = color.bytes_per_pixel() as usize;
    let stride = width as usize * pixel_bytes;
    if native.len() < stride * height as usize {
        return Err(fail(FailureCode::DecodeFailed, "decoder returned a short buffer"));
    }

    let sample = sample.max(1);
    let out_w = (width / sample).max(1);
    let out_h = (height / sample).max(1);
    let mut out = scratch(out_w as usize * out_h as usize * channels, 0u8, STAGE)?;
    let mut acc = [0u64; 4];
    for oy in 0..out_h {
        let y0 = oy * sample;
        let y1 = (y0 + sample).min(height);
        for ox in 0..out_w {
            let x0 = ox * sample;
            let x1 = (x0 + sample).min(width);
            acc.fill(0);
            for y in y0..y1 {
                let row = y as usize * stride;
                for x in x0..x1 {
                    let px = row + x as usize * pixel_bytes;
                    for (c, slot) in acc.iter_mut().take(channels).enumerate() {
                        *slot += depth.read(native, px + c * depth.width());
                    }
                }
            }
            let count = ((y1 - y0) * (x1 - x0)).max(1) as u64;
            let dst = (oy as usize * out_w as usize + ox as usize) * channels;
            for (c, sum) in acc.iter().take(channels).enumerate() {
                out[dst + c] = ((sum / count + 128) / 257) as u8;
            }
        }
    }

    let image = match channels {
        1 => GrayImage::from_raw(out_w, out_h, out).map(DynamicImage::ImageLuma8),
        2 => GrayAlphaImage::from_raw(out_w, out_h, out).map(DynamicImage::ImageLumaA8),
        3 => RgbImage::from_raw(out_w, out_h, out).map(DynamicImage::ImageRgb8),
        4 => RgbaImage::from_raw(out_w, out_h, out).map(DynamicImage::ImageRgba8),
        _ => None,
    };
    image.ok_or_else(|| fail(FailureCode::Unknown, "subsample buffer size mismatch"))
}

/// Sample width of a native buffer; decoders write samples in native endianness.
#[derive(Debug, Clone, Copy)]
enum SampleDepth {
    U8,
    U16,
    F32,
}

impl SampleDepth {
    fn width(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::F32 => 4,
        }
    }

    /// The sample at `offset` on a 0..=65535 scale.
    fn read(self, buf: &[u8], offset: usize) -> u64 {
        match self {
            Self::U8 => buf[offset] as u64 * 257,
            Self::U16 => u16::from_ne_bytes([buf[offset], buf[offset + 1]]) as u64,
            Self::F32 => {
                let bytes = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
                let v = f32::from_ne_bytes(bytes);
                let v = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
                (v as f64 * 65535.0).round() as u64
            }
        }
    }
}

/// Clockwise rotation (degrees) reported for an EXIF orientation. Flips are
/// folded into the rotation they accompany.
pub fn rotation_degrees(orientation: Orientation) -> u16 {
    match orientation {
        Orientation::NoTransforms | Orientation::FlipHorizontal => 0,
        Orientation::Rotate90 | Orientation::Rotate90FlipH => 90,
        Orientation::Rotate180 | Orientation::FlipVertical => 180,
        Orientation::Rotate270 | Orientation::Rotate270FlipH => 270,
    }
}

/// Apply an EXIF orientation, returning the upright image and its rotation.
pub fn apply_orientation(mut image: DynamicImage, orientation: Orientation) -> (DynamicImage, u16) {
    if orientation != Orientation::NoTransforms {
        image.apply_orientation(orientation);
    }
    (image, rotation_degrees(orientation))
}

// -- Tests --------------------------------------------------------------------
