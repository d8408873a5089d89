//! Linear color enhancement passes and watermark compositing.
//!
//! Each adjustment carries a signed percentage `v ∈ [-100, 100]`; the
//! effective multiplier is `1 + v/100`, so `0` is identity, `-100` fully
//! removes the quality being adjusted and `+100` doubles it. Every pass is an
//! independent linear blend toward a per-pass reference:
//!
//! - brightness blends toward black;
//! - contrast blends toward the frame's mean luma;
//! - color (saturation) blends each pixel toward its own luma.
//!
//! Alpha is never touched.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

/// Effective multiplier for a signed percentage.
fn factor(value: i8) -> f32 {
    1.0 + f32::from(value.clamp(-100, 100)) / 100.0
}

/// Rec.601 integer luma.
fn luma(p: &Rgba<u8>) -> u32 {
    (299 * p[0] as u32 + 587 * p[1] as u32 + 114 * p[2] as u32) / 1000
}

fn blend(channel: u8, reference: f32, f: f32) -> u8 {
    (reference + (channel as f32 - reference) * f)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Brightness: blend toward black.
pub fn brightness(img: &mut RgbaImage, value: i8) {
    let f = factor(value);
    for p in img.pixels_mut() {
        for c in 0..3 {
            p[c] = blend(p[c], 0.0, f);
        }
    }
}

/// Contrast: blend toward the frame's mean luma.
pub fn contrast(img: &mut RgbaImage, value: i8) {
    let f = factor(value);
    let pixels = (img.width() as u64 * img.height() as u64).max(1);
    let sum: u64 = img.pixels().map(|p| luma(p) as u64).sum();
    let mean = ((sum + pixels / 2) / pixels) as f32;
    for p in img.pixels_mut() {
        for c in 0..3 {
            p[c] = blend(p[c], mean, f);
        }
    }
}

/// Color (saturation): blend each pixel toward its own luma.
pub fn color(img: &mut RgbaImage, value: i8) {
    let f = factor(value);
    for p in img.pixels_mut() {
        let gray = luma(p) as f32;
        for c in 0..3 {
            p[c] = blend(p[c], gray, f);
        }
    }
}

/// A watermark: the mark itself plus an optional background frame image that
/// is composited underneath it.
#[derive(Debug, Clone)]
pub struct Watermark {
    pub mark: RgbaImage,
    pub frame: Option<RgbaImage>,
}

impl Watermark {
    pub fn new(mark: RgbaImage) -> Self {
        Self { mark, frame: None }
    }

    pub fn with_frame(mark: RgbaImage, frame: RgbaImage) -> Self {
        Self {
            mark,
            frame: Some(frame),
        }
    }
}

/// Composite `watermark` centered onto `canvas` via alpha blending.
///
/// The mark scales by `min(0.9·W/mark_w, 0.9·H/mark_h)`. Without a frame the
/// ratio is unclamped, so a small mark grows to fill 90% of the canvas; with
/// a frame the frame is first stretched to 90% of the canvas and composited,
/// and the mark's ratio additionally clamps to 1 so it never grows.
pub fn watermark(canvas: &mut RgbaImage, watermark: &Watermark) {
    let (cw, ch) = canvas.dimensions();

    let mut ratio_cap = f32::INFINITY;
    if let Some(frame) = &watermark.frame {
        let fw = ((cw as f32 * 0.9) as u32).max(1);
        let fh = ((ch as f32 * 0.9) as u32).max(1);
        let scaled = imageops::resize(frame, fw, fh, FilterType::Lanczos3);
        imageops::overlay(
            canvas,
            &scaled,
            ((cw - fw) / 2) as i64,
            ((ch - fh) / 2) as i64,
        );
        ratio_cap = 1.0;
    }

    let (mw, mh) = watermark.mark.dimensions();
    let ratio = f32::min(
        cw as f32 * 0.9 / mw as f32,
        ch as f32 * 0.9 / mh as f32,
    )
    .min(ratio_cap);

    let w = ((mw as f32 * ratio) as u32).max(1);
    let h = ((mh as f32 * ratio) as u32).max(1);
    if (w, h) != (mw, mh) {
        let scaled = imageops::resize(&watermark.mark, w, h, FilterType::Lanczos3);
        imageops::overlay(
            canvas,
            &scaled,
            ((cw.saturating_sub(w)) / 2) as i64,
            ((ch.saturating_sub(h)) / 2) as i64,
        );
    } else {
        imageops::overlay(
            canvas,
            &watermark.mark,
            ((cw.saturating_sub(w)) / 2) as i64,
            ((ch.saturating_sub(h)) / 2) as i64,
        );
    }
}
