//! Resize/crop policies and their final-size arithmetic.
//!
//! Every policy is a variant of [`ResizeOp`], a closed enum. A policy can do
//! two things: predict the output size of a raster without touching pixels
//! ([`ResizeOp::final_size`]) and actually transform a raster
//! ([`ResizeOp::apply`]). The two must agree bit-for-bit, so both are derived
//! from a shared [`GeometryPlan`] — a resize step plus an optional crop box —
//! computed once by [`ResizeOp::plan`]. `final_size` folds the plan
//! arithmetically; `apply` executes it with Lanczos3 resampling.
//!
//! Dimension conventions:
//! - a `0` width or height means "no constraint" for that axis;
//! - ratio math is done in `f64` and truncated toward zero;
//! - every computed dimension is floored to at least 1 pixel;
//! - nothing ever upscales, except `Force`'s exact-resize path and the
//!   cover-resize step of `FitAll` when the aspect ratios diverge.

use image::RgbaImage;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};

/// A crop rectangle in `(left, top, width, height)` form, as carried by
/// [`ResizeOp::Manual`]. Values are wire-clamped to `u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
}

impl CropRect {
    /// The all-zero rectangle means "no crop" on the wire; normalize it away.
    pub fn normalize(self) -> Option<CropRect> {
        if self.left == 0 && self.top == 0 && self.width == 0 && self.height == 0 {
            None
        } else {
            Some(self)
        }
    }

    /// A crop with a zero-sized window selects nothing and is skipped.
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One resize/crop policy. See each variant for its sizing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOp {
    /// Leave the raster untouched.
    Original,
    /// Scale down (never up) to `width`; height follows proportionally.
    /// With a nonzero `height`, shrink uniformly until both bounds hold.
    FitWidth { width: u16, height: u16 },
    /// Scale-to-cover `width`×`height`, then center-crop to exactly that box.
    /// Identity when the source already fits within both bounds.
    FitAll { width: u16, height: u16 },
    /// Shrink (never grow) until both axes fit inside the box, aspect kept.
    MaxBox { width: u16, height: u16 },
    /// Resize to exactly `width`×`height` (aspect *not* kept) whenever the
    /// source exceeds either bound; identity otherwise.
    Force { width: u16, height: u16 },
    /// Resize to exactly `width`×`height`, then apply an optional crop
    /// rectangle clamped to the resized bounds.
    Manual {
        width: u16,
        height: u16,
        crop: Option<CropRect>,
    },
}

/// A crop window in resized-raster coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// The concrete steps a [`ResizeOp`] performs on a raster of a given size:
/// an optional exact resize followed by an optional crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeometryPlan {
    pub resize: Option<(u32, u32)>,
    pub crop: Option<CropBox>,
}

impl GeometryPlan {
    /// The do-nothing plan.
    pub const IDENTITY: GeometryPlan = GeometryPlan {
        resize: None,
        crop: None,
    };

    pub fn is_identity(&self) -> bool {
        self.resize.is_none() && self.crop.is_none()
    }

    /// Output dimensions of a `src_w`×`src_h` raster run through this plan.
    pub fn final_size(&self, src_w: u32, src_h: u32) -> (u32, u32) {
        let (w, h) = self.resize.unwrap_or((src_w, src_h));
        match self.crop {
            Some(c) => (c.width, c.height),
            None => (w, h),
        }
    }
}

/// Truncate toward zero, flooring at one pixel.
fn trunc1(v: f64) -> u32 {
    (v as u32).max(1)
}

/// Shrink both axes by `max(src_w/w, src_h/h)`, truncating.
fn shrink_to_bounds(src_w: u32, src_h: u32, w: u32, h: u32) -> (u32, u32) {
    let scale = f64::max(src_w as f64 / w as f64, src_h as f64 / h as f64);
    (
        trunc1(src_w as f64 / scale),
        trunc1(src_h as f64 / scale),
    )
}

impl ResizeOp {
    /// Compute the geometry steps for a source of `src_w`×`src_h`.
    ///
    /// Pure arithmetic; no raster access. Both dimensions must be nonzero
    /// (rasters always are).
    pub fn plan(&self, src_w: u32, src_h: u32) -> GeometryPlan {
        match *self {
            ResizeOp::Original => GeometryPlan::IDENTITY,

            ResizeOp::FitWidth { width: 0, .. } => GeometryPlan::IDENTITY,
            ResizeOp::FitWidth { width, height: 0 } => {
                let w = width as u32;
                if src_w > w {
                    let h = trunc1(src_h as f64 * w as f64 / src_w as f64);
                    GeometryPlan {
                        resize: Some((w, h)),
                        crop: None,
                    }
                } else {
                    GeometryPlan::IDENTITY
                }
            }
            ResizeOp::FitWidth { width, height } => {
                let (w, h) = (width as u32, height as u32);
                if src_w > w || src_h > h {
                    GeometryPlan {
                        resize: Some(shrink_to_bounds(src_w, src_h, w, h)),
                        crop: None,
                    }
                } else {
                    GeometryPlan::IDENTITY
                }
            }

            ResizeOp::FitAll { width, height } => {
                let (w, h) = (width as u32, height as u32);
                if w == 0 || h == 0 || (src_w <= w && src_h <= h) {
                    return GeometryPlan::IDENTITY;
                }
                // Cover: match the tighter axis exactly, overflow the other,
                // then center-crop the overflow.
                if src_w as u64 * h as u64 <= w as u64 * src_h as u64 {
                    let rh = trunc1(src_h as f64 * w as f64 / src_w as f64);
                    GeometryPlan {
                        resize: Some((w, rh)),
                        crop: Some(CropBox {
                            x: 0,
                            y: (rh - h) / 2,
                            width: w,
                            height: h,
                        }),
                    }
                } else {
                    let rw = trunc1(src_w as f64 * h as f64 / src_h as f64);
                    GeometryPlan {
                        resize: Some((rw, h)),
                        crop: Some(CropBox {
                            x: (rw - w) / 2,
                            y: 0,
                            width: w,
                            height: h,
                        }),
                    }
                }
            }

            ResizeOp::MaxBox { width, height } => {
                let (w, h) = (width as u32, height as u32);
                if w == 0 || h == 0 || (src_w <= w && src_h <= h) {
                    GeometryPlan::IDENTITY
                } else {
                    GeometryPlan {
                        resize: Some(shrink_to_bounds(src_w, src_h, w, h)),
                        crop: None,
                    }
                }
            }

            ResizeOp::Force { width, height } => {
                let (w, h) = (width as u32, height as u32);
                if w == 0 || h == 0 || (src_w <= w && src_h <= h) {
                    GeometryPlan::IDENTITY
                } else {
                    GeometryPlan {
                        resize: Some((w, h)),
                        crop: None,
                    }
                }
            }

            ResizeOp::Manual {
                width,
                height,
                crop,
            } => {
                let (w, h) = (width as u32, height as u32);
                if w == 0 || h == 0 {
                    return GeometryPlan::IDENTITY;
                }
                let crop = crop.filter(|c| !c.is_degenerate()).map(|c| {
                    let x0 = (c.left as u32).min(w - 1);
                    let y0 = (c.top as u32).min(h - 1);
                    let x1 = (c.left as u32 + c.width as u32).min(w).max(x0 + 1);
                    let y1 = (c.top as u32 + c.height as u32).min(h).max(y0 + 1);
                    CropBox {
                        x: x0,
                        y: y0,
                        width: x1 - x0,
                        height: y1 - y0,
                    }
                });
                GeometryPlan {
                    resize: Some((w, h)),
                    crop,
                }
            }
        }
    }

    /// Output dimensions for a `src_w`×`src_h` source. Pure arithmetic.
    ///
    /// # Examples
    /// ```
    /// # use thumbtoken::geometry::ResizeOp;
    /// // Scale down to width 200, height follows: 400×100 → 200×50.
    /// let op = ResizeOp::FitWidth { width: 200, height: 0 };
    /// assert_eq!(op.final_size(400, 100), (200, 50));
    ///
    /// // Cover-and-crop fills the box exactly: 400×200 → 100×100.
    /// let op = ResizeOp::FitAll { width: 100, height: 100 };
    /// assert_eq!(op.final_size(400, 200), (100, 100));
    /// ```
    pub fn final_size(&self, src_w: u32, src_h: u32) -> (u32, u32) {
        self.plan(src_w, src_h).final_size(src_w, src_h)
    }

    /// Execute the plan on a raster. Dimensions always equal
    /// [`final_size`](Self::final_size) of the input's dimensions.
    pub fn apply(&self, img: &RgbaImage) -> RgbaImage {
        let plan = self.plan(img.width(), img.height());
        let resized = match plan.resize {
            Some((w, h)) if (w, h) != img.dimensions() => {
                imageops::resize(img, w, h, FilterType::Lanczos3)
            }
            _ => img.clone(),
        };
        match plan.crop {
            Some(c) => imageops::crop_imm(&resized, c.x, c.y, c.width, c.height).to_image(),
            None => resized,
        }
    }

    /// Derive a [`ResizeOp::Manual`] from a `FitAll` plus a focus point in
    /// source coordinates, so the crop window tracks the point instead of the
    /// center. Returns `None` when the op is not a `FitAll`, a bound is
    /// unset, or the source already fits the box.
    pub fn crop_with_focus(&self, src_w: u32, src_h: u32, x: u32, y: u32) -> Option<ResizeOp> {
        let ResizeOp::FitAll { width, height } = *self else {
            return None;
        };
        let (w, h) = (width as u32, height as u32);
        if w == 0 || h == 0 || (src_w <= w && src_h <= h) {
            return None;
        }

        let clamp16 = |v: u32| v.min(u16::MAX as u32) as u16;

        if src_w as u64 * h as u64 <= w as u64 * src_h as u64 {
            // Width fills the box; the crop slides vertically.
            let ratio = w as f64 / src_w as f64;
            let rh = trunc1(src_h as f64 * ratio);
            let fy = (y as f64 * ratio) as u32;
            let half = h / 2;
            let fy = fy.clamp(half, rh - half);
            Some(ResizeOp::Manual {
                width: clamp16(w),
                height: clamp16(rh),
                crop: Some(CropRect {
                    left: 0,
                    top: clamp16(fy - half),
                    width: clamp16(w),
                    height: clamp16(h),
                }),
            })
        } else {
            let ratio = h as f64 / src_h as f64;
            let rw = trunc1(src_w as f64 * ratio);
            let fx = (x as f64 * ratio) as u32;
            let half = w / 2;
            let fx = fx.clamp(half, rw - half);
            Some(ResizeOp::Manual {
                width: clamp16(rw),
                height: clamp16(h),
                crop: Some(CropRect {
                    left: clamp16(fx - half),
                    top: 0,
                    width: clamp16(w),
                    height: clamp16(h),
                }),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgba([255, 255, 255, 255])
            } else {
                image::Rgba([0, 0, 0, 255])
            }
        })
    }

    /// apply() and final_size() must agree for every op and source size.
    fn assert_agreement(op: ResizeOp, src_w: u32, src_h: u32) {
        let out = op.apply(&checkerboard(src_w, src_h));
        assert_eq!(
            out.dimensions(),
            op.final_size(src_w, src_h),
            "{op:?} on {src_w}x{src_h}"
        );
    }

    // =========================================================================
    // FitWidth
    // =========================================================================

    #[test]
    fn fit_width_scales_down_proportionally() {
        let op = ResizeOp::FitWidth {
            width: 200,
            height: 0,
        };
        assert_eq!(op.final_size(400, 100), (200, 50));
        assert_agreement(op, 400, 100);
    }

    #[test]
    fn fit_width_never_upscales() {
        let op = ResizeOp::FitWidth {
            width: 200,
            height: 0,
        };
        assert_eq!(op.final_size(150, 80), (150, 80));
    }

    #[test]
    fn fit_width_zero_width_is_identity() {
        let op = ResizeOp::FitWidth {
            width: 0,
            height: 100,
        };
        assert_eq!(op.final_size(640, 480), (640, 480));
    }

    #[test]
    fn fit_width_with_height_bound_shrinks_uniformly() {
        // scale = max(400/200, 300/100) = 3 → 133×100
        let op = ResizeOp::FitWidth {
            width: 200,
            height: 100,
        };
        assert_eq!(op.final_size(400, 300), (133, 100));
        assert_agreement(op, 400, 300);
    }

    #[test]
    fn fit_width_tall_sliver_floors_at_one_pixel() {
        let op = ResizeOp::FitWidth {
            width: 50,
            height: 50,
        };
        let (w, h) = op.final_size(10, 5000);
        assert_eq!(h, 50);
        assert!(w >= 1);
        assert_agreement(op, 10, 5000);
    }

    // =========================================================================
    // FitAll
    // =========================================================================

    #[test]
    fn fit_all_covers_and_center_crops() {
        let op = ResizeOp::FitAll {
            width: 100,
            height: 100,
        };
        assert_eq!(op.final_size(400, 200), (100, 100));
        let plan = op.plan(400, 200);
        assert_eq!(plan.resize, Some((200, 100)));
        assert_eq!(
            plan.crop,
            Some(CropBox {
                x: 50,
                y: 0,
                width: 100,
                height: 100
            })
        );
        assert_agreement(op, 400, 200);
    }

    #[test]
    fn fit_all_tall_source_crops_vertically() {
        let op = ResizeOp::FitAll {
            width: 100,
            height: 100,
        };
        let plan = op.plan(200, 400);
        assert_eq!(plan.resize, Some((100, 200)));
        assert_eq!(
            plan.crop,
            Some(CropBox {
                x: 0,
                y: 50,
                width: 100,
                height: 100
            })
        );
        assert_agreement(op, 200, 400);
    }

    #[test]
    fn fit_all_within_bounds_is_identity() {
        let op = ResizeOp::FitAll {
            width: 100,
            height: 100,
        };
        assert_eq!(op.final_size(80, 60), (80, 60));
    }

    #[test]
    fn fit_all_zero_bound_is_identity() {
        let op = ResizeOp::FitAll {
            width: 0,
            height: 100,
        };
        assert_eq!(op.final_size(640, 480), (640, 480));
    }

    // =========================================================================
    // MaxBox
    // =========================================================================

    #[test]
    fn max_box_shrinks_to_fit_both_axes() {
        let op = ResizeOp::MaxBox {
            width: 100,
            height: 100,
        };
        assert_eq!(op.final_size(400, 200), (100, 50));
        assert_agreement(op, 400, 200);
    }

    #[test]
    fn max_box_within_bounds_is_identity() {
        let op = ResizeOp::MaxBox {
            width: 100,
            height: 100,
        };
        assert_eq!(op.final_size(50, 50), (50, 50));
        assert_agreement(op, 50, 50);
    }

    #[test]
    fn max_box_truncates_the_scaled_axis() {
        // scale = 300/100 = 3 → 640/3 = 213.33 → 213
        let op = ResizeOp::MaxBox {
            width: 1000,
            height: 100,
        };
        assert_eq!(op.final_size(640, 300), (213, 100));
        assert_agreement(op, 640, 300);
    }

    // =========================================================================
    // Force
    // =========================================================================

    #[test]
    fn force_resizes_exactly_when_exceeding() {
        let op = ResizeOp::Force {
            width: 100,
            height: 100,
        };
        assert_eq!(op.final_size(400, 50), (100, 100));
        assert_agreement(op, 400, 50);
    }

    #[test]
    fn force_within_bounds_is_identity() {
        let op = ResizeOp::Force {
            width: 100,
            height: 100,
        };
        assert_eq!(op.final_size(80, 90), (80, 90));
        assert_agreement(op, 80, 90);
    }

    // =========================================================================
    // Manual
    // =========================================================================

    #[test]
    fn manual_crop_after_exact_resize() {
        let op = ResizeOp::Manual {
            width: 100,
            height: 100,
            crop: Some(CropRect {
                left: 10,
                top: 10,
                width: 50,
                height: 50,
            }),
        };
        assert_eq!(op.final_size(640, 480), (50, 50));
        assert_eq!(op.final_size(20, 20), (50, 50));
        assert_agreement(op, 640, 480);
    }

    #[test]
    fn manual_without_crop_is_exact_resize() {
        let op = ResizeOp::Manual {
            width: 120,
            height: 80,
            crop: None,
        };
        assert_eq!(op.final_size(640, 480), (120, 80));
        assert_agreement(op, 640, 480);
    }

    #[test]
    fn manual_crop_clamps_to_resized_bounds() {
        let op = ResizeOp::Manual {
            width: 100,
            height: 100,
            crop: Some(CropRect {
                left: 80,
                top: 80,
                width: 50,
                height: 50,
            }),
        };
        assert_eq!(op.final_size(640, 480), (20, 20));
        assert_agreement(op, 640, 480);
    }

    #[test]
    fn manual_degenerate_crop_is_skipped() {
        let op = ResizeOp::Manual {
            width: 100,
            height: 100,
            crop: Some(CropRect {
                left: 10,
                top: 10,
                width: 0,
                height: 50,
            }),
        };
        assert_eq!(op.final_size(640, 480), (100, 100));
    }

    #[test]
    fn all_zero_crop_normalizes_to_none() {
        let crop = CropRect {
            left: 0,
            top: 0,
            width: 0,
            height: 0,
        };
        assert_eq!(crop.normalize(), None);
        let crop = CropRect {
            left: 0,
            top: 0,
            width: 5,
            height: 5,
        };
        assert!(crop.normalize().is_some());
    }

    // =========================================================================
    // Cross-op properties
    // =========================================================================

    #[test]
    fn no_op_upscales_a_fitting_source() {
        let ops = [
            ResizeOp::FitWidth {
                width: 200,
                height: 200,
            },
            ResizeOp::FitAll {
                width: 200,
                height: 200,
            },
            ResizeOp::MaxBox {
                width: 200,
                height: 200,
            },
            ResizeOp::Force {
                width: 200,
                height: 200,
            },
        ];
        for op in ops {
            assert_eq!(op.final_size(150, 120), (150, 120), "{op:?}");
        }
    }

    #[test]
    fn reapplication_is_idempotent_on_size() {
        let ops = [
            ResizeOp::FitWidth {
                width: 200,
                height: 0,
            },
            ResizeOp::FitWidth {
                width: 200,
                height: 150,
            },
            ResizeOp::FitAll {
                width: 100,
                height: 100,
            },
            ResizeOp::MaxBox {
                width: 120,
                height: 90,
            },
            ResizeOp::Force {
                width: 100,
                height: 100,
            },
        ];
        for op in ops {
            for (sw, sh) in [(640, 480), (480, 640), (3000, 40), (40, 3000)] {
                let (w1, h1) = op.final_size(sw, sh);
                let (w2, h2) = op.final_size(w1, h1);
                assert_eq!((w1, h1), (w2, h2), "{op:?} on {sw}x{sh}");
            }
        }
    }

    // =========================================================================
    // Focus-point crops
    // =========================================================================

    #[test]
    fn focus_crop_tracks_the_point() {
        let op = ResizeOp::FitAll {
            width: 100,
            height: 100,
        };
        // 400×200 source, focus near the right edge.
        let manual = op.crop_with_focus(400, 200, 380, 100).unwrap();
        let ResizeOp::Manual {
            width,
            height,
            crop: Some(crop),
        } = manual
        else {
            panic!("expected a manual op with a crop, got {manual:?}");
        };
        // Cover-resize is 200×100; focus x scales to 190, clamped to 150.
        assert_eq!((width, height), (200, 100));
        assert_eq!(crop.left, 100);
        assert_eq!((crop.width, crop.height), (100, 100));
        // The derived op produces the same output size as the FitAll.
        assert_eq!(manual.final_size(400, 200), op.final_size(400, 200));
    }

    #[test]
    fn focus_crop_centers_when_point_is_central() {
        let op = ResizeOp::FitAll {
            width: 100,
            height: 100,
        };
        let manual = op.crop_with_focus(200, 400, 100, 200).unwrap();
        let ResizeOp::Manual {
            crop: Some(crop), ..
        } = manual
        else {
            panic!("expected a crop");
        };
        // Cover-resize is 100×200; centered focus leaves a centered crop.
        assert_eq!(crop.top, 50);
    }

    #[test]
    fn focus_crop_none_when_source_fits() {
        let op = ResizeOp::FitAll {
            width: 100,
            height: 100,
        };
        assert_eq!(op.crop_with_focus(80, 80, 10, 10), None);
    }

    #[test]
    fn focus_crop_none_for_other_ops() {
        let op = ResizeOp::MaxBox {
            width: 100,
            height: 100,
        };
        assert_eq!(op.crop_with_focus(400, 400, 10, 10), None);
    }
}
