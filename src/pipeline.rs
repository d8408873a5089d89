//! Applies an ordered operation list to a still or animated source.
//!
//! The list always starts with the geometry operation (omitted when it is
//! `Original`), followed by any nonzero color/contrast/brightness
//! adjustments, then an optional watermark — the order [`token_ops`]
//! produces. Still sources yield one raster; animated sources run the same
//! list over every composed frame, in parallel, keeping frame order and
//! delays.

use image::RgbaImage;
use rayon::prelude::*;

use crate::codec::Token;
use crate::enhance::{self, Watermark};
use crate::frames::{Animation, Frame, LoopCount};
use crate::geometry::ResizeOp;

/// One step of the transform pipeline.
#[derive(Debug, Clone)]
pub enum ImageOp {
    Geometry(ResizeOp),
    Color(i8),
    Contrast(i8),
    Brightness(i8),
    Watermark(Watermark),
}

impl ImageOp {
    pub fn apply(&self, img: RgbaImage) -> RgbaImage {
        match self {
            ImageOp::Geometry(op) => op.apply(&img),
            ImageOp::Color(v) => {
                let mut img = img;
                enhance::color(&mut img, *v);
                img
            }
            ImageOp::Contrast(v) => {
                let mut img = img;
                enhance::contrast(&mut img, *v);
                img
            }
            ImageOp::Brightness(v) => {
                let mut img = img;
                enhance::brightness(&mut img, *v);
                img
            }
            ImageOp::Watermark(wm) => {
                let mut img = img;
                enhance::watermark(&mut img, wm);
                img
            }
        }
    }
}

/// The operation list a token describes, in application order.
pub fn token_ops(token: &Token, watermark: Option<Watermark>) -> Vec<ImageOp> {
    let mut ops = Vec::new();
    if token.op != ResizeOp::Original {
        ops.push(ImageOp::Geometry(token.op));
    }
    if token.color != 0 {
        ops.push(ImageOp::Color(token.color));
    }
    if token.contrast != 0 {
        ops.push(ImageOp::Contrast(token.contrast));
    }
    if token.brightness != 0 {
        ops.push(ImageOp::Brightness(token.brightness));
    }
    if let Some(wm) = watermark {
        ops.push(ImageOp::Watermark(wm));
    }
    ops
}

/// A decoded source ready for transformation.
pub enum Source {
    Still(RgbaImage),
    Animated(Animation),
}

/// The transformed result, mirroring the source's frame structure.
pub enum Transformed {
    Still(RgbaImage),
    Animated {
        frames: Vec<Frame>,
        loop_count: LoopCount,
    },
}

fn apply_ops(img: RgbaImage, ops: &[ImageOp]) -> RgbaImage {
    ops.iter().fold(img, |img, op| op.apply(img))
}

/// Run the operation list over the source.
pub fn transform(source: Source, ops: &[ImageOp]) -> Transformed {
    match source {
        Source::Still(img) => Transformed::Still(apply_ops(img, ops)),
        Source::Animated(animation) => {
            let frames = animation
                .frames
                .into_par_iter()
                .map(|frame| Frame {
                    image: apply_ops(frame.image, ops),
                    delay_ms: frame.delay_ms,
                })
                .collect();
            Transformed::Animated {
                frames,
                loop_count: animation.loop_count,
            }
        }
    }
}
