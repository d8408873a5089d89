//! Frame model for animated sources.
//!
//! An animated source decodes into [`RawFrame`]s — each the updated region of
//! the logical screen, plus its position, disposal rule and delay. Raw frames
//! are turned into full-canvas [`Frame`]s by [`compose_frames`], a fold whose
//! per-frame step ([`compose_step`]) threads an explicit accumulator canvas:
//!
//! - a frame whose disposal says "combine with previous" (GIF disposal
//!   code 1) pastes its region onto the running canvas;
//! - any other frame starts a fresh transparent canvas and becomes the new
//!   accumulator outright.
//!
//! Keeping the step a standalone function makes the disposal rule testable
//! without touching GIF I/O.

use image::RgbaImage;
use image::imageops;

/// One full-canvas output frame with its display duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub image: RgbaImage,
    pub delay_ms: u32,
}

/// One decoded frame as stored in the source stream: only the updated region.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub region: RgbaImage,
    pub left: u32,
    pub top: u32,
    /// Disposal says to combine with the previous canvas (GIF code 1).
    pub combine: bool,
    pub delay_ms: u32,
}

/// Animation loop metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCount {
    Infinite,
    Finite(u16),
}

/// A decoded animated source: composed frames sharing screen size and loop
/// metadata.
#[derive(Debug, Clone)]
pub struct Animation {
    pub width: u32,
    pub height: u32,
    pub frames: Vec<Frame>,
    pub loop_count: LoopCount,
}

/// One step of the composition fold: produce the canvas for `frame` given the
/// accumulated canvas of the previous frames.
pub fn compose_step(
    screen: (u32, u32),
    acc: Option<RgbaImage>,
    frame: &RawFrame,
) -> RgbaImage {
    let mut canvas = match acc {
        Some(canvas) if frame.combine => canvas,
        _ => RgbaImage::new(screen.0, screen.1),
    };
    imageops::overlay(
        &mut canvas,
        &frame.region,
        frame.left as i64,
        frame.top as i64,
    );
    canvas
}

/// Fold raw frames into full-canvas frames, threading the accumulator through
/// [`compose_step`]. Delays carry over unchanged.
pub fn compose_frames(
    screen: (u32, u32),
    raw: impl IntoIterator<Item = RawFrame>,
) -> Vec<Frame> {
    let (frames, _) = raw.into_iter().fold(
        (Vec::new(), None::<RgbaImage>),
        |(mut frames, acc), raw_frame| {
            let canvas = compose_step(screen, acc, &raw_frame);
            frames.push(Frame {
                image: canvas.clone(),
                delay_ms: raw_frame.delay_ms,
            });
            (frames, Some(canvas))
        },
    );
    frames
}

/// Decode a GIF byte stream into a composed [`Animation`].
pub fn decode_gif(bytes: &[u8]) -> Result<Animation, gif::DecodingError> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::RGBA);
    let mut decoder = options.read_info(std::io::Cursor::new(bytes))?;

    let screen = (decoder.width() as u32, decoder.height() as u32);
    let mut raw = Vec::new();
    while let Some(frame) = decoder.read_next_frame()? {
        let (w, h) = (frame.width as u32, frame.height as u32);
        let region = RgbaImage::from_raw(w, h, frame.buffer.to_vec()).ok_or_else(|| {
            gif::DecodingError::from(std::io::Error::other("frame buffer size mismatch"))
        })?;
        raw.push(RawFrame {
            region,
            left: frame.left as u32,
            top: frame.top as u32,
            combine: frame.dispose == gif::DisposalMethod::Keep,
            delay_ms: frame.delay as u32 * 10,
        });
    }

    let loop_count = match decoder.repeat() {
        gif::Repeat::Infinite => LoopCount::Infinite,
        gif::Repeat::Finite(n) => LoopCount::Finite(n),
    };

    Ok(Animation {
        width: screen.0,
        height: screen.1,
        frames: compose_frames(screen, raw),
        loop_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(rgba))
    }

    fn full_frame(color: [u8; 4], combine: bool) -> RawFrame {
        RawFrame {
            region: solid(4, 4, color),
            left: 0,
            top: 0,
            combine,
            delay_ms: 100,
        }
    }

    #[test]
    fn replacing_frame_becomes_the_canvas() {
        let step = compose_step((4, 4), None, &full_frame([255, 0, 0, 255], false));
        assert_eq!(step.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn combining_frame_pastes_only_its_region() {
        let red = compose_step((4, 4), None, &full_frame([255, 0, 0, 255], false));
        let patch = RawFrame {
            region: solid(2, 2, [0, 255, 0, 255]),
            left: 2,
            top: 2,
            combine: true,
            delay_ms: 100,
        };
        let step = compose_step((4, 4), Some(red), &patch);
        // The patched corner changed; the rest of the canvas survives.
        assert_eq!(step.get_pixel(3, 3).0, [0, 255, 0, 255]);
        assert_eq!(step.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn combining_without_a_previous_canvas_starts_fresh() {
        let patch = RawFrame {
            region: solid(2, 2, [0, 255, 0, 255]),
            left: 2,
            top: 2,
            combine: true,
            delay_ms: 100,
        };
        let step = compose_step((4, 4), None, &patch);
        assert_eq!(step.get_pixel(3, 3).0, [0, 255, 0, 255]);
        // Outside the region the canvas is transparent.
        assert_eq!(step.get_pixel(0, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn replacing_frame_discards_the_accumulator() {
        let red = compose_step((4, 4), None, &full_frame([255, 0, 0, 255], false));
        let patch = RawFrame {
            region: solid(2, 2, [0, 255, 0, 255]),
            left: 2,
            top: 2,
            combine: false,
            delay_ms: 100,
        };
        let step = compose_step((4, 4), Some(red), &patch);
        assert_eq!(step.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(step.get_pixel(3, 3).0, [0, 255, 0, 255]);
    }

    #[test]
    fn transparent_region_pixels_do_not_erase_the_canvas() {
        let red = compose_step((4, 4), None, &full_frame([255, 0, 0, 255], false));
        let patch = RawFrame {
            region: solid(2, 2, [0, 0, 0, 0]),
            left: 0,
            top: 0,
            combine: true,
            delay_ms: 100,
        };
        let step = compose_step((4, 4), Some(red), &patch);
        assert_eq!(step.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn fold_accumulates_across_frames() {
        let frames = compose_frames(
            (4, 4),
            vec![
                full_frame([255, 0, 0, 255], false),
                RawFrame {
                    region: solid(2, 2, [0, 255, 0, 255]),
                    left: 0,
                    top: 0,
                    combine: true,
                    delay_ms: 40,
                },
                RawFrame {
                    region: solid(2, 2, [0, 0, 255, 255]),
                    left: 2,
                    top: 0,
                    combine: true,
                    delay_ms: 60,
                },
            ],
        );
        assert_eq!(frames.len(), 3);
        // Frame 3 carries both earlier patches on the red base.
        let last = &frames[2].image;
        assert_eq!(last.get_pixel(0, 0).0, [0, 255, 0, 255]);
        assert_eq!(last.get_pixel(3, 0).0, [0, 0, 255, 255]);
        assert_eq!(last.get_pixel(0, 3).0, [255, 0, 0, 255]);
        // Delays carry over per frame.
        let delays: Vec<u32> = frames.iter().map(|f| f.delay_ms).collect();
        assert_eq!(delays, [100, 40, 60]);
    }

    #[test]
    fn gif_round_trip_composes_full_canvases() {
        // Encode a 2-frame GIF: a red base frame, then a small patch with
        // disposal "keep" so it combines with the base. Explicit single-color
        // palettes keep the decoded values exact.
        let mut bytes = Vec::new();
        {
            let mut encoder = gif::Encoder::new(&mut bytes, 4, 4, &[]).unwrap();

            let mut base = gif::Frame::default();
            base.width = 4;
            base.height = 4;
            base.buffer = vec![0u8; 16].into();
            base.palette = Some(vec![255, 0, 0]);
            base.delay = 5;
            base.dispose = gif::DisposalMethod::Keep;
            encoder.write_frame(&base).unwrap();

            let mut patch = gif::Frame::default();
            patch.width = 2;
            patch.height = 2;
            patch.left = 2;
            patch.top = 2;
            patch.buffer = vec![0u8; 4].into();
            patch.palette = Some(vec![0, 0, 255]);
            patch.delay = 7;
            patch.dispose = gif::DisposalMethod::Keep;
            encoder.write_frame(&patch).unwrap();
        }

        let animation = decode_gif(&bytes).unwrap();
        assert_eq!((animation.width, animation.height), (4, 4));
        assert_eq!(animation.frames.len(), 2);
        assert_eq!(animation.frames[0].delay_ms, 50);
        assert_eq!(animation.frames[1].delay_ms, 70);

        let last = &animation.frames[1].image;
        assert_eq!(last.dimensions(), (4, 4));
        // The patch landed in the corner; the base shows elsewhere.
        assert_eq!(last.get_pixel(3, 3).0, [0, 0, 255, 255]);
        assert_eq!(last.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn decode_rejects_non_gif_bytes() {
        assert!(decode_gif(b"definitely not a gif").is_err());
    }
}
