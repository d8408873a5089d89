//! Thumbnail generation: decode the source, run the pipeline, serialize the
//! derivative, write atomically.
//!
//! The renderer is handed an already-verified [`Token`] — codec failures
//! never reach this layer. Its own failures are typed [`RenderError`]s that
//! chain their cause; nothing here falls back to a default transformation,
//! and no partial file is ever left at the destination. The one deliberate
//! softness: a requested or inherited output format outside JPEG/PNG/GIF
//! falls back to JPEG instead of failing.

use std::path::{Path, PathBuf};

use image::codecs::gif::{GifEncoder, Repeat};
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, ImageFormat, RgbImage, RgbaImage};
use thiserror::Error;
use tracing::{error, warn};

use crate::codec::{OutputFormat, Token};
use crate::enhance::Watermark;
use crate::frames::{self, Frame, LoopCount};
use crate::optimize::PostProcess;
use crate::pipeline::{self, Source, Transformed};
use crate::tmpfile;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot read source image {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode source image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("cannot decode animated source: {0}")]
    DecodeAnimation(#[from] gif::DecodingError),
    #[error("source stream contains no frames")]
    NoFrames,
    #[error("output of {width}x{height} exceeds the JPEG size limit")]
    TooLarge { width: u32, height: u32 },
    #[error("cannot encode JPEG output: {0}")]
    EncodeJpeg(#[from] jpeg_encoder::EncodingError),
    #[error("cannot encode output image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-render settings that are not part of the token vocabulary.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub watermark: Option<Watermark>,
    /// Copy EXIF/IPTC/ICC from the source when both sides are JPEG.
    pub metadata: bool,
    /// Opaque background color alpha flattens onto for JPEG output.
    pub background: [u8; 3],
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            watermark: None,
            metadata: false,
            background: [255, 255, 255],
        }
    }
}

/// The format actually written, after `Keep` resolution and fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Jpeg { progressive: bool },
    Png,
    Gif,
}

impl TargetFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Jpeg { .. } => "jpg",
            TargetFormat::Png => "png",
            TargetFormat::Gif => "gif",
        }
    }
}

/// A finished derivative: the encoded bytes and the format they are in.
#[derive(Debug)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    pub target: TargetFormat,
}

/// Resolve the token's requested format against the source's own format.
/// Unsupported combinations fall back to JPEG.
fn resolve_target(requested: OutputFormat, source: ImageFormat) -> TargetFormat {
    match requested {
        OutputFormat::Jpeg => TargetFormat::Jpeg { progressive: false },
        OutputFormat::JpegProgressive => TargetFormat::Jpeg { progressive: true },
        OutputFormat::Png => TargetFormat::Png,
        OutputFormat::Gif => TargetFormat::Gif,
        OutputFormat::Keep => match source {
            ImageFormat::Jpeg => TargetFormat::Jpeg { progressive: false },
            ImageFormat::Png => TargetFormat::Png,
            ImageFormat::Gif => TargetFormat::Gif,
            _ => TargetFormat::Jpeg { progressive: false },
        },
    }
}

/// Flatten alpha onto an opaque background (JPEG has no alpha channel).
fn flatten_alpha(img: &RgbaImage, background: [u8; 3]) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let p = img.get_pixel(x, y);
        let a = p[3] as u32;
        let blend = |c: u8, b: u8| (((c as u32) * a + (b as u32) * (255 - a) + 127) / 255) as u8;
        image::Rgb([
            blend(p[0], background[0]),
            blend(p[1], background[1]),
            blend(p[2], background[2]),
        ])
    })
}

fn first_frame(transformed: Transformed) -> Result<RgbaImage, RenderError> {
    match transformed {
        Transformed::Still(img) => Ok(img),
        Transformed::Animated { frames, .. } => frames
            .into_iter()
            .next()
            .map(|frame| frame.image)
            .ok_or(RenderError::NoFrames),
    }
}

fn encode_jpeg(
    out: &mut Vec<u8>,
    img: &RgbaImage,
    quality: u8,
    progressive: bool,
    background: [u8; 3],
) -> Result<(), RenderError> {
    let rgb = flatten_alpha(img, background);
    let (width, height) = rgb.dimensions();
    let (w, h) = match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => return Err(RenderError::TooLarge { width, height }),
    };
    let mut encoder = jpeg_encoder::Encoder::new(&mut *out, quality);
    if progressive {
        encoder.set_progressive(true);
    }
    encoder.encode(rgb.as_raw(), w, h, jpeg_encoder::ColorType::Rgb)?;
    Ok(())
}

fn encode_png(out: &mut Vec<u8>, img: &RgbaImage, optimize: bool) -> Result<(), RenderError> {
    let compression = if optimize {
        CompressionType::Best
    } else {
        CompressionType::Default
    };
    let encoder = PngEncoder::new_with_quality(&mut *out, compression, PngFilter::Adaptive);
    encoder
        .write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(RenderError::Encode)
}

fn encode_gif(
    out: &mut Vec<u8>,
    frames: Vec<Frame>,
    loop_count: LoopCount,
    optimize: bool,
) -> Result<(), RenderError> {
    if frames.is_empty() {
        return Err(RenderError::NoFrames);
    }
    // Speed 1 trades encode time for palette quality.
    let speed = if optimize { 1 } else { 10 };
    let mut encoder = GifEncoder::new_with_speed(&mut *out, speed);
    encoder
        .set_repeat(match loop_count {
            LoopCount::Infinite => Repeat::Infinite,
            LoopCount::Finite(n) => Repeat::Finite(n),
        })
        .map_err(RenderError::Encode)?;
    for frame in frames {
        let delay = image::Delay::from_numer_denom_ms(frame.delay_ms, 1);
        encoder
            .encode_frame(image::Frame::from_parts(frame.image, 0, 0, delay))
            .map_err(RenderError::Encode)?;
    }
    Ok(())
}

/// Copy the metadata whitelist — EXIF (APP1), IPTC resources (APP13) and the
/// ICC profile — from a source JPEG into a rendered one.
fn copy_jpeg_metadata(
    source: &[u8],
    rendered: &[u8],
) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
    use img_parts::jpeg::{Jpeg, markers};
    use img_parts::{ImageEXIF, ImageICC};

    let src = Jpeg::from_bytes(img_parts::Bytes::from(source.to_vec()))?;
    let mut out = Jpeg::from_bytes(img_parts::Bytes::from(rendered.to_vec()))?;

    if let Some(exif) = src.exif() {
        out.set_exif(Some(exif));
    }
    if let Some(icc) = src.icc_profile() {
        out.set_icc_profile(Some(icc));
    }

    let resources: Vec<_> = src
        .segments()
        .iter()
        .filter(|s| s.marker() == markers::APP13)
        .cloned()
        .collect();
    if !resources.is_empty() {
        let segments = out.segments_mut();
        // Keep APPn segments grouped at the front of the stream.
        let insert_at = segments
            .iter()
            .position(|s| !(markers::APP0..=markers::APP15).contains(&s.marker()))
            .unwrap_or(segments.len());
        for (offset, segment) in resources.into_iter().enumerate() {
            segments.insert(insert_at + offset, segment);
        }
    }

    let mut bytes = Vec::new();
    out.encoder().write_to(&mut bytes)?;
    Ok(bytes)
}

/// Orchestrates token-described rendering, with an injected list of
/// post-processing strategies run best-effort after each successful write.
#[derive(Default)]
pub struct Renderer {
    post_processors: Vec<Box<dyn PostProcess>>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_post_processor(mut self, processor: Box<dyn PostProcess>) -> Self {
        self.post_processors.push(processor);
        self
    }

    /// Render in memory: source bytes in, encoded derivative out.
    pub fn render_bytes(
        &self,
        token: &Token,
        source_bytes: &[u8],
        options: &RenderOptions,
    ) -> Result<Rendered, RenderError> {
        let source_format = image::guess_format(source_bytes).map_err(RenderError::Decode)?;
        let target = resolve_target(token.format, source_format);

        let source = if source_format == ImageFormat::Gif {
            Source::Animated(frames::decode_gif(source_bytes)?)
        } else {
            let img = image::load_from_memory_with_format(source_bytes, source_format)
                .map_err(RenderError::Decode)?;
            Source::Still(img.to_rgba8())
        };

        let ops = pipeline::token_ops(token, options.watermark.clone());
        let transformed = pipeline::transform(source, &ops);

        let mut bytes = Vec::new();
        match target {
            TargetFormat::Jpeg { progressive } => {
                let img = first_frame(transformed)?;
                encode_jpeg(
                    &mut bytes,
                    &img,
                    token.quality.value(),
                    progressive,
                    options.background,
                )?;
            }
            TargetFormat::Png => {
                let img = first_frame(transformed)?;
                encode_png(&mut bytes, &img, token.optimize)?;
            }
            TargetFormat::Gif => {
                let (frames, loop_count) = match transformed {
                    Transformed::Animated { frames, loop_count } => (frames, loop_count),
                    Transformed::Still(img) => (
                        vec![Frame {
                            image: img,
                            delay_ms: 0,
                        }],
                        LoopCount::Finite(0),
                    ),
                };
                encode_gif(&mut bytes, frames, loop_count, token.optimize)?;
            }
        }

        if options.metadata
            && source_format == ImageFormat::Jpeg
            && matches!(target, TargetFormat::Jpeg { .. })
        {
            match copy_jpeg_metadata(source_bytes, &bytes) {
                Ok(annotated) => bytes = annotated,
                Err(err) => {
                    warn!(error = %err, "cannot copy JPEG metadata, keeping plain output");
                }
            }
        }

        Ok(Rendered { bytes, target })
    }

    /// Render `source_path` to `dest` atomically.
    pub fn render_file(
        &self,
        token: &Token,
        source_path: &Path,
        dest: &Path,
        options: &RenderOptions,
    ) -> Result<TargetFormat, RenderError> {
        let source_bytes = std::fs::read(source_path).map_err(|source| RenderError::Read {
            path: source_path.to_path_buf(),
            source,
        })?;

        let rendered = match self.render_bytes(token, &source_bytes, options) {
            Ok(rendered) => rendered,
            Err(err) => {
                error!(
                    path = %source_path.display(),
                    bytes = source_bytes.len(),
                    error = %err,
                    "cannot create thumbnail"
                );
                return Err(err);
            }
        };

        tmpfile::write_atomic(dest, &rendered.bytes).map_err(|source| RenderError::Write {
            path: dest.to_path_buf(),
            source,
        })?;

        for processor in &self.post_processors {
            if let Err(err) = processor.process(dest) {
                warn!(
                    processor = processor.name(),
                    path = %dest.display(),
                    error = %err,
                    "post-processing failed"
                );
            }
        }

        Ok(rendered.target)
    }
}
