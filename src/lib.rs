//! # thumbtoken
//!
//! Tamper-evident image transform tokens and the thumbnail renderer that
//! honors them.
//!
//! A service that generates image derivatives on demand has to trust the URL
//! describing the transformation. thumbtoken makes that URL component
//! trustworthy: the requested transform — resize/crop mode, output format,
//! quality, color adjustments — is packed into a compact binary form, sealed
//! with a keyed 32-bit checksum bound to the target filename, and encoded as
//! a base64url string. At serve time the string is verified and decoded back
//! into the exact transform, which the renderer then applies to the source
//! raster and writes out atomically.
//!
//! # Architecture
//!
//! ```text
//! link time:   Token ──encode(filename, key)──▶ "gSFfAgAA..." (URL component)
//! serve time:  "gSFfAgAA..." ──decode+verify──▶ Token ──render──▶ derivative
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`geometry`] | The six resize/crop policies; pure final-size arithmetic shared with raster execution |
//! | [`codec`] | Token pack/unpack, keyed checksums with a legacy fallback ladder, base64url text form |
//! | [`enhance`] | Color/contrast/brightness passes and watermark compositing |
//! | [`frames`] | Animated-source frame model and the disposal-fold composition |
//! | [`pipeline`] | Applies a token's operation list to still or animated sources |
//! | [`render`] | Thumbnail generator: decode → pipeline → serialize → atomic write |
//! | [`optimize`] | Injected external re-compression strategies (replace only if smaller) |
//! | [`tmpfile`] | Atomic write-then-rename |
//! | [`config`] | TOML settings for the CLI |
//!
//! # Design Decisions
//!
//! ## Checksums, Not Signatures
//!
//! The token seal is a keyed 32-bit checksum, not a cryptographic MAC. It
//! exists to keep casual URL tampering from minting arbitrary transform work
//! (unbounded resize dimensions are a denial-of-service vector), not to
//! protect secrets. The ladder of historical algorithms — Adler-32 today, a
//! keyed CRC-32 and a truncated structured digest before it — stays decodable
//! forever, because issued links live in caches, feeds and bookmarks for
//! years.
//!
//! ## A Version Byte, At Last
//!
//! Historically the right checksum algorithm was inferred by trial and error.
//! New tokens carry an explicit version byte (high bit set, which no legal
//! first byte of the old layout has), so current-format tokens verify in one
//! or two hash computations and the full ladder only runs for old links.
//!
//! ## Plans Make Geometry Honest
//!
//! Every resize policy must predict its output size without touching pixels
//! (link-time markup needs the dimensions) and later produce exactly that
//! size. Instead of maintaining two implementations that have to agree, each
//! policy computes one [`geometry::GeometryPlan`] and both the prediction and
//! the raster work read from it.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, resampling (Lanczos3) and encoding all come from the `image`
//! crate ecosystem — no ImageMagick, no system libraries. The only external
//! processes are the optional post-render optimizers (`pngquant`,
//! `jpegoptim`, `gifsicle`), which are best-effort by contract: their
//! failures are logged and swallowed.

pub mod codec;
pub mod config;
pub mod enhance;
pub mod frames;
pub mod geometry;
pub mod optimize;
pub mod pipeline;
pub mod render;
pub mod tmpfile;

pub use codec::{OutputFormat, Quality, Token, TokenError, TokenParams};
pub use geometry::{CropRect, ResizeOp};
pub use render::{RenderError, RenderOptions, Renderer, TargetFormat};
