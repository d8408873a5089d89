//! Transform token codec: a compact, URL-safe, tamper-evident description of
//! one image transformation.
//!
//! A [`Token`] is built at link-generation time, encoded with a secret key
//! into a base64url string, and reconstructed at serve time by
//! [`Token::decode`], which verifies a keyed checksum binding the token bytes
//! to the filename before any field is interpreted. Decode failures are
//! typed and never fall through to a default transformation:
//!
//! - [`TokenError::Format`] — characters outside the url-safe alphabet, bad
//!   base64, truncation, an unsupported version byte, or a bad format nibble;
//! - [`TokenError::UnknownOp`] — an unregistered operation code;
//! - [`TokenError::Integrity`] — checksum mismatch after the full
//!   algorithm/filename-encoding ladder (see [`checksum`]).
//!
//! The binary layout lives in [`wire`]; checksum algorithms in [`checksum`].

pub mod checksum;
pub mod wire;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{CropRect, ResizeOp};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Format(String),
    #[error("unknown operation code 0x{0:02X}")]
    UnknownOp(u8),
    #[error("token integrity check failed for {filename:?}")]
    Integrity { filename: String },
}

/// Lossy encoding quality, clamped to 1..=100 on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u8) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl From<u8> for Quality {
    fn from(value: u8) -> Self {
        Quality::new(value)
    }
}

impl From<Quality> for u8 {
    fn from(quality: Quality) -> u8 {
        quality.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(95)
    }
}

/// Requested output format. `Keep` defers to the source's own format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Keep,
    Jpeg,
    JpegProgressive,
    Png,
    Gif,
}

impl OutputFormat {
    fn to_nibble(self) -> u8 {
        match self {
            OutputFormat::Keep => 0x01,
            OutputFormat::Jpeg => 0x02,
            OutputFormat::JpegProgressive => 0x03,
            OutputFormat::Png => 0x04,
            OutputFormat::Gif => 0x05,
        }
    }

    fn from_nibble(value: u8) -> Result<Self, TokenError> {
        match value {
            0x01 => Ok(OutputFormat::Keep),
            0x02 => Ok(OutputFormat::Jpeg),
            0x03 => Ok(OutputFormat::JpegProgressive),
            0x04 => Ok(OutputFormat::Png),
            0x05 => Ok(OutputFormat::Gif),
            other => Err(TokenError::Format(format!(
                "unknown output format nibble 0x{other:X}"
            ))),
        }
    }
}

/// One image transform request: the geometry operation plus output metadata.
///
/// Ephemeral: built at link time, rebuilt at serve time. The only durable
/// form is the encoded string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub op: ResizeOp,
    pub format: OutputFormat,
    pub quality: Quality,
    pub optimize: bool,
    pub preview: bool,
    /// Saturation adjustment, -100..=100.
    pub color: i8,
    /// Contrast adjustment, -100..=100.
    pub contrast: i8,
    /// Brightness adjustment, -100..=100.
    pub brightness: i8,
}

fn clamp_channel(value: i8) -> i8 {
    value.clamp(-100, 100)
}

impl Token {
    pub fn new(op: ResizeOp) -> Self {
        Self {
            op,
            format: OutputFormat::Keep,
            quality: Quality::default(),
            optimize: true,
            preview: false,
            color: 0,
            contrast: 0,
            brightness: 0,
        }
    }

    fn flags_byte(&self) -> u8 {
        let mut flags = self.format.to_nibble();
        if self.preview {
            flags |= wire::FLAG_PREVIEW;
        }
        if self.optimize {
            flags |= wire::FLAG_OPTIMIZE;
        }
        flags
    }

    /// Encode this token for `filename`, sealed with `key`.
    ///
    /// Always uses the versioned layout, the current checksum algorithm, and
    /// the raw (non-percent-encoded) filename bytes.
    pub fn encode(&self, filename: &str, key: &[u8]) -> String {
        let mut buf = Vec::with_capacity(24);
        buf.push(wire::VERSION_BIT | wire::WIRE_VERSION);
        buf.push(self.flags_byte());
        buf.push(self.quality.value());
        buf.push(wire::op_code(&self.op));
        buf.push(self.color as u8);
        buf.push(self.contrast as u8);
        buf.push(self.brightness as u8);
        wire::encode_op_payload(&self.op, &mut buf);
        buf.resize(buf.len() + wire::pad_len(buf.len()), 0);

        let sum = checksum::current(key, &buf, filename.as_bytes());
        buf.extend_from_slice(&sum.to_be_bytes());
        URL_SAFE_NO_PAD.encode(&buf)
    }

    /// Decode and verify a token string bound to `filename` and `key`.
    pub fn decode(data: &str, filename: &str, key: &[u8]) -> Result<Token, TokenError> {
        let trimmed = data.trim_end_matches('=');
        let valid = !trimmed.is_empty()
            && trimmed
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid {
            return Err(TokenError::Format(
                "characters outside the url-safe alphabet".into(),
            ));
        }

        let raw = URL_SAFE_NO_PAD
            .decode(trimmed)
            .map_err(|e| TokenError::Format(format!("base64: {e}")))?;
        // Smallest legal token: 6 header bytes + 4 checksum bytes.
        if raw.len() < 10 {
            return Err(TokenError::Format("token too short".into()));
        }

        let (body, sum) = raw.split_at(raw.len() - 4);
        let stored = u32::from_be_bytes([sum[0], sum[1], sum[2], sum[3]]);

        // Integrity comes first: nothing in the body is trusted until the
        // checksum matches, so tampering with any field — the version byte
        // and op code included — surfaces as an integrity failure.
        let versioned = body[0] & wire::VERSION_BIT != 0;
        if checksum::verify(stored, body, filename, key, !versioned).is_none() {
            return Err(TokenError::Integrity {
                filename: filename.to_string(),
            });
        }

        let header = if versioned {
            if body[0] & !wire::VERSION_BIT != wire::WIRE_VERSION {
                return Err(TokenError::Format(format!(
                    "unsupported token version {}",
                    body[0] & !wire::VERSION_BIT
                )));
            }
            &body[1..]
        } else {
            body
        };
        if header.len() < 6 {
            return Err(TokenError::Format("token too short".into()));
        }

        let flags = header[0];
        let format = OutputFormat::from_nibble(flags & wire::FORMAT_MASK)?;
        let op = wire::decode_op(header[2], &header[6..])?;

        Ok(Token {
            op,
            format,
            quality: Quality::new(header[1]),
            optimize: flags & wire::FLAG_OPTIMIZE != 0,
            preview: flags & wire::FLAG_PREVIEW != 0,
            color: clamp_channel(header[3] as i8),
            contrast: clamp_channel(header[4] as i8),
            brightness: clamp_channel(header[5] as i8),
        })
    }

    /// The parameter form of this token (see [`TokenParams`]).
    pub fn params(&self) -> TokenParams {
        let (thumb_type, width, height, crop_info) = match self.op {
            ResizeOp::Original => ("Org", None, None, None),
            ResizeOp::FitWidth { width, height } => (
                "FitWidth",
                Some(width),
                (height > 0).then_some(height),
                None,
            ),
            ResizeOp::FitAll { width, height } => ("FitAll", Some(width), Some(height), None),
            ResizeOp::Force { width, height } => ("Force", Some(width), Some(height), None),
            ResizeOp::MaxBox { width, height } => ("MaxBox", Some(width), Some(height), None),
            ResizeOp::Manual {
                width,
                height,
                crop,
            } => ("Manual", Some(width), Some(height), crop),
        };
        TokenParams {
            thumb_type: thumb_type.to_string(),
            width,
            height,
            crop_info,
            format: match self.format {
                OutputFormat::Keep => None,
                OutputFormat::Jpeg | OutputFormat::JpegProgressive => Some("JPEG".into()),
                OutputFormat::Png => Some("PNG".into()),
                OutputFormat::Gif => Some("GIF".into()),
            },
            progressive: self.format == OutputFormat::JpegProgressive,
            quality: self.quality,
            optimize: self.optimize,
            preview: self.preview,
            color: self.color,
            contrast: self.contrast,
            brightness: self.brightness,
        }
    }

    /// Build a token from its parameter form, e.g. client-supplied JSON.
    pub fn from_params(params: &TokenParams) -> Result<Token, TokenError> {
        let width = params.width.unwrap_or(0);
        let height = params.height.unwrap_or(0);
        let op = match params.thumb_type.as_str() {
            "Org" | "Original" => ResizeOp::Original,
            "FitWidth" => ResizeOp::FitWidth { width, height },
            "FitAll" => ResizeOp::FitAll { width, height },
            "Force" => ResizeOp::Force { width, height },
            "MaxBox" => ResizeOp::MaxBox { width, height },
            "Manual" => ResizeOp::Manual {
                width,
                height,
                crop: params.crop_info.and_then(CropRect::normalize),
            },
            other => {
                return Err(TokenError::Format(format!("unknown thumb type {other:?}")));
            }
        };
        let format = match params.format.as_deref() {
            None => OutputFormat::Keep,
            Some("JPEG") if params.progressive => OutputFormat::JpegProgressive,
            Some("JPEG") => OutputFormat::Jpeg,
            Some("PNG") => OutputFormat::Png,
            Some("GIF") => OutputFormat::Gif,
            Some(other) => {
                return Err(TokenError::Format(format!("unknown format {other:?}")));
            }
        };
        Ok(Token {
            op,
            format,
            quality: params.quality,
            optimize: params.optimize,
            preview: params.preview,
            color: clamp_channel(params.color),
            contrast: clamp_channel(params.contrast),
            brightness: clamp_channel(params.brightness),
        })
    }
}

/// JSON-facing mirror of a [`Token`], used by the CLI `inspect` output and
/// for building tokens from client-supplied parameter objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenParams {
    pub thumb_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_info: Option<CropRect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub progressive: bool,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub optimize: bool,
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub color: i8,
    #[serde(default)]
    pub contrast: i8,
    #[serde(default)]
    pub brightness: i8,
}
