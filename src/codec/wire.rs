//! Binary wire layout for transform tokens.
//!
//! All multi-byte fields are big-endian. The full layout is:
//!
//! ```text
//! [version: u8]                          (new tokens only; high bit set)
//! [flags: u8] [quality: u8] [op_code: u8]
//! [color: i8] [contrast: i8] [brightness: i8]
//! [operation payload]                    (fixed shape per op code, see table)
//! [pad: 0..2 zero bytes]                 (total length incl. checksum ≡ 0 mod 3)
//! [checksum: u32]
//! ```
//!
//! The padding keeps the base64url text form free of `=` characters. A legal
//! flags byte never exceeds `0x3F`, so a set high bit on the first byte
//! unambiguously marks a versioned token; tokens without it predate the
//! version byte and are decoded through the legacy checksum ladder.
//!
//! | op code | operation | payload |
//! |---|---|---|
//! | `0x01` | `Original` | one placeholder byte (`0x44`, ignored on decode) |
//! | `0x02` | `FitWidth` | `u16` width, `u16` height (0 = unset) |
//! | `0x03` | `FitAll`   | `u16` width, `u16` height |
//! | `0x04` | `Force`    | `u16` width, `u16` height |
//! | `0x05` | `MaxBox`   | `u16` width, `u16` height |
//! | `0x06` | `Manual`   | `u16` width, `u16` height, `u16` ×4 crop (l,t,w,h) |

use super::TokenError;
use crate::geometry::{CropRect, ResizeOp};

/// High bit of the first byte marks a versioned token.
pub const VERSION_BIT: u8 = 0x80;
/// Current wire version, stored in the low seven bits of the version byte.
pub const WIRE_VERSION: u8 = 1;

/// Low nibble of the flags byte: requested output format.
pub const FORMAT_MASK: u8 = 0x0F;
/// Preview/temporary derivative.
pub const FLAG_PREVIEW: u8 = 0x10;
/// Run best-effort post-compression on the result.
pub const FLAG_OPTIMIZE: u8 = 0x20;

pub const OP_ORIGINAL: u8 = 0x01;
pub const OP_FIT_WIDTH: u8 = 0x02;
pub const OP_FIT_ALL: u8 = 0x03;
pub const OP_FORCE: u8 = 0x04;
pub const OP_MAX_BOX: u8 = 0x05;
pub const OP_MANUAL: u8 = 0x06;

/// Placeholder payload byte of the `Original` op.
const ORIGINAL_PAYLOAD: u8 = 0x44;

/// The wire discriminator for an operation.
pub fn op_code(op: &ResizeOp) -> u8 {
    match op {
        ResizeOp::Original => OP_ORIGINAL,
        ResizeOp::FitWidth { .. } => OP_FIT_WIDTH,
        ResizeOp::FitAll { .. } => OP_FIT_ALL,
        ResizeOp::Force { .. } => OP_FORCE,
        ResizeOp::MaxBox { .. } => OP_MAX_BOX,
        ResizeOp::Manual { .. } => OP_MANUAL,
    }
}

/// Append the operation payload to `out`.
pub fn encode_op_payload(op: &ResizeOp, out: &mut Vec<u8>) {
    match *op {
        ResizeOp::Original => out.push(ORIGINAL_PAYLOAD),
        ResizeOp::FitWidth { width, height }
        | ResizeOp::FitAll { width, height }
        | ResizeOp::Force { width, height }
        | ResizeOp::MaxBox { width, height } => {
            out.extend_from_slice(&width.to_be_bytes());
            out.extend_from_slice(&height.to_be_bytes());
        }
        ResizeOp::Manual {
            width,
            height,
            crop,
        } => {
            let c = crop.unwrap_or(CropRect {
                left: 0,
                top: 0,
                width: 0,
                height: 0,
            });
            for v in [width, height, c.left, c.top, c.width, c.height] {
                out.extend_from_slice(&v.to_be_bytes());
            }
        }
    }
}

/// Decode an operation from its code and payload bytes. Trailing padding in
/// `payload` is ignored; each op reads only its fixed prefix.
pub fn decode_op(code: u8, payload: &[u8]) -> Result<ResizeOp, TokenError> {
    let u16_at = |i: usize| -> Result<u16, TokenError> {
        payload
            .get(i..i + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| TokenError::Format("truncated operation payload".into()))
    };

    match code {
        OP_ORIGINAL => Ok(ResizeOp::Original),
        OP_FIT_WIDTH => Ok(ResizeOp::FitWidth {
            width: u16_at(0)?,
            height: u16_at(2)?,
        }),
        OP_FIT_ALL => Ok(ResizeOp::FitAll {
            width: u16_at(0)?,
            height: u16_at(2)?,
        }),
        OP_FORCE => Ok(ResizeOp::Force {
            width: u16_at(0)?,
            height: u16_at(2)?,
        }),
        OP_MAX_BOX => Ok(ResizeOp::MaxBox {
            width: u16_at(0)?,
            height: u16_at(2)?,
        }),
        OP_MANUAL => {
            let crop = CropRect {
                left: u16_at(4)?,
                top: u16_at(6)?,
                width: u16_at(8)?,
                height: u16_at(10)?,
            };
            Ok(ResizeOp::Manual {
                width: u16_at(0)?,
                height: u16_at(2)?,
                crop: crop.normalize(),
            })
        }
        other => Err(TokenError::UnknownOp(other)),
    }
}

/// Zero bytes to append after `len` payload bytes so that the final byte
/// string (payload plus the 4-byte checksum) has a length divisible by 3.
pub fn pad_len(len: usize) -> usize {
    (3 - ((len + 4) % 3)) % 3
}
