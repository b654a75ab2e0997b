//! Binary marker artifacts.
//!
//! All three formats are little-endian with fixed field widths:
//!
//! `.fset` (24-byte header, then 12-byte records)
//! ```text
//! 0  magic "FSET"   4  version u16   6  density u8   7  reserved u8
//! 8  width u32      12 height u32    16 dpi f32      20 count u32
//! ```
//! `.fset3` (8-byte header, then one block per level)
//! ```text
//! 0  magic "FST3"   4  version u16   6  levels u8    7  reserved u8
//! block: scale u32, width u32, height u32, count u32, records
//! ```
//! `.iset`
//! ```text
//! 0  magic "ISET"   4  version u16   6  reserved u16
//! 8  width u32      12 height u32    16 dpi f32      20 total features u32
//! 24 source length u16, then UTF-8 source reference
//! ```
//! A record is `x i32, y i32, score f32`.

mod fset;
mod fset3;
mod iset;

pub use fset::{decode_feature_set, encode_feature_set, FeatureSet};
pub use fset3::{decode_multiscale_set, encode_multiscale_set, MultiScaleSet};
pub use iset::{decode_image_set, encode_image_set, ImageSet};

use nft_marker_core::FeaturePoint;
use std::io::Write;

pub const FORMAT_VERSION: u16 = 1;
pub const FSET_MAGIC: [u8; 4] = *b"FSET";
pub const FSET3_MAGIC: [u8; 4] = *b"FST3";
pub const ISET_MAGIC: [u8; 4] = *b"ISET";

pub const FSET_HEADER_LEN: usize = 24;
pub const FSET3_HEADER_LEN: usize = 8;
pub const FSET3_BLOCK_HEADER_LEN: usize = 16;
pub const RECORD_LEN: usize = 12;

#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("{0} feature records do not fit a u32 count")]
    TooManyRecords(usize),
    #[error("{0} pyramid levels do not fit a u8 count")]
    TooManyLevels(usize),
    #[error("{field} = {value} does not fit a u32 header field")]
    FieldOverflow { field: &'static str, value: u64 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DecodeArtifactError {
    #[error("bad magic {found:?} (expected {expected:?})")]
    BadMagic { expected: [u8; 4], found: [u8; 4] },
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),
    #[error("artifact truncated at offset {offset} (needed {needed} more bytes)")]
    Truncated { offset: usize, needed: usize },
    #[error("unknown density code {0}")]
    UnknownDensity(u8),
    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
    #[error("source reference is not valid UTF-8")]
    InvalidSourceReference,
}

pub(crate) fn count_u32(n: usize) -> Result<u32, EncodeError> {
    u32::try_from(n).map_err(|_| EncodeError::TooManyRecords(n))
}

pub(crate) fn field_u32(field: &'static str, value: usize) -> Result<u32, EncodeError> {
    u32::try_from(value).map_err(|_| EncodeError::FieldOverflow {
        field,
        value: value as u64,
    })
}

pub(crate) fn write_records<W: Write>(w: &mut W, points: &[FeaturePoint]) -> std::io::Result<()> {
    for p in points {
        w.write_all(&p.x.to_le_bytes())?;
        w.write_all(&p.y.to_le_bytes())?;
        w.write_all(&p.score.to_le_bytes())?;
    }
    Ok(())
}

/// Cursor over an artifact buffer.
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeArtifactError> {
        let end = self.pos + N;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| DecodeArtifactError::Truncated {
                offset: self.pos,
                needed: end - self.buf.len(),
            })?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeArtifactError> {
        let end = self.pos + len;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| DecodeArtifactError::Truncated {
                offset: self.pos,
                needed: end - self.buf.len(),
            })?;
        self.pos = end;
        Ok(bytes)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeArtifactError> {
        Ok(self.take::<1>()?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, DecodeArtifactError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, DecodeArtifactError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    pub(crate) fn i32(&mut self) -> Result<i32, DecodeArtifactError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    pub(crate) fn f32(&mut self) -> Result<f32, DecodeArtifactError> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    /// Check magic and version.
    pub(crate) fn header(&mut self, magic: [u8; 4]) -> Result<(), DecodeArtifactError> {
        let found = self.take::<4>()?;
        if found != magic {
            return Err(DecodeArtifactError::BadMagic {
                expected: magic,
                found,
            });
        }
        let version = self.u16()?;
        if version != FORMAT_VERSION {
            return Err(DecodeArtifactError::UnsupportedVersion(version));
        }
        Ok(())
    }

    pub(crate) fn records(&mut self, count: u32) -> Result<Vec<FeaturePoint>, DecodeArtifactError> {
        // Bounds-check before allocating.
        let len = count as usize * RECORD_LEN;
        if self.remaining() < len {
            return Err(DecodeArtifactError::Truncated {
                offset: self.pos,
                needed: len - self.remaining(),
            });
        }
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            out.push(FeaturePoint {
                x: self.i32()?,
                y: self.i32()?,
                score: self.f32()?,
            });
        }
        Ok(out)
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn finish(self) -> Result<(), DecodeArtifactError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeArtifactError::TrailingBytes(n)),
        }
    }
}
