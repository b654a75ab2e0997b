use super::{
    count_u32, field_u32, ByteReader, DecodeArtifactError, EncodeError, FORMAT_VERSION, ISET_MAGIC,
};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Decoded image/metadata set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageSet {
    pub width: u32,
    pub height: u32,
    pub dpi: f32,
    /// Feature points summed over every pyramid level.
    pub total_features: u32,
    pub source: String,
}

/// Longest prefix of `s` that fits a u16 length on a char boundary.
fn truncate_source(s: &str) -> &str {
    let max = u16::MAX as usize;
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

pub fn encode_image_set(
    width: usize,
    height: usize,
    dpi: f32,
    total_features: usize,
    source: &str,
) -> Result<Vec<u8>, EncodeError> {
    let source = truncate_source(source);
    let mut out = Vec::with_capacity(26 + source.len());
    out.write_all(&ISET_MAGIC)?;
    out.write_all(&FORMAT_VERSION.to_le_bytes())?;
    out.write_all(&0u16.to_le_bytes())?;
    out.write_all(&field_u32("width", width)?.to_le_bytes())?;
    out.write_all(&field_u32("height", height)?.to_le_bytes())?;
    out.write_all(&dpi.to_le_bytes())?;
    out.write_all(&count_u32(total_features)?.to_le_bytes())?;
    out.write_all(&(source.len() as u16).to_le_bytes())?;
    out.write_all(source.as_bytes())?;
    Ok(out)
}

pub fn decode_image_set(bytes: &[u8]) -> Result<ImageSet, DecodeArtifactError> {
    let mut r = ByteReader::new(bytes);
    r.header(ISET_MAGIC)?;
    let _reserved = r.u16()?;
    let width = r.u32()?;
    let height = r.u32()?;
    let dpi = r.f32()?;
    let total_features = r.u32()?;
    let len = r.u16()? as usize;
    let source = std::str::from_utf8(r.bytes(len)?)
        .map_err(|_| DecodeArtifactError::InvalidSourceReference)?
        .to_owned();
    r.finish()?;
    Ok(ImageSet {
        width,
        height,
        dpi,
        total_features,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_source_reference() {
        let bytes = encode_image_set(1024, 768, 96.0, 1234, "uploads/cover.jpg").unwrap();
        assert_eq!(bytes.len(), 26 + "uploads/cover.jpg".len());
        assert_eq!(&bytes[0..4], b"ISET");
        let set = decode_image_set(&bytes).unwrap();
        assert_eq!(
            set,
            ImageSet {
                width: 1024,
                height: 768,
                dpi: 96.0,
                total_features: 1234,
                source: "uploads/cover.jpg".into(),
            }
        );
    }

    #[test]
    fn long_source_is_cut_on_char_boundary() {
        // The leading "a" puts char boundaries at 1 + 3k, so byte 65535 is mid-char.
        let s = format!("a{}", "€".repeat(30_000));
        let cut = truncate_source(&s);
        assert_eq!(cut.len(), 65_533);
        assert!(cut.len() <= u16::MAX as usize);
        assert!(s.starts_with(cut));
        let bytes = encode_image_set(480, 480, 72.0, 0, &s).unwrap();
        assert_eq!(decode_image_set(&bytes).unwrap().source, cut);
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let mut bytes = encode_image_set(480, 480, 72.0, 0, "ab").unwrap();
        let n = bytes.len();
        bytes[n - 1] = 0xff;
        assert_eq!(
            decode_image_set(&bytes),
            Err(DecodeArtifactError::InvalidSourceReference)
        );
    }
}
