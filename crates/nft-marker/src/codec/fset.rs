use super::{
    count_u32, field_u32, write_records, ByteReader, DecodeArtifactError, EncodeError,
    FORMAT_VERSION, FSET_HEADER_LEN, FSET_MAGIC, RECORD_LEN,
};
use nft_marker_core::{FeatureDensity, FeaturePoint};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Decoded single-scale feature set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub width: u32,
    pub height: u32,
    pub dpi: f32,
    pub density: FeatureDensity,
    pub points: Vec<FeaturePoint>,
}

/// Serialize the full-resolution feature points.
pub fn encode_feature_set(
    width: usize,
    height: usize,
    dpi: f32,
    density: FeatureDensity,
    points: &[FeaturePoint],
) -> Result<Vec<u8>, EncodeError> {
    let count = count_u32(points.len())?;
    let mut out = Vec::with_capacity(FSET_HEADER_LEN + points.len() * RECORD_LEN);
    out.write_all(&FSET_MAGIC)?;
    out.write_all(&FORMAT_VERSION.to_le_bytes())?;
    out.write_all(&[density.code(), 0])?;
    out.write_all(&field_u32("width", width)?.to_le_bytes())?;
    out.write_all(&field_u32("height", height)?.to_le_bytes())?;
    out.write_all(&dpi.to_le_bytes())?;
    out.write_all(&count.to_le_bytes())?;
    write_records(&mut out, points)?;
    Ok(out)
}

pub fn decode_feature_set(bytes: &[u8]) -> Result<FeatureSet, DecodeArtifactError> {
    let mut r = ByteReader::new(bytes);
    r.header(FSET_MAGIC)?;
    let code = r.u8()?;
    let density = FeatureDensity::from_code(code).ok_or(DecodeArtifactError::UnknownDensity(code))?;
    let _reserved = r.u8()?;
    let width = r.u32()?;
    let height = r.u32()?;
    let dpi = r.f32()?;
    let count = r.u32()?;
    let points = r.records(count)?;
    r.finish()?;
    Ok(FeatureSet {
        width,
        height,
        dpi,
        density,
        points,
    })
}
