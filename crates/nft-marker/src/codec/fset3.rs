use super::{
    count_u32, write_records, ByteReader, DecodeArtifactError, EncodeError, FORMAT_VERSION,
    FSET3_BLOCK_HEADER_LEN, FSET3_HEADER_LEN, FSET3_MAGIC, RECORD_LEN,
};
use nft_marker_core::{LevelFeatures, MultiScaleFeatures};
use std::io::Write;

/// Decoded multi-scale feature set. Level tags follow block order.
pub type MultiScaleSet = MultiScaleFeatures;

pub fn encode_multiscale_set(features: &MultiScaleFeatures) -> Result<Vec<u8>, EncodeError> {
    let levels = u8::try_from(features.levels.len())
        .map_err(|_| EncodeError::TooManyLevels(features.levels.len()))?;
    let records: usize = features.total();
    let mut out = Vec::with_capacity(
        FSET3_HEADER_LEN + features.levels.len() * FSET3_BLOCK_HEADER_LEN + records * RECORD_LEN,
    );

    out.write_all(&FSET3_MAGIC)?;
    out.write_all(&FORMAT_VERSION.to_le_bytes())?;
    out.write_all(&[levels, 0])?;
    for lvl in &features.levels {
        out.write_all(&lvl.scale.to_le_bytes())?;
        out.write_all(&lvl.width.to_le_bytes())?;
        out.write_all(&lvl.height.to_le_bytes())?;
        out.write_all(&count_u32(lvl.points.len())?.to_le_bytes())?;
        write_records(&mut out, &lvl.points)?;
    }
    Ok(out)
}

pub fn decode_multiscale_set(bytes: &[u8]) -> Result<MultiScaleSet, DecodeArtifactError> {
    let mut r = ByteReader::new(bytes);
    r.header(FSET3_MAGIC)?;
    let count = r.u8()?;
    let _reserved = r.u8()?;

    let mut levels = Vec::with_capacity(count as usize);
    for level in 0..count {
        let scale = r.u32()?;
        let width = r.u32()?;
        let height = r.u32()?;
        let n = r.u32()?;
        let points = r.records(n)?;
        levels.push(LevelFeatures {
            level,
            scale,
            width,
            height,
            points,
        });
    }
    r.finish()?;
    Ok(MultiScaleFeatures { levels })
}
