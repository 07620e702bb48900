use crate::raster::Raster;

/// Multiply every sample by `factor`, saturating to the 0..=255 range.
///
/// Matches the viewer's brightness slider: factor 1.0 is identity, values
/// above brighten, values below darken. Always applied to the stored
/// original raster so repeated slider moves do not compound.
pub fn apply_brightness(raster: &Raster, factor: f32) -> Raster {
    let data = raster
        .data()
        .iter()
        .map(|&v| (v as f32 * factor).round().clamp(0.0, 255.0) as u8)
        .collect();

    // Dimensions are unchanged, so the length invariant holds
    Raster::new(raster.width(), raster.height(), raster.channels(), data)
        .expect("brightness preserves raster dimensions")
}
