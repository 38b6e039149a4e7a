//! Categorical color tables for mask and channel overlays.

use image::Rgb;

/// The 10-color categorical table used for channels.
pub const TAB10: [[u8; 3]; 10] = [
    [0x1f, 0x77, 0xb4],
    [0xff, 0x7f, 0x0e],
    [0x2c, 0xa0, 0x2c],
    [0xd6, 0x27, 0x28],
    [0x94, 0x67, 0xbd],
    [0x8c, 0x56, 0x4b],
    [0xe3, 0x77, 0xc2],
    [0x7f, 0x7f, 0x7f],
    [0xbc, 0xbd, 0x22],
    [0x17, 0xbe, 0xcf],
];

/// The 20-color categorical table used for masks.
pub const TAB20: [[u8; 3]; 20] = [
    [0x1f, 0x77, 0xb4],
    [0xae, 0xc7, 0xe8],
    [0xff, 0x7f, 0x0e],
    [0xff, 0xbb, 0x78],
    [0x2c, 0xa0, 0x2c],
    [0x98, 0xdf, 0x8a],
    [0xd6, 0x27, 0x28],
    [0xff, 0x98, 0x96],
    [0x94, 0x67, 0xbd],
    [0xc5, 0xb0, 0xd5],
    [0x8c, 0x56, 0x4b],
    [0xc4, 0x9c, 0x94],
    [0xe3, 0x77, 0xc2],
    [0xf7, 0xb6, 0xd2],
    [0x7f, 0x7f, 0x7f],
    [0xc7, 0xc7, 0xc7],
    [0xbc, 0xbd, 0x22],
    [0xdb, 0xdb, 0x8d],
    [0x17, 0xbe, 0xcf],
    [0x9e, 0xda, 0xe5],
];

/// Samples a listed palette at `t` in `[0, 1]`, values outside are clamped.
pub fn sample(palette: &[[u8; 3]], t: f64) -> Rgb<u8> {
    let n = palette.len();
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let idx = ((t * n as f64) as usize).min(n - 1);
    Rgb(palette[idx])
}

/// Color of the mask with the given rank among `n_masks` sorted identifiers.
pub fn mask_color(rank: usize, n_masks: usize) -> Rgb<u8> {
    if n_masks <= 1 {
        return sample(&TAB20, 0.0);
    }
    sample(&TAB20, rank as f64 / (n_masks - 1) as f64)
}

/// One color per channel, spread over the first 80% of [`TAB10`].
pub fn channel_colors(n_channels: usize) -> Vec<Rgb<u8>> {
    match n_channels {
        0 => Vec::new(),
        1 => vec![sample(&TAB10, 0.0)],
        n => (0..n)
            .map(|i| sample(&TAB10, 0.8 * i as f64 / (n - 1) as f64))
            .collect(),
    }
}
