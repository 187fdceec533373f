//! Texture storage formats and BC1/BC3 block compression
//!
//! The encoder is a plain range fit: per 4x4 block the color endpoints are the
//! per-channel minimum and maximum, and each texel takes the closest palette
//! entry. Quality is modest but encoding is fast enough to run on a loader
//! thread for very large images.

/// GPU storage format of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// Uncompressed 8-bit RGBA
    Rgba8,
    /// DXT1: opaque RGB, 8 bytes per 4x4 block
    Bc1,
    /// DXT5: RGB plus interpolated alpha, 16 bytes per 4x4 block
    Bc3,
}

impl TextureFormat {
    /// Whether the format is block compressed
    pub fn is_compressed(self) -> bool {
        !matches!(self, Self::Rgba8)
    }

    /// Bytes needed for a `width` x `height` image
    pub fn byte_size(self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        let blocks = w.div_ceil(4) * h.div_ceil(4);
        match self {
            Self::Rgba8 => w * h * 4,
            Self::Bc1 => blocks * 8,
            Self::Bc3 => blocks * 16,
        }
    }
}

/// Encode RGBA8 pixels into `out` using `format`
///
/// `out` must be exactly `format.byte_size(width, height)` bytes. Returns
/// false (leaving `out` untouched) on a size mismatch.
pub fn encode_into(format: TextureFormat, width: u32, height: u32, rgba: &[u8], out: &mut [u8]) -> bool {
    let (w, h) = (width as usize, height as usize);
    if rgba.len() != w * h * 4 || out.len() != format.byte_size(width, height) {
        return false;
    }

    match format {
        TextureFormat::Rgba8 => out.copy_from_slice(rgba),
        TextureFormat::Bc1 | TextureFormat::Bc3 => {
            let block_bytes = if format == TextureFormat::Bc1 { 8 } else { 16 };
            let blocks_x = w.div_ceil(4);
            for (block_index, dst) in out.chunks_exact_mut(block_bytes).enumerate() {
                let texels = gather_block(rgba, w, h, block_index % blocks_x, block_index / blocks_x);
                if format == TextureFormat::Bc1 {
                    encode_color_block(&texels, dst);
                } else {
                    encode_alpha_block(&texels, &mut dst[..8]);
                    encode_color_block(&texels, &mut dst[8..]);
                }
            }
        }
    }
    true
}

/// 16 texels of a block, edge texels repeated past the image border
fn gather_block(rgba: &[u8], w: usize, h: usize, bx: usize, by: usize) -> [[u8; 4]; 16] {
    let mut texels = [[0u8; 4]; 16];
    for (i, texel) in texels.iter_mut().enumerate() {
        let x = (bx * 4 + i % 4).min(w - 1);
        let y = (by * 4 + i / 4).min(h - 1);
        let offset = (y * w + x) * 4;
        texel.copy_from_slice(&rgba[offset..offset + 4]);
    }
    texels
}

fn to_565(c: [u8; 3]) -> u16 {
    (u16::from(c[0]) >> 3) << 11 | (u16::from(c[1]) >> 2) << 5 | u16::from(c[2]) >> 3
}

fn from_565(c: u16) -> [i32; 3] {
    let r = i32::from((c >> 11) & 0x1f);
    let g = i32::from((c >> 5) & 0x3f);
    let b = i32::from(c & 0x1f);
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

fn encode_color_block(texels: &[[u8; 4]; 16], dst: &mut [u8]) {
    let mut lo = [255u8; 3];
    let mut hi = [0u8; 3];
    for t in texels {
        for c in 0..3 {
            lo[c] = lo[c].min(t[c]);
            hi[c] = hi[c].max(t[c]);
        }
    }

    let mut c0 = to_565(hi);
    let mut c1 = to_565(lo);
    let mut indices = 0u32;

    if c0 != c1 {
        // Four-color mode needs c0 > c1
        if c0 < c1 {
            std::mem::swap(&mut c0, &mut c1);
        }
        let e0 = from_565(c0);
        let e1 = from_565(c1);
        let palette = [
            e0,
            e1,
            [0, 1, 2].map(|c| (2 * e0[c] + e1[c]) / 3),
            [0, 1, 2].map(|c| (e0[c] + 2 * e1[c]) / 3),
        ];
        for (i, t) in texels.iter().enumerate() {
            let best = nearest(&palette, [i32::from(t[0]), i32::from(t[1]), i32::from(t[2])]);
            indices |= (best as u32) << (2 * i);
        }
    }

    dst[0..2].copy_from_slice(&c0.to_le_bytes());
    dst[2..4].copy_from_slice(&c1.to_le_bytes());
    dst[4..8].copy_from_slice(&indices.to_le_bytes());
}

fn nearest(palette: &[[i32; 3]; 4], color: [i32; 3]) -> usize {
    let mut best = 0;
    let mut best_dist = i32::MAX;
    for (i, p) in palette.iter().enumerate() {
        let dist: i32 = (0..3).map(|c| (p[c] - color[c]).pow(2)).sum();
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }
    best
}

fn encode_alpha_block(texels: &[[u8; 4]; 16], dst: &mut [u8]) {
    let a0 = texels.iter().map(|t| t[3]).max().unwrap_or(255);
    let a1 = texels.iter().map(|t| t[3]).min().unwrap_or(255);
    dst[0] = a0;
    dst[1] = a1;

    let mut bits = 0u64;
    if a0 > a1 {
        let (a0, a1) = (i32::from(a0), i32::from(a1));
        // Eight-value ramp: index 0 = a0, 1 = a1, 2..=7 interpolate
        let mut ramp = [0i32; 8];
        ramp[0] = a0;
        ramp[1] = a1;
        for i in 1..7 {
            ramp[i + 1] = ((7 - i as i32) * a0 + i as i32 * a1) / 7;
        }
        for (i, t) in texels.iter().enumerate() {
            let alpha = i32::from(t[3]);
            let best = (0..8)
                .min_by_key(|&k| (ramp[k] - alpha).abs())
                .unwrap_or(0);
            bits |= (best as u64) << (3 * i);
        }
    }
    dst[2..8].copy_from_slice(&bits.to_le_bytes()[..6]);
}
