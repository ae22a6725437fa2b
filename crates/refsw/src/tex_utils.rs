/*
    This file is part of libswirl
*/
// #include "license/bsd"

// Texel unpacking and twiddle (Morton) address tables

use once_cell::sync::Lazy;

/// Dilated coordinate tables: `[0]` spreads x for a given v size, `[1]`
/// spreads y for a given u size. Indexed by `size_log2 + 3` (8 texels is 0).
pub struct DetwiddleTables {
    pub x: [[u32; 1024]; 11],
    pub y: [[u32; 1024]; 11],
}

pub static DETWIDDLE: Lazy<Box<DetwiddleTables>> = Lazy::new(|| {
    let mut tables = Box::new(DetwiddleTables {
        x: [[0; 1024]; 11],
        y: [[0; 1024]; 11],
    });

    for s in 0..11 {
        let x_sz: u32 = 1024;
        let y_sz: u32 = 1 << s;
        for i in 0..x_sz as usize {
            tables.x[s][i] = twiddle_slow(i as u32, 0, x_sz, y_sz);
            tables.y[s][i] = twiddle_slow(0, i as u32, y_sz, x_sz);
        }
    }

    tables
});

// Unpack to 32-bit ARGB word
#[inline]
pub const fn argb1555_32(word: u16) -> u32 {
    let word = word as u32;
    let a = if (word & 0x8000) != 0 { 0xFF000000 } else { 0 };
    let b = (word & 0x1F) << 3;
    let g = ((word >> 5) & 0x1F) << 11;
    let r = ((word >> 10) & 0x1F) << 19;
    a | r | g | b
}

#[inline]
pub const fn argb565_32(word: u16) -> u32 {
    let word = word as u32;
    let b = (word & 0x1F) << 3;
    let g = ((word >> 5) & 0x3F) << 10;
    let r = ((word >> 11) & 0x1F) << 19;
    0xFF000000 | r | g | b
}

#[inline]
pub const fn argb4444_32(word: u16) -> u32 {
    let word = word as u32;
    let a = ((word >> 12) & 0xF) << 28;
    let b = (word & 0xF) << 4;
    let g = ((word >> 4) & 0xF) << 12;
    let r = ((word >> 8) & 0xF) << 20;
    a | r | g | b
}

#[inline]
fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    (b as u32) | ((g as u32) << 8) | ((r as u32) << 16) | 0xFF000000
}

#[inline]
pub fn yuv422(y: i32, yu: i32, yv: i32) -> u32 {
    let yu = yu - 128;
    let yv = yv - 128;

    let r = y + yv * 11 / 8;
    let g = y - (yu * 11 + yv * 22) / 32;
    let b = y + yu * 110 / 64;

    pack_rgb(r.clamp(0, 255) as u8, g.clamp(0, 255) as u8, b.clamp(0, 255) as u8)
}

fn twiddle_slow(mut x: u32, mut y: u32, mut x_sz: u32, mut y_sz: u32) -> u32 {
    let mut rv = 0;
    let mut sh = 0;

    x_sz >>= 1;
    y_sz >>= 1;

    while x_sz != 0 || y_sz != 0 {
        if y_sz != 0 {
            rv |= (y & 1) << sh;
            y_sz >>= 1;
            y >>= 1;
            sh += 1;
        }
        if x_sz != 0 {
            rv |= (x & 1) << sh;
            x_sz >>= 1;
            x >>= 1;
            sh += 1;
        }
    }

    rv
}

/// Twiddled texel index of (x, y) in a `8<<bcx` by `8<<bcy` texture.
#[inline]
pub fn twop(x: u32, y: u32, bcx: u32, bcy: u32) -> u32 {
    let t = &**DETWIDDLE;
    t.x[(bcy + 3) as usize][(x & 1023) as usize] + t.y[(bcx + 3) as usize][(y & 1023) as usize]
}

/// Texel at `(x, y)` for square twiddled textures of side `1 << log2`,
/// including the 1x1 and 2x2 levels that only exist in mip chains.
#[inline]
pub fn twop_level(x: u32, y: u32, log2: u32) -> u32 {
    let t = &**DETWIDDLE;
    t.x[log2 as usize][(x & 1023) as usize] + t.y[log2 as usize][(y & 1023) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twiddle_interleaves_y_first() {
        // 8x8: (x=1,y=0) lands on texel 2, (x=0,y=1) on texel 1
        assert_eq!(twop(0, 0, 0, 0), 0);
        assert_eq!(twop(0, 1, 0, 0), 1);
        assert_eq!(twop(1, 0, 0, 0), 2);
        assert_eq!(twop(1, 1, 0, 0), 3);
        assert_eq!(twop(7, 7, 0, 0), 63);
    }

    #[test]
    fn test_twiddle_is_a_permutation() {
        let mut seen = vec![false; 16 * 8];
        for y in 0..8 {
            for x in 0..16 {
                let idx = twop(x, y, 1, 0) as usize;
                assert!(!seen[idx], "duplicate texel index {idx}");
                seen[idx] = true;
            }
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_unpack_16bit() {
        assert_eq!(argb1555_32(0xFFFF), 0xFFF8_F8F8);
        assert_eq!(argb1555_32(0x7C00), 0x00F8_0000);
        assert_eq!(argb565_32(0xF800), 0xFFF8_0000);
        assert_eq!(argb565_32(0x07E0), 0xFF00_FC00);
        assert_eq!(argb4444_32(0xF00F), 0xF000_00F0);
    }

    #[test]
    fn test_yuv_grey() {
        assert_eq!(yuv422(100, 128, 128), 0xFF64_6464);
    }
}
