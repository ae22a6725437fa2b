/*
    This file is part of libswirl
*/
// #include "license/bsd"

// Blending unit: 8 source x 8 destination factor instructions

use crate::texture::to_u8_256;
use crate::types::Color;
use seq_macro::seq;

pub type BlendFn = fn(Color, Color) -> Color;

// Factor instructions as found in TSP src_instr / dst_instr
pub const BLEND_ZERO: u32 = 0;
pub const BLEND_ONE: u32 = 1;
pub const BLEND_OTHER: u32 = 2;
pub const BLEND_INV_OTHER: u32 = 3;
pub const BLEND_SRC_ALPHA: u32 = 4;
pub const BLEND_INV_SRC_ALPHA: u32 = 5;
pub const BLEND_DST_ALPHA: u32 = 6;
pub const BLEND_INV_DST_ALPHA: u32 = 7;

#[inline(always)]
pub const fn blend_mode_index(src_instr: u32, dst_instr: u32) -> usize {
    (((src_instr & 7) << 3) | (dst_instr & 7)) as usize
}

// Blending coefficient calculation
#[inline(always)]
fn blend_coefs(src: Color, dst: Color, alpha_inst: u32, src_other: bool) -> Color {
    let mut rv = match alpha_inst >> 1 {
        1 => if src_other { src } else { dst }, // other color
        2 => Color { b: src.a, g: src.a, r: src.a, a: src.a },
        3 => Color { b: dst.a, g: dst.a, r: dst.a, a: dst.a },
        _ => Color::default(),
    };

    if (alpha_inst & 1) != 0 {
        rv.b = 255 - rv.b;
        rv.g = 255 - rv.g;
        rv.r = 255 - rv.r;
        rv.a = 255 - rv.a;
    }

    rv
}

#[inline(always)]
fn blend_mode<const MODE: usize>(src: Color, dst: Color) -> Color {
    let src_blend = blend_coefs(src, dst, (MODE >> 3) as u32, false);
    let dst_blend = blend_coefs(src, dst, (MODE & 7) as u32, true);

    let ch = |s: u8, sf: u8, d: u8, df: u8| {
        ((s as u32 * to_u8_256(sf) + d as u32 * to_u8_256(df)) >> 8).min(255) as u8
    };

    Color {
        b: ch(src.b, src_blend.b, dst.b, dst_blend.b),
        g: ch(src.g, src_blend.g, dst.g, dst_blend.g),
        r: ch(src.r, src_blend.r, dst.r, dst_blend.r),
        a: ch(src.a, src_blend.a, dst.a, dst_blend.a),
    }
}

static BLEND_TABLE: [BlendFn; 64] = seq!(N in 0..64 {
    [
        #(
            blend_mode::<N>,
        )*
    ]
});

/// `mode` is `src_instr << 3 | dst_instr`.
#[inline]
pub fn blend(mode: usize, src: Color, dst: Color) -> Color {
    BLEND_TABLE[mode & 63](src, dst)
}
