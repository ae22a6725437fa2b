/*
    This file is part of libswirl
*/
// #include "license/bsd"

// Frame buffer pixel packing (tile write-out) and unpacking (read-back)

use crate::pvr_mem::Vram;
use crate::pvr_regs::{FB_W_CTRL_type, PvrRegs};
use crate::types::Color;

pub const TILE_SIZE: u32 = 32;

// Precomputed "threshold biases" = bias4[bayer4[i][j]]
const BAYER_BIAS: [[u8; 4]; 4] = [
    [  8, 136,  40, 168 ],  // 0→8, 8→136, 2→40, 10→168
    [200,  72, 232, 104 ],  //12→200,4→72, 14→232,6→104
    [ 56, 184,  24, 152 ],  // 3→56,11→184,1→24, 9→152
    [248, 120, 216,  88 ],  //15→248,7→120,13→216,5→88
];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PackMode {
    Krgb0555,
    Rgb565,
    Argb4444,
    Argb1555,
    Rgb888,
    Krgb0888,
    Argb8888,
}

impl PackMode {
    pub fn from_ctrl(ctrl: FB_W_CTRL_type) -> Self {
        match ctrl.fb_packmode() {
            0 => PackMode::Krgb0555,
            1 => PackMode::Rgb565,
            2 => PackMode::Argb4444,
            3 => PackMode::Argb1555,
            4 => PackMode::Rgb888,
            5 => PackMode::Krgb0888,
            _ => PackMode::Argb8888,
        }
    }

    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            PackMode::Rgb888 => 3,
            PackMode::Krgb0888 | PackMode::Argb8888 => 4,
            _ => 2,
        }
    }
}

// Quantize an 8 bit channel to `bits`, with an optional ordered dither bias
#[inline(always)]
fn quantize(c: u8, bits: u32, bias: Option<u8>) -> u32 {
    let max = (1u32 << bits) - 1;
    match bias {
        Some(t) => ((c as u32 * max + t as u32) / 255).min(max),
        None => (c as u32) >> (8 - bits),
    }
}

/// Packs one accumulated pixel. `(x, y)` select the dither cell.
pub fn pack_pixel(col: Color, ctrl: FB_W_CTRL_type, x: u32, y: u32) -> u32 {
    let mode = PackMode::from_ctrl(ctrl);
    let bias = if ctrl.fb_dither() { Some(BAYER_BIAS[(y & 3) as usize][(x & 3) as usize]) } else { None };
    let kval = ctrl.fb_kval() as u32;

    match mode {
        PackMode::Krgb0555 => {
            ((kval >> 7) << 15)
                | (quantize(col.r, 5, bias) << 10)
                | (quantize(col.g, 5, bias) << 5)
                | quantize(col.b, 5, bias)
        }
        PackMode::Rgb565 => {
            (quantize(col.r, 5, bias) << 11) | (quantize(col.g, 6, bias) << 5) | quantize(col.b, 5, bias)
        }
        PackMode::Argb4444 => {
            (quantize(col.a, 4, bias) << 12)
                | (quantize(col.r, 4, bias) << 8)
                | (quantize(col.g, 4, bias) << 4)
                | quantize(col.b, 4, bias)
        }
        PackMode::Argb1555 => {
            let a = if col.a >= ctrl.fb_alpha_threshold() { 1 } else { 0 };
            (a << 15) | (quantize(col.r, 5, bias) << 10) | (quantize(col.g, 5, bias) << 5) | quantize(col.b, 5, bias)
        }
        PackMode::Rgb888 => col.to_raw() & 0x00FF_FFFF,
        PackMode::Krgb0888 => (kval << 24) | (col.to_raw() & 0x00FF_FFFF),
        PackMode::Argb8888 => col.to_raw(),
    }
}

/// Copies a finished tile to the frame buffer per `FB_W_*` and the clip
/// rectangle. `color` is the tile's ARGB8888 accumulator.
pub fn write_tile(vram: &mut Vram, regs: &PvrRegs, tile_x: u32, tile_y: u32, color: &[u32]) {
    let scaler_ctl = regs.scaler_ctl();
    let base = if scaler_ctl.interlace() && scaler_ctl.fieldselect() {
        regs.fb_w_sof2()
    } else {
        regs.fb_w_sof1()
    };

    let ctrl = regs.fb_w_ctrl();
    let mode = PackMode::from_ctrl(ctrl);
    let bpp = mode.bytes_per_pixel();
    let line_bytes = regs.fb_w_linestride().stride() * 8;

    let x_clip = regs.fb_x_clip();
    let y_clip = regs.fb_y_clip();

    for y in 0..TILE_SIZE {
        let py = tile_y * TILE_SIZE + y;
        if py < y_clip.min() || py > y_clip.max() {
            continue;
        }

        let line = base.wrapping_add(py * line_bytes);
        for x in 0..TILE_SIZE {
            let px = tile_x * TILE_SIZE + x;
            if px < x_clip.min() || px > x_clip.max() {
                continue;
            }

            let col = Color::from_raw(color[(y * TILE_SIZE + x) as usize]);
            let pixel = pack_pixel(col, ctrl, px, py);
            let dst = line.wrapping_add(px * bpp);

            match bpp {
                2 => vram.write16_32(dst, pixel as u16),
                3 => {
                    for (i, b) in pixel.to_le_bytes()[..3].iter().enumerate() {
                        vram.write8_32(dst + i as u32, *b);
                    }
                }
                _ => vram.write32(dst, pixel),
            }
        }
    }
}

/// Read-back depths from `FB_R_CTRL.fb_depth`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReadDepth {
    Rgb0555,
    Rgb565,
    Rgb888,
    Rgb0888,
}

impl ReadDepth {
    pub const fn from_bits(depth: u32) -> Self {
        match depth & 3 {
            0 => ReadDepth::Rgb0555,
            1 => ReadDepth::Rgb565,
            2 => ReadDepth::Rgb888,
            _ => ReadDepth::Rgb0888,
        }
    }

    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            ReadDepth::Rgb0555 | ReadDepth::Rgb565 => 2,
            ReadDepth::Rgb888 => 3,
            ReadDepth::Rgb0888 => 4,
        }
    }
}

/// Reads one pixel at `addr` (32 bit path) as opaque ARGB8888. `concat` fills
/// the low bits of 5 and 6 bit channels.
pub fn unpack_pixel(vram: &Vram, addr: u32, depth: ReadDepth, concat: u32) -> Color {
    let expand = |v: u32, bits: u32| -> u8 { ((v << (8 - bits)) | (concat & ((1 << (8 - bits)) - 1))) as u8 };

    match depth {
        ReadDepth::Rgb0555 => {
            let p = vram.read16_32(addr) as u32;
            Color {
                b: expand(p & 0x1F, 5),
                g: expand((p >> 5) & 0x1F, 5),
                r: expand((p >> 10) & 0x1F, 5),
                a: 255,
            }
        }
        ReadDepth::Rgb565 => {
            let p = vram.read16_32(addr) as u32;
            Color {
                b: expand(p & 0x1F, 5),
                g: expand((p >> 5) & 0x3F, 6),
                r: expand((p >> 11) & 0x1F, 5),
                a: 255,
            }
        }
        ReadDepth::Rgb888 => Color {
            b: vram.read8_32(addr),
            g: vram.read8_32(addr + 1),
            r: vram.read8_32(addr + 2),
            a: 255,
        },
        ReadDepth::Rgb0888 => Color { a: 255, ..Color::from_raw(vram.read32(addr)) },
    }
}
