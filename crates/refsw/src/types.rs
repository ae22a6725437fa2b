/*
    This file is part of libswirl
*/
// #include "license/bsd"

// Control words shared by the TA and the core, plus the vertex and colour types

use bitfield::bitfield;

macro_rules! word_full {
    ($($t:ident),* $(,)?) => {
        $(
            impl $t {
                #[inline]
                pub const fn full(&self) -> u32 {
                    self.0
                }

                #[inline]
                pub fn set_full(&mut self, val: u32) {
                    self.0 = val;
                }
            }

            impl From<u32> for $t {
                #[inline]
                fn from(val: u32) -> Self {
                    $t(val)
                }
            }
        )*
    };
}

bitfield! {
    /// Parameter Control Word, the first word of every TA packet
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct PCW(u32);
    impl Debug;

    // Obj Control
    pub uv_16bit, set_uv_16bit: 0;
    pub gouraud, set_gouraud: 1;
    pub offset, set_offset: 2;
    pub texture, set_texture: 3;
    pub col_type, set_col_type: 5, 4;
    pub volume, set_volume: 6;
    pub shadow, set_shadow: 7;

    // Group Control
    pub user_clip, set_user_clip: 17, 16;
    pub strip_len, set_strip_len: 19, 18;
    pub group_en, set_group_en: 23;

    // Para Control
    pub list_type, set_list_type: 26, 24;
    pub end_of_strip, set_end_of_strip: 28;
    pub para_type, set_para_type: 31, 29;

    pub u8, obj_ctrl, set_obj_ctrl: 7, 0;
}

bitfield! {
    /// ISP/TSP Instruction Word
    #[derive(Copy, Clone, PartialEq, Eq)]
    #[allow(non_camel_case_types)]
    pub struct ISP_TSP(u32);
    impl Debug;

    pub dcalc_ctrl, set_dcalc_ctrl: 20;
    pub cache_bypass, set_cache_bypass: 21;
    pub uv_16b, set_uv_16b: 22;      // Replaced by PCW in TA
    pub gouraud, set_gouraud: 23;     // Replaced by PCW in TA
    pub offset, set_offset: 24;       // Replaced by PCW in TA
    pub texture, set_texture: 25;     // Replaced by PCW in TA
    pub z_write_dis, set_z_write_dis: 26;
    pub cull_mode, set_cull_mode: 28, 27;
    pub depth_mode, set_depth_mode: 31, 29;
}

bitfield! {
    /// ISP word of a modifier volume triangle. `depth_mode` carries the
    /// volume instruction: 1 closes an inclusion volume, 2 an exclusion one.
    #[derive(Copy, Clone, PartialEq, Eq)]
    #[allow(non_camel_case_types)]
    pub struct ISP_Modvol(u32);
    impl Debug;

    pub id, set_id: 25, 0;
    pub volume_last, set_volume_last: 26;
    pub cull_mode, set_cull_mode: 28, 27;
    pub depth_mode, set_depth_mode: 31, 29;
}

bitfield! {
    /// TSP Instruction Word
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct TSP(u32);
    impl Debug;

    pub tex_v, set_tex_v: 2, 0;
    pub tex_u, set_tex_u: 5, 3;
    pub shad_instr, set_shad_instr: 7, 6;
    pub mip_map_d, set_mip_map_d: 11, 8;
    pub sup_sample, set_sup_sample: 12;
    pub filter_mode, set_filter_mode: 14, 13;
    pub clamp_v, set_clamp_v: 15;
    pub clamp_u, set_clamp_u: 16;
    pub flip_v, set_flip_v: 17;
    pub flip_u, set_flip_u: 18;
    pub ignore_tex_a, set_ignore_tex_a: 19;
    pub use_alpha, set_use_alpha: 20;
    pub color_clamp, set_color_clamp: 21;
    pub fog_ctrl, set_fog_ctrl: 23, 22;
    pub dst_select, set_dst_select: 24;  // Secondary Accum
    pub src_select, set_src_select: 25;  // Primary Accum
    pub dst_instr, set_dst_instr: 28, 26;
    pub src_instr, set_src_instr: 31, 29;
}

bitfield! {
    /// Texture Control Word
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct TCW(u32);
    impl Debug;

    pub tex_addr, set_tex_addr: 20, 0;
    pub stride_sel, set_stride_sel: 25;
    pub scan_order, set_scan_order: 26;
    pub pixel_fmt, set_pixel_fmt: 29, 27;
    pub vq_comp, set_vq_comp: 30;
    pub mip_mapped, set_mip_mapped: 31;

    // For paletted textures
    pub pal_select, set_pal_select: 26, 21;
}

word_full!(PCW, ISP_TSP, ISP_Modvol, TSP, TCW);

/// Vertex as stored in an ISP parameter block. Colours are BGRA bytes.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,

    pub col: [u8; 4],
    pub spc: [u8; 4],

    pub u: f32,
    pub v: f32,

    // Two volumes format
    pub col1: [u8; 4],
    pub spc1: [u8; 4],

    pub u1: f32,
    pub v1: f32,
}

impl Vertex {
    pub fn at(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z, ..Default::default() }
    }

    #[inline]
    pub fn base_argb(&self) -> u32 {
        u32::from_le_bytes(self.col)
    }

    #[inline]
    pub fn set_base_argb(&mut self, argb: u32) {
        self.col = argb.to_le_bytes();
    }

    #[inline]
    pub fn set_offset_argb(&mut self, argb: u32) {
        self.spc = argb.to_le_bytes();
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Argb1555,
    Rgb565,
    Argb4444,
    Yuv422,
    Pal4,
    Pal8,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 6] = [
        PixelFormat::Argb1555,
        PixelFormat::Rgb565,
        PixelFormat::Argb4444,
        PixelFormat::Yuv422,
        PixelFormat::Pal4,
        PixelFormat::Pal8,
    ];

    /// Decodes the 3 bit TCW field. Bump maps and the reserved encoding are
    /// fetched as raw 16 bit texels through the 1555 path.
    pub const fn from_tcw(pixel_fmt: u32) -> Self {
        match pixel_fmt & 7 {
            1 => PixelFormat::Rgb565,
            2 => PixelFormat::Argb4444,
            3 => PixelFormat::Yuv422,
            5 => PixelFormat::Pal4,
            6 => PixelFormat::Pal8,
            _ => PixelFormat::Argb1555,
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn from_index(index: usize) -> Self {
        Self::ALL[index % 6]
    }

    #[inline]
    pub const fn is_palette(self) -> bool {
        matches!(self, PixelFormat::Pal4 | PixelFormat::Pal8)
    }

    /// Bits per texel in memory, before VQ.
    pub const fn bits(self) -> u32 {
        match self {
            PixelFormat::Pal4 => 4,
            PixelFormat::Pal8 => 8,
            _ => 16,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct Color {
    pub b: u8,
    pub g: u8,
    pub r: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color { b: 255, g: 255, r: 255, a: 255 };

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Color {
            b: (raw & 0xFF) as u8,
            g: ((raw >> 8) & 0xFF) as u8,
            r: ((raw >> 16) & 0xFF) as u8,
            a: ((raw >> 24) & 0xFF) as u8,
        }
    }

    #[inline]
    pub const fn to_raw(&self) -> u32 {
        self.b as u32 | ((self.g as u32) << 8) | ((self.r as u32) << 16) | ((self.a as u32) << 24)
    }

    #[inline]
    pub const fn from_bgra(c: [u8; 4]) -> Self {
        Color { b: c[0], g: c[1], r: c[2], a: c[3] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcw_fields() {
        let pcw = PCW(0x8284_000A);
        assert_eq!(pcw.para_type(), 4);
        assert_eq!(pcw.list_type(), 2);
        assert!(pcw.group_en());
        assert_eq!(pcw.strip_len(), 1);
        assert!(pcw.texture());
        assert!(pcw.gouraud());
        assert!(!pcw.offset());
    }

    #[test]
    fn test_color_raw_round_trip() {
        let c = Color::from_raw(0x80FF_4020);
        assert_eq!(c, Color { b: 0x20, g: 0x40, r: 0xFF, a: 0x80 });
        assert_eq!(c.to_raw(), 0x80FF_4020);
    }

    #[test]
    fn test_pixel_format_decode() {
        assert_eq!(PixelFormat::from_tcw(4), PixelFormat::Argb1555);
        assert_eq!(PixelFormat::from_tcw(6), PixelFormat::Pal8);
        assert!(PixelFormat::Pal4.is_palette());
        assert_eq!(PixelFormat::from_index(3), PixelFormat::Yuv422);
    }
}
