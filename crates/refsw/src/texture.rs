/*
    This file is part of libswirl
*/
// #include "license/bsd"

// Texture descriptors and the texel fetch/filter unit

use crate::pvr_mem::{Vram, VRAM_MASK};
use crate::pvr_regs::PvrRegs;
use crate::tex_utils::*;
use crate::types::{Color, PixelFormat, TCW, TSP};
use paste::paste;
use seq_macro::seq;

/// Codebook size at the start of every VQ texture, in bytes
pub const VQ_CODEBOOK_SIZE: u32 = 256 * 8;

// Mipmap offset lookup table, in texels, indexed by log2(level size)
const MIP_POINT: [u32; 11] = [
    0x00003,          // 1
    0x00001 * 4,      // 2
    0x00002 * 4,      // 4
    0x00006 * 4,      // 8
    0x00016 * 4,      // 16
    0x00056 * 4,      // 32
    0x00156 * 4,      // 64
    0x00556 * 4,      // 128
    0x01556 * 4,      // 256
    0x05556 * 4,      // 512
    0x15556 * 4,      // 1024
];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddressMode {
    Linear,
    Strided,
    Twiddled,
    Vq,
}

impl AddressMode {
    pub const ALL: [AddressMode; 4] = [
        AddressMode::Linear,
        AddressMode::Strided,
        AddressMode::Twiddled,
        AddressMode::Vq,
    ];
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Bilinear,
    Trilinear,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UvMode {
    Wrap,
    Flip,
    Clamp,
}

impl UvMode {
    fn from_bits(clamp: bool, flip: bool) -> Self {
        if clamp {
            UvMode::Clamp
        } else if flip {
            UvMode::Flip
        } else {
            UvMode::Wrap
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TextureDescriptor {
    /// Byte address in the linear view. For VQ this is the codebook.
    pub base: u32,
    pub format: PixelFormat,
    pub layout: AddressMode,
    pub mipmapped: bool,
    /// Row pitch in texels for linear and strided layouts
    pub stride: u32,
    pub width: u32,
    pub height: u32,
    pub palette: u32,
    pub filter: FilterMode,
    pub u_mode: UvMode,
    pub v_mode: UvMode,
    pub blend_mode: u8,
    pub ignore_alpha: bool,
    pub mip_bias: u32,
}

impl TextureDescriptor {
    pub fn from_words(tsp: TSP, tcw: TCW, text_control: u32) -> Self {
        let format = PixelFormat::from_tcw(tcw.pixel_fmt());

        // scan order and stride select are fixed to zero for palettes
        let layout = if tcw.vq_comp() {
            AddressMode::Vq
        } else if !tcw.scan_order() || format.is_palette() {
            AddressMode::Twiddled
        } else if tcw.stride_sel() {
            AddressMode::Strided
        } else {
            AddressMode::Linear
        };

        let mipmapped = tcw.mip_mapped() && matches!(layout, AddressMode::Twiddled | AddressMode::Vq);
        let width = 8 << tsp.tex_u();
        let height = if mipmapped { width } else { 8 << tsp.tex_v() };
        let stride = if layout == AddressMode::Strided {
            (text_control & 31) * 32
        } else {
            width
        };

        let filter = match tsp.filter_mode() {
            0 => FilterMode::Nearest,
            1 => FilterMode::Bilinear,
            _ => FilterMode::Trilinear,
        };

        Self {
            base: (tcw.tex_addr() << 3) & VRAM_MASK,
            format,
            layout,
            mipmapped,
            stride,
            width,
            height,
            palette: tcw.pal_select(),
            filter,
            u_mode: UvMode::from_bits(tsp.clamp_u(), tsp.flip_u()),
            v_mode: UvMode::from_bits(tsp.clamp_v(), tsp.flip_v()),
            blend_mode: ((tsp.src_instr() << 3) | tsp.dst_instr()) as u8,
            ignore_alpha: tsp.ignore_tex_a(),
            mip_bias: tsp.mip_map_d(),
        }
    }

    #[inline]
    fn width_log2(&self) -> u32 {
        self.width.trailing_zeros()
    }

    /// Number of levels below the top one
    #[inline]
    pub fn max_level(&self) -> u32 {
        if self.mipmapped { self.width_log2() } else { 0 }
    }

    #[inline]
    fn level_size(&self, level: u32) -> (u32, u32) {
        if self.mipmapped {
            let size = self.width >> level;
            (size, size)
        } else {
            (self.width, self.height)
        }
    }

    #[inline]
    fn fetch_index(&self) -> usize {
        self.format.index() * 4 + self.layout as usize
    }
}

// Calculate bits per pixel (in 4.1 format for VQ)
#[inline(always)]
const fn bits_per_pixel(vq_comp: bool, bits: u32) -> u32 {
    if vq_comp {
        8 * 2 / (64 / bits) // 8 bpp / (pixels per 64 bits)
    } else {
        bits * 2
    }
}

// Clamp and flip a texture coordinate
#[inline(always)]
fn clamp_flip(coord: i32, size: i32, mode: UvMode) -> u32 {
    let rv = match mode {
        UvMode::Clamp => coord.clamp(0, size - 1),
        UvMode::Flip => {
            let mut c = coord & (size * 2 - 1);
            if (c & size) != 0 {
                c ^= size * 2 - 1;
            }
            c
        }
        UvMode::Wrap => coord & (size - 1),
    };
    rv as u32
}

// Texel coordinate in 24.8 fixed point. Wrap and flip repeat every two texture
// sizes, so the coordinate is reduced by that period on the float side; clamp
// only keeps a margin of two texels around the texture.
fn fixed_coord(t: f32, size: i32, mode: UvMode) -> i32 {
    let scaled = t * size as f32 * 256.0;
    let reduced = match mode {
        UvMode::Clamp => scaled.clamp(-512.0, (size + 2) as f32 * 256.0),
        UvMode::Wrap | UvMode::Flip => scaled.rem_euclid(size as f32 * 512.0),
    };
    // NaN lands on texel 0
    reduced as i32
}

/// Maps the UV footprint of a pixel to a mip level and the blend weight
/// towards the next smaller level.
pub fn select_mip(footprint: f32, max_level: u32) -> (u32, u8) {
    let mut level = 0;
    let mut d = footprint;
    while d > 1.5 && level < max_level {
        level += 1;
        d /= 2.0;
    }

    let frac = ((d / 1.5 - 0.5) * 2.0).clamp(0.0, 1.0);
    (level, (frac * 255.0) as u8)
}

type FetchFn = fn(&Sampler, &TextureDescriptor, u32, u32, u32) -> u32;

/// Reads one texel through VRAM and the palette, returning ARGB8888.
pub struct Sampler<'a> {
    vram: &'a Vram,
    palette: &'a [u32],
    pal_ram_ctrl: u32,
    halfpixel: i32,
}

impl<'a> Sampler<'a> {
    pub fn new(vram: &'a Vram, regs: &'a PvrRegs) -> Self {
        Self {
            vram,
            palette: regs.palette_ram(),
            pal_ram_ctrl: regs.pal_ram_ctrl(),
            halfpixel: if regs.half_offset().texure_pixel_half_offset() { 0 } else { 127 },
        }
    }

    #[inline(always)]
    fn expand_palette(&self, entry: u32) -> u32 {
        match self.pal_ram_ctrl {
            0 => argb1555_32(entry as u16),
            1 => argb565_32(entry as u16),
            2 => argb4444_32(entry as u16),
            _ => entry,
        }
    }

    #[inline(always)]
    fn fetch<const N: usize>(&self, desc: &TextureDescriptor, x: u32, y: u32, level: u32) -> u32 {
        let format = PixelFormat::from_index(N / 4);
        let layout = AddressMode::ALL[N % 4];

        let vq_comp = layout == AddressMode::Vq;
        let level_log2 = desc.width_log2() - level;
        let mip_offset = if desc.mipmapped { MIP_POINT[level_log2 as usize] } else { 0 };

        let offset = mip_offset
            + match layout {
                AddressMode::Linear | AddressMode::Strided => x + desc.stride * y,
                AddressMode::Twiddled | AddressMode::Vq if desc.mipmapped => twop_level(x, y, level_log2),
                AddressMode::Twiddled | AddressMode::Vq => {
                    twop(x, y, desc.width_log2() - 3, desc.height.trailing_zeros() - 3)
                }
            };

        let fbpp = bits_per_pixel(vq_comp, format.bits());
        let index_base = if vq_comp { desc.base + VQ_CODEBOOK_SIZE } else { desc.base };

        let mut memtel = self.vram.read64(index_base + offset * fbpp / 16);
        if vq_comp {
            let index = memtel.to_le_bytes()[((offset * fbpp / 16) & 7) as usize];
            memtel = self.vram.read64(desc.base + index as u32 * 8);
        }

        match format {
            PixelFormat::Argb1555 => argb1555_32((memtel >> ((offset & 3) * 16)) as u16),
            PixelFormat::Rgb565 => argb565_32((memtel >> ((offset & 3) * 16)) as u16),
            PixelFormat::Argb4444 => argb4444_32((memtel >> ((offset & 3) * 16)) as u16),
            PixelFormat::Yuv422 => {
                // U Y0 V Y1 pairs are horizontal neighbours in either order
                let linear = matches!(layout, AddressMode::Linear | AddressMode::Strided);
                let (word, y_lane) = if linear {
                    ((offset >> 1) & 1, 1 + (offset & 1) * 2)
                } else {
                    (offset & 1, 1 + (offset & 2))
                };
                let yuv = ((memtel >> (word * 32)) as u32).to_le_bytes();
                yuv422(yuv[y_lane as usize] as i32, yuv[0] as i32, yuv[2] as i32)
            }
            PixelFormat::Pal4 => {
                let local_idx = ((memtel >> ((offset & 15) * 4)) & 15) as u32;
                let idx = (desc.palette * 16) | local_idx;
                self.expand_palette(self.palette[(idx & 1023) as usize])
            }
            PixelFormat::Pal8 => {
                let local_idx = memtel.to_le_bytes()[(offset & 7) as usize] as u32;
                let idx = ((desc.palette / 16) * 256) | local_idx;
                self.expand_palette(self.palette[(idx & 1023) as usize])
            }
        }
    }

    /// Texel at integer coordinates, already wrapped to the level size.
    #[inline]
    pub fn texel(&self, desc: &TextureDescriptor, x: u32, y: u32, level: u32) -> Color {
        let rv = Color::from_raw(FETCHERS[desc.fetch_index()](self, desc, x, y, level));
        if desc.ignore_alpha { Color { a: 255, ..rv } } else { rv }
    }

    fn filtered(&self, desc: &TextureDescriptor, u: f32, v: f32, level: u32, bilinear: bool) -> Color {
        let (size_u, size_v) = desc.level_size(level);
        let (size_u, size_v) = (size_u as i32, size_v as i32);

        let ui = fixed_coord(u, size_u, desc.u_mode) + self.halfpixel;
        let vi = fixed_coord(v, size_v, desc.v_mode) + self.halfpixel;

        let fetch = |du: i32, dv: i32| {
            self.texel(
                desc,
                clamp_flip((ui >> 8) + du, size_u, desc.u_mode),
                clamp_flip((vi >> 8) + dv, size_v, desc.v_mode),
                level,
            )
        };

        let offset11 = fetch(0, 0);
        if !bilinear {
            return offset11;
        }

        let offset00 = fetch(1, 1);
        let offset01 = fetch(0, 1);
        let offset10 = fetch(1, 0);

        let ublend = to_u8_256((ui & 255) as u8);
        let vblend = to_u8_256((vi & 255) as u8);
        let nublend = 256 - ublend;
        let nvblend = 256 - vblend;

        let mix = |c00: u8, c01: u8, c10: u8, c11: u8| {
            ((c00 as u32 * ublend * vblend
                + c01 as u32 * nublend * vblend
                + c10 as u32 * ublend * nvblend
                + c11 as u32 * nublend * nvblend)
                / 65536) as u8
        };

        Color {
            b: mix(offset00.b, offset01.b, offset10.b, offset11.b),
            g: mix(offset00.g, offset01.g, offset10.g, offset11.g),
            r: mix(offset00.r, offset01.r, offset10.r, offset11.r),
            a: mix(offset00.a, offset01.a, offset10.a, offset11.a),
        }
    }

    /// Filtered sample at normalized `(u, v)`. `level_frac` only matters for
    /// trilinear filtering of mipmapped textures.
    pub fn sample(&self, desc: &TextureDescriptor, u: f32, v: f32, level: u32, level_frac: u8) -> Color {
        let level = level.min(desc.max_level());

        // The 1x1 level of a YUV texture can't hold a pair, it reads as 565
        if desc.format == PixelFormat::Yuv422 && desc.mipmapped && level == desc.max_level() {
            let fallback = TextureDescriptor { format: PixelFormat::Rgb565, ..*desc };
            return self.sample(&fallback, u, v, level, level_frac);
        }

        match desc.filter {
            FilterMode::Nearest => self.filtered(desc, u, v, level, false),
            FilterMode::Bilinear => self.filtered(desc, u, v, level, true),
            FilterMode::Trilinear => {
                let near = self.filtered(desc, u, v, level, true);
                if !desc.mipmapped || level >= desc.max_level() {
                    return near;
                }
                let far = self.filtered(desc, u, v, level + 1, true);
                let fb = to_u8_256(level_frac);
                let nb = 256 - fb;
                let mix = |a: u8, b: u8| ((a as u32 * nb + b as u32 * fb) >> 8) as u8;
                Color {
                    b: mix(near.b, far.b),
                    g: mix(near.g, far.g),
                    r: mix(near.r, far.r),
                    a: mix(near.a, far.a),
                }
            }
        }
    }
}

// Convert u8 to 256 scale (adds half bit for rounding)
#[inline(always)]
pub fn to_u8_256(v: u8) -> u32 {
    v as u32 + ((v as u32) >> 7)
}

// One monomorphised fetcher per format x address mode
seq!(N in 0..24 {
    paste! {
        fn [<fetch_texel_ N>](s: &Sampler, desc: &TextureDescriptor, x: u32, y: u32, level: u32) -> u32 {
            s.fetch::<N>(desc, x, y, level)
        }
    }
});

// index = format * 4 + address mode
static FETCHERS: [FetchFn; 24] = seq!(N in 0..24 {
    [
        #(
            paste! { [<fetch_texel_ N>] },
        )*
    ]
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pvr_regs::{HALF_OFFSET_ADDR, PAL_RAM_CTRL_ADDR, TEXT_CONTROL_ADDR};

    const TEX_BASE: u32 = 0x10_0000;

    // Raw texel values for the two checker cells, per format
    fn cells(format: PixelFormat) -> [u32; 2] {
        match format {
            PixelFormat::Argb1555 => [0xFC00, 0x03FF],
            PixelFormat::Rgb565 => [0xF800, 0x07FF],
            PixelFormat::Argb4444 => [0xF0F0, 0x8F0F],
            PixelFormat::Yuv422 => [0x20, 0xE0],
            PixelFormat::Pal4 | PixelFormat::Pal8 => [1, 2],
        }
    }

    fn expected(format: PixelFormat, raw: u32) -> Color {
        Color::from_raw(match format {
            PixelFormat::Argb1555 => argb1555_32(raw as u16),
            PixelFormat::Rgb565 => argb565_32(raw as u16),
            PixelFormat::Argb4444 => argb4444_32(raw as u16),
            PixelFormat::Yuv422 => yuv422(raw as i32, 128, 128),
            PixelFormat::Pal4 | PixelFormat::Pal8 => {
                if raw == 1 { 0xFF10_2030 } else { 0x80C0_B0A0 }
            }
        })
    }

    // Stores texel `value` at texel offset `offset` of a block starting at `base`
    fn put_texel(vram: &mut Vram, base: u32, format: PixelFormat, linear: bool, offset: u32, value: u32) {
        match format {
            PixelFormat::Argb1555 | PixelFormat::Rgb565 | PixelFormat::Argb4444 => {
                vram.write_linear(base + offset * 2, &(value as u16).to_le_bytes());
            }
            PixelFormat::Yuv422 => {
                let (word_addr, y_lane) = if linear {
                    ((offset >> 1) * 4, 1 + (offset & 1) * 2)
                } else {
                    ((offset >> 2) * 8 + (offset & 1) * 4, 1 + (offset & 2))
                };
                vram.write8_64(base + word_addr, 128);
                vram.write8_64(base + word_addr + 2, 128);
                vram.write8_64(base + word_addr + y_lane, value as u8);
            }
            PixelFormat::Pal8 => vram.write8_64(base + offset, value as u8),
            PixelFormat::Pal4 => {
                let addr = base + offset / 2;
                let shift = (offset & 1) * 4;
                let old = vram.read8_64(addr) & !(0xF << shift);
                vram.write8_64(addr, old | ((value as u8) << shift));
            }
        }
    }

    fn checker(x: u32, y: u32) -> usize {
        ((x ^ y) & 1) as usize
    }

    fn build(vram: &mut Vram, format: PixelFormat, layout: AddressMode) -> TextureDescriptor {
        let cells = cells(format);
        let mut tsp = TSP(0);
        tsp.set_tex_u(1); // 16 wide
        tsp.set_tex_v(0); // 8 tall

        let mut tcw = TCW(0);
        tcw.set_tex_addr(TEX_BASE >> 3);
        tcw.set_pixel_fmt(match format {
            PixelFormat::Argb1555 => 0,
            PixelFormat::Rgb565 => 1,
            PixelFormat::Argb4444 => 2,
            PixelFormat::Yuv422 => 3,
            PixelFormat::Pal4 => 5,
            PixelFormat::Pal8 => 6,
        });

        match layout {
            AddressMode::Linear | AddressMode::Strided => {
                tcw.set_scan_order(true);
                tcw.set_stride_sel(layout == AddressMode::Strided);
            }
            AddressMode::Twiddled => {}
            AddressMode::Vq => tcw.set_vq_comp(true),
        }

        // 32 texel pitch for strided layouts
        let mut desc = TextureDescriptor::from_words(tsp, tcw, 1);
        if desc.layout != layout {
            // Palette words can't select a scan order, reach those fetchers directly
            desc.layout = layout;
            desc.stride = if layout == AddressMode::Strided { 32 } else { desc.width };
        }
        let (w, h) = (desc.width, desc.height);

        match desc.layout {
            AddressMode::Linear | AddressMode::Strided => {
                for y in 0..h {
                    for x in 0..w {
                        put_texel(vram, TEX_BASE, format, true, x + y * desc.stride, cells[checker(x, y)]);
                    }
                }
            }
            AddressMode::Twiddled => {
                for t in 0..w * h {
                    put_texel(vram, TEX_BASE, format, false, t, cells[((t ^ (t >> 1)) & 1) as usize]);
                }
            }
            AddressMode::Vq => {
                // Codeword 0 holds one checkered block, every index byte selects it
                let per_code = 64 / format.bits();
                for t in 0..per_code {
                    put_texel(vram, TEX_BASE, format, false, t, cells[((t ^ (t >> 1)) & 1) as usize]);
                }
                for i in 0..(w * h / per_code) {
                    vram.write8_64(TEX_BASE + VQ_CODEBOOK_SIZE + i, 0);
                }
            }
        }

        desc
    }

    #[test]
    fn test_descriptor_from_words() {
        let mut tsp = TSP(0);
        tsp.set_tex_u(3);
        tsp.set_tex_v(2);
        tsp.set_clamp_u(true);
        tsp.set_flip_v(true);
        tsp.set_filter_mode(1);
        tsp.set_src_instr(4);
        tsp.set_dst_instr(5);

        let mut tcw = TCW(0);
        tcw.set_tex_addr(0x200);
        tcw.set_pixel_fmt(6);
        tcw.set_scan_order(true);
        tcw.set_pal_select(0x25);

        let desc = TextureDescriptor::from_words(tsp, tcw, 0);
        assert_eq!(desc.base, 0x1000);
        assert_eq!(desc.format, PixelFormat::Pal8);
        // palettes ignore scan order
        assert_eq!(desc.layout, AddressMode::Twiddled);
        assert_eq!((desc.width, desc.height), (64, 32));
        assert_eq!(desc.u_mode, UvMode::Clamp);
        assert_eq!(desc.v_mode, UvMode::Flip);
        assert_eq!(desc.filter, FilterMode::Bilinear);
        assert_eq!(desc.blend_mode, 0o45);
    }

    #[test]
    fn test_checkerboard_all_formats_and_layouts() {
        let mut regs = PvrRegs::new();
        regs.write(TEXT_CONTROL_ADDR, 1);
        regs.write(PAL_RAM_CTRL_ADDR, 3);
        for bank in 0..4 {
            regs.palette_ram_mut()[bank * 256 + 1] = 0xFF10_2030;
            regs.palette_ram_mut()[bank * 256 + 2] = 0x80C0_B0A0;
        }

        for format in PixelFormat::ALL {
            for layout in AddressMode::ALL {
                let mut vram = Vram::new();
                let desc = build(&mut vram, format, layout);
                let sampler = Sampler::new(&vram, &regs);

                for y in 0..desc.height {
                    for x in 0..desc.width {
                        let u = (x as f32 + 0.5) / desc.width as f32;
                        let v = (y as f32 + 0.5) / desc.height as f32;
                        let raw = cells(format)[checker(x, y)];
                        assert_eq!(
                            sampler.sample(&desc, u, v, 0, 0),
                            expected(format, raw),
                            "{format:?} {layout:?} at ({x}, {y})"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_uv_modes() {
        assert_eq!(clamp_flip(-3, 8, UvMode::Clamp), 0);
        assert_eq!(clamp_flip(9, 8, UvMode::Clamp), 7);
        assert_eq!(clamp_flip(9, 8, UvMode::Wrap), 1);
        assert_eq!(clamp_flip(-1, 8, UvMode::Wrap), 7);
        assert_eq!(clamp_flip(8, 8, UvMode::Flip), 7);
        assert_eq!(clamp_flip(15, 8, UvMode::Flip), 0);
        assert_eq!(clamp_flip(16, 8, UvMode::Flip), 0);
    }

    #[test]
    fn test_large_uv_without_half_offset() {
        let mut vram = Vram::new();
        let mut regs = PvrRegs::new();
        regs.write(HALF_OFFSET_ADDR, 0);
        let mut desc = build(&mut vram, PixelFormat::Rgb565, AddressMode::Linear);
        let sampler = Sampler::new(&vram, &regs);
        let [even, odd] = cells(PixelFormat::Rgb565);

        // u lands on a whole number of periods, v on row 4
        for (mode, raw) in [(UvMode::Wrap, even), (UvMode::Flip, even), (UvMode::Clamp, odd)] {
            desc.u_mode = mode;
            assert_eq!(sampler.sample(&desc, 1.0e6, 0.5, 0, 0), expected(PixelFormat::Rgb565, raw), "{mode:?}");
        }

        desc.u_mode = UvMode::Wrap;
        assert_eq!(sampler.sample(&desc, -1.0e6, 0.5, 0, 0), expected(PixelFormat::Rgb565, even));
        desc.u_mode = UvMode::Clamp;
        assert_eq!(sampler.sample(&desc, -1.0e6, 0.5, 0, 0), expected(PixelFormat::Rgb565, even));

        desc.filter = FilterMode::Bilinear;
        for mode in [UvMode::Wrap, UvMode::Flip, UvMode::Clamp] {
            desc.u_mode = mode;
            desc.v_mode = mode;
            let _ = sampler.sample(&desc, 3.0e7, -3.0e7, 0, 0);
            let _ = sampler.sample(&desc, f32::INFINITY, f32::NAN, 0, 0);
        }
    }

    #[test]
    fn test_bilinear_midpoint() {
        let mut vram = Vram::new();
        let regs = PvrRegs::new();
        let mut desc = build(&mut vram, PixelFormat::Argb4444, AddressMode::Linear);
        desc.filter = FilterMode::Bilinear;
        desc.u_mode = UvMode::Clamp;
        desc.v_mode = UvMode::Clamp;
        let sampler = Sampler::new(&vram, &regs);

        // Half a texel into texel 0 of row 0, weights 127:129
        let c = sampler.sample(&desc, 1.0 / 32.0, 0.0, 0, 0);
        let a = expected(PixelFormat::Argb4444, 0xF0F0);
        let b = expected(PixelFormat::Argb4444, 0x8F0F);
        let mix = |x: u8, y: u8| ((x as u32 * 127 + y as u32 * 129) / 256) as u8;
        assert_eq!(c, Color { b: mix(a.b, b.b), g: mix(a.g, b.g), r: mix(a.r, b.r), a: mix(a.a, b.a) });
    }

    #[test]
    fn test_mip_selection() {
        assert_eq!(select_mip(1.0, 5).0, 0);
        assert_eq!(select_mip(4.0, 5).0, 2);
        assert_eq!(select_mip(4096.0, 3).0, 3);
    }
}
