/*
    This file is part of libswirl
*/
// #include "license/bsd"

//! PVR register block (0x8000 bytes) and typed views of the registers the
//! TA, the render core and the display side decode.

#![allow(non_camel_case_types)]

use bitfield::bitfield;

pub const PVR_REG_SIZE: u32 = 0x8000;
pub const PVR_REG_MASK: u32 = PVR_REG_SIZE - 1;

pub const PVR_ID: u32 = 0x17FD_11DB;
pub const PVR_REVISION: u32 = 0x11;

// Register addresses
pub const ID_ADDR: u32 = 0x00000000;
pub const REVISION_ADDR: u32 = 0x00000004;
pub const SOFTRESET_ADDR: u32 = 0x00000008;

pub const STARTRENDER_ADDR: u32 = 0x00000014;
pub const TEST_SELECT_ADDR: u32 = 0x00000018;

pub const PARAM_BASE_ADDR: u32 = 0x00000020;

pub const REGION_BASE_ADDR: u32 = 0x0000002C;
pub const SPAN_SORT_CFG_ADDR: u32 = 0x00000030;

pub const VO_BORDER_COL_ADDR: u32 = 0x00000040;
pub const FB_R_CTRL_ADDR: u32 = 0x00000044;
pub const FB_W_CTRL_ADDR: u32 = 0x00000048;
pub const FB_W_LINESTRIDE_ADDR: u32 = 0x0000004C;
pub const FB_R_SOF1_ADDR: u32 = 0x00000050;
pub const FB_R_SOF2_ADDR: u32 = 0x00000054;

pub const FB_R_SIZE_ADDR: u32 = 0x0000005C;
pub const FB_W_SOF1_ADDR: u32 = 0x00000060;
pub const FB_W_SOF2_ADDR: u32 = 0x00000064;
pub const FB_X_CLIP_ADDR: u32 = 0x00000068;
pub const FB_Y_CLIP_ADDR: u32 = 0x0000006C;

pub const FPU_SHAD_SCALE_ADDR: u32 = 0x00000074;
pub const FPU_CULL_VAL_ADDR: u32 = 0x00000078;
pub const FPU_PARAM_CFG_ADDR: u32 = 0x0000007C;
pub const HALF_OFFSET_ADDR: u32 = 0x00000080;
pub const FPU_PERP_VAL_ADDR: u32 = 0x00000084;
pub const ISP_BACKGND_D_ADDR: u32 = 0x00000088;
pub const ISP_BACKGND_T_ADDR: u32 = 0x0000008C;

pub const ISP_FEED_CFG_ADDR: u32 = 0x00000098;

pub const FOG_COL_RAM_ADDR: u32 = 0x000000B0;
pub const FOG_COL_VERT_ADDR: u32 = 0x000000B4;
pub const FOG_DENSITY_ADDR: u32 = 0x000000B8;
pub const FOG_CLAMP_MAX_ADDR: u32 = 0x000000BC;
pub const FOG_CLAMP_MIN_ADDR: u32 = 0x000000C0;
pub const SPG_TRIGGER_POS_ADDR: u32 = 0x000000C4;
pub const SPG_HBLANK_INT_ADDR: u32 = 0x000000C8;
pub const SPG_VBLANK_INT_ADDR: u32 = 0x000000CC;
pub const SPG_CONTROL_ADDR: u32 = 0x000000D0;
pub const SPG_HBLANK_ADDR: u32 = 0x000000D4;
pub const SPG_LOAD_ADDR: u32 = 0x000000D8;
pub const SPG_VBLANK_ADDR: u32 = 0x000000DC;
pub const SPG_WIDTH_ADDR: u32 = 0x000000E0;
pub const TEXT_CONTROL_ADDR: u32 = 0x000000E4;
pub const VO_CONTROL_ADDR: u32 = 0x000000E8;
pub const VO_STARTX_ADDR: u32 = 0x000000EC;
pub const VO_STARTY_ADDR: u32 = 0x000000F0;
pub const SCALER_CTL_ADDR: u32 = 0x000000F4;
pub const PAL_RAM_CTRL_ADDR: u32 = 0x00000108;
pub const SPG_STATUS_ADDR: u32 = 0x0000010C;
pub const FB_BURSTCTRL_ADDR: u32 = 0x00000110;
pub const FB_C_SOF_ADDR: u32 = 0x00000114;
pub const Y_COEFF_ADDR: u32 = 0x00000118;

pub const PT_ALPHA_REF_ADDR: u32 = 0x0000011C;

// TA REGS
pub const TA_OL_BASE_ADDR: u32 = 0x00000124;
pub const TA_ISP_BASE_ADDR: u32 = 0x00000128;
pub const TA_OL_LIMIT_ADDR: u32 = 0x0000012C;
pub const TA_ISP_LIMIT_ADDR: u32 = 0x00000130;
pub const TA_NEXT_OPB_ADDR: u32 = 0x00000134;
pub const TA_ISP_CURRENT_ADDR: u32 = 0x00000138;
pub const TA_GLOB_TILE_CLIP_ADDR: u32 = 0x0000013C;
pub const TA_ALLOC_CTRL_ADDR: u32 = 0x00000140;
pub const TA_LIST_INIT_ADDR: u32 = 0x00000144;
pub const TA_YUV_TEX_BASE_ADDR: u32 = 0x00000148;
pub const TA_YUV_TEX_CTRL_ADDR: u32 = 0x0000014C;
pub const TA_YUV_TEX_CNT_ADDR: u32 = 0x00000150;

pub const TA_LIST_CONT_ADDR: u32 = 0x00000160;
pub const TA_NEXT_OPB_INIT_ADDR: u32 = 0x00000164;

pub const FOG_TABLE_START_ADDR: u32 = 0x00000200;
pub const FOG_TABLE_END_ADDR: u32 = 0x000003FC;

pub const TA_OL_POINTERS_START_ADDR: u32 = 0x00000600;
pub const TA_OL_POINTERS_END_ADDR: u32 = 0x00000F5C;

pub const PALETTE_RAM_START_ADDR: u32 = 0x00001000;
pub const PALETTE_RAM_END_ADDR: u32 = 0x00001FFC;

pub const FOG_TABLE_ENTRIES: usize = 128;
pub const PALETTE_ENTRIES: usize = 1024;

/// Host writes to these are dropped.
pub const READ_ONLY_REGS: [u32; 4] = [ID_ADDR, REVISION_ADDR, SPG_STATUS_ADDR, TA_YUV_TEX_CNT_ADDR];

macro_rules! reg_full {
    ($($t:ident),* $(,)?) => {
        $(
            impl $t {
                #[inline]
                pub const fn full(&self) -> u32 { self.0 }
                #[inline]
                pub fn set_full(&mut self, val: u32) { self.0 = val; }
            }

            impl From<u32> for $t {
                #[inline]
                fn from(val: u32) -> Self { $t(val) }
            }
        )*
    };
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct SOFTRESET_type(u32);
    impl Debug;

    pub ta_reset, set_ta_reset: 0;
    pub pipeline_reset, set_pipeline_reset: 1;
    pub sdram_reset, set_sdram_reset: 2;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct FB_R_CTRL_type(u32);
    impl Debug;

    pub fb_enable, set_fb_enable: 0;
    pub fb_line_double, set_fb_line_double: 1;
    pub fb_depth, set_fb_depth: 3, 2;
    pub fb_concat, set_fb_concat: 6, 4;
    pub u8, fb_chroma_threshold, set_fb_chroma_threshold: 15, 8;
    pub fb_stripsize, set_fb_stripsize: 21, 16;
    pub fb_strip_buf_en, set_fb_strip_buf_en: 22;
    pub vclk_div, set_vclk_div: 23;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct FB_R_SIZE_type(u32);
    impl Debug;

    pub fb_x_size, set_fb_x_size: 9, 0;
    pub fb_y_size, set_fb_y_size: 19, 10;
    pub fb_modulus, set_fb_modulus: 29, 20;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct FB_W_CTRL_type(u32);
    impl Debug;

    pub fb_packmode, set_fb_packmode: 2, 0;
    pub fb_dither, set_fb_dither: 3;
    pub u8, fb_kval, set_fb_kval: 15, 8;
    pub u8, fb_alpha_threshold, set_fb_alpha_threshold: 23, 16;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct FB_W_LINESTRIDE_type(u32);
    impl Debug;

    pub stride, set_stride: 8, 0;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct FB_X_CLIP_type(u32);
    impl Debug;

    pub min, set_min: 10, 0;
    pub max, set_max: 26, 16;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct FB_Y_CLIP_type(u32);
    impl Debug;

    pub min, set_min: 9, 0;
    pub max, set_max: 25, 16;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct SPG_STATUS_type(u32);
    impl Debug;

    pub scanline, set_scanline: 9, 0;
    pub fieldnum, set_fieldnum: 10;
    pub blank, set_blank: 11;
    pub hsync, set_hsync: 12;
    pub vsync, set_vsync: 13;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct SPG_HBLANK_INT_type(u32);
    impl Debug;

    pub line_comp_val, set_line_comp_val: 9, 0;
    pub hblank_int_mode, set_hblank_int_mode: 13, 12;
    pub hblank_in_interrupt, set_hblank_in_interrupt: 25, 16;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct SPG_VBLANK_INT_type(u32);
    impl Debug;

    pub vblank_in_interrupt_line_number, set_vblank_in_interrupt_line_number: 9, 0;
    pub vblank_out_interrupt_line_number, set_vblank_out_interrupt_line_number: 25, 16;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct SPG_CONTROL_type(u32);
    impl Debug;

    pub mhsync_pol, set_mhsync_pol: 0;
    pub mvsync_pol, set_mvsync_pol: 1;
    pub mcsync_pol, set_mcsync_pol: 2;
    pub spg_lock, set_spg_lock: 3;
    pub interlace, set_interlace: 4;
    pub force_field2, set_force_field2: 5;
    pub ntsc, set_ntsc: 6;
    pub pal, set_pal: 7;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct SPG_LOAD_type(u32);
    impl Debug;

    pub hcount, set_hcount: 9, 0;
    pub vcount, set_vcount: 25, 16;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct SPG_VBLANK_type(u32);
    impl Debug;

    pub vstart, set_vstart: 9, 0;
    pub vbend, set_vbend: 25, 16;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct SCALER_CTL_type(u32);
    impl Debug;

    pub vscalefactor, set_vscalefactor: 15, 0;
    pub hscale, set_hscale: 16;
    pub interlace, set_interlace: 17;
    pub fieldselect, set_fieldselect: 18;
}

bitfield! {
    /// Parameter tag: where a primitive's ISP parameter block lives.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct ISP_BACKGND_T_type(u32);
    impl Debug;

    pub tag_offset, set_tag_offset: 2, 0;
    pub param_offs_in_words, set_param_offs_in_words: 23, 3;
    pub skip, set_skip: 26, 24;
    pub shadow, set_shadow: 27;
    pub cache_bypass, set_cache_bypass: 28;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct ISP_FEED_CFG_type(u32);
    impl Debug;

    pub pre_sort, set_pre_sort: 0;
    pub discard_mode, set_discard_mode: 3;
    pub pt_chunk_size, set_pt_chunk_size: 13, 4;
    pub tr_cache_size, set_tr_cache_size: 23, 14;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct FPU_SHAD_SCALE_type(u32);
    impl Debug;

    pub u8, scale_factor, set_scale_factor: 7, 0;
    pub intensity_shadow, set_intensity_shadow: 8;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct FPU_PARAM_CFG_type(u32);
    impl Debug;

    pub pointer_first_burst, set_pointer_first_burst: 3, 0;
    pub pointer_burst, set_pointer_burst: 7, 4;
    pub isp_param_burst_threshold, set_isp_param_burst_threshold: 13, 8;
    pub tsp_param_burst_threshold, set_tsp_param_burst_threshold: 19, 14;
    pub region_header_type, set_region_header_type: 21;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct HALF_OFFSET_type(u32);
    impl Debug;

    pub fpu_pixel_half_offset, set_fpu_pixel_half_offset: 0;
    pub tsp_pixel_half_offset, set_tsp_pixel_half_offset: 1;
    pub texure_pixel_half_offset, set_texure_pixel_half_offset: 2;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct TA_GLOB_TILE_CLIP_type(u32);
    impl Debug;

    pub tile_x_num, set_tile_x_num: 5, 0;
    pub tile_y_num, set_tile_y_num: 19, 16;
}

bitfield! {
    /// Per-list OPB sizes (0, 8, 16 or 32 words) and growth direction.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct TA_ALLOC_CTRL_type(u32);
    impl Debug;

    pub o_opb, set_o_opb: 1, 0;
    pub om_opb, set_om_opb: 5, 4;
    pub t_opb, set_t_opb: 9, 8;
    pub tm_opb, set_tm_opb: 13, 12;
    pub pt_opb, set_pt_opb: 17, 16;
    pub opb_grow_down, set_opb_grow_down: 20;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct TA_YUV_TEX_CTRL_type(u32);
    impl Debug;

    pub yuv_u_size, set_yuv_u_size: 5, 0;
    pub yuv_v_size, set_yuv_v_size: 13, 8;
    pub yuv_tex, set_yuv_tex: 16;
    pub yuv_form, set_yuv_form: 24;
}

reg_full!(
    SOFTRESET_type,
    FB_R_CTRL_type,
    FB_R_SIZE_type,
    FB_W_CTRL_type,
    FB_W_LINESTRIDE_type,
    FB_X_CLIP_type,
    FB_Y_CLIP_type,
    SPG_STATUS_type,
    SPG_HBLANK_INT_type,
    SPG_VBLANK_INT_type,
    SPG_CONTROL_type,
    SPG_LOAD_type,
    SPG_VBLANK_type,
    SCALER_CTL_type,
    ISP_BACKGND_T_type,
    ISP_FEED_CFG_type,
    FPU_SHAD_SCALE_type,
    FPU_PARAM_CFG_type,
    HALF_OFFSET_type,
    TA_GLOB_TILE_CLIP_type,
    TA_ALLOC_CTRL_type,
    TA_YUV_TEX_CTRL_type,
);

impl TA_ALLOC_CTRL_type {
    /// OPB size selector (0..3) for one of the five lists.
    #[inline]
    pub fn opb_size_sel(&self, list: usize) -> u32 {
        (self.0 >> (4 * list as u32)) & 3
    }
}

impl TA_GLOB_TILE_CLIP_type {
    #[inline]
    pub fn width_tiles(&self) -> u32 {
        self.tile_x_num() + 1
    }

    #[inline]
    pub fn height_tiles(&self) -> u32 {
        self.tile_y_num() + 1
    }
}

/// The register file as a plain word array with typed accessors.
#[derive(Clone)]
pub struct PvrRegs {
    regs: Box<[u32]>,
}

impl Default for PvrRegs {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PvrRegs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PvrRegs")
            .field("param_base", &self.param_base())
            .field("region_base", &self.region_base())
            .field("fb_w_ctrl", &self.fb_w_ctrl())
            .finish_non_exhaustive()
    }
}

macro_rules! typed_reg {
    ($name:ident, $addr:expr, $t:ident) => {
        #[inline]
        pub fn $name(&self) -> $t {
            $t(self.read($addr))
        }
    };
}

macro_rules! word_reg {
    ($name:ident, $addr:expr) => {
        #[inline]
        pub fn $name(&self) -> u32 {
            self.read($addr)
        }
    };
}

macro_rules! float_reg {
    ($name:ident, $addr:expr) => {
        #[inline]
        pub fn $name(&self) -> f32 {
            f32::from_bits(self.read($addr))
        }
    };
}

impl PvrRegs {
    pub fn new() -> Self {
        let mut rv = Self {
            regs: vec![0u32; (PVR_REG_SIZE / 4) as usize].into_boxed_slice(),
        };
        rv.reset();
        rv
    }

    /// Power-on values. Palette and fog table are cleared too.
    pub fn reset(&mut self) {
        self.regs.fill(0);
        self.write(ID_ADDR, PVR_ID);
        self.write(REVISION_ADDR, PVR_REVISION);
        self.write(SPG_HBLANK_INT_ADDR, 0x031D_0000);
        self.write(SPG_VBLANK_INT_ADDR, 0x0150_0104);
        self.write(SPG_HBLANK_ADDR, 0x007E_0345);
        self.write(SPG_LOAD_ADDR, 0x0106_0359);
        self.write(SPG_VBLANK_ADDR, 0x0150_0104);
        self.write(SPG_WIDTH_ADDR, 0x07F1_933F);
        self.write(FPU_PARAM_CFG_ADDR, 0x0007_DF77);
        self.write(HALF_OFFSET_ADDR, 0x0000_0007);
        self.write(ISP_FEED_CFG_ADDR, 0x0040_2000);
        self.write(FB_X_CLIP_ADDR, 0x07FF_0000);
        self.write(FB_Y_CLIP_ADDR, 0x03FF_0000);
    }

    #[inline]
    pub fn read(&self, addr: u32) -> u32 {
        self.regs[((addr & PVR_REG_MASK) / 4) as usize]
    }

    #[inline]
    pub fn write(&mut self, addr: u32, value: u32) {
        self.regs[((addr & PVR_REG_MASK) / 4) as usize] = value;
    }

    #[inline]
    pub fn write_f32(&mut self, addr: u32, value: f32) {
        self.write(addr, value.to_bits());
    }

    word_reg!(id, ID_ADDR);
    word_reg!(param_base, PARAM_BASE_ADDR);
    word_reg!(region_base, REGION_BASE_ADDR);
    word_reg!(fb_r_sof1, FB_R_SOF1_ADDR);
    word_reg!(fb_r_sof2, FB_R_SOF2_ADDR);
    word_reg!(fb_w_sof1, FB_W_SOF1_ADDR);
    word_reg!(fb_w_sof2, FB_W_SOF2_ADDR);
    word_reg!(fog_density, FOG_DENSITY_ADDR);
    word_reg!(fog_clamp_max, FOG_CLAMP_MAX_ADDR);
    word_reg!(fog_clamp_min, FOG_CLAMP_MIN_ADDR);
    word_reg!(fog_col_ram, FOG_COL_RAM_ADDR);
    word_reg!(fog_col_vert, FOG_COL_VERT_ADDR);
    word_reg!(text_control, TEXT_CONTROL_ADDR);
    word_reg!(ta_ol_base, TA_OL_BASE_ADDR);
    word_reg!(ta_isp_base, TA_ISP_BASE_ADDR);
    word_reg!(ta_ol_limit, TA_OL_LIMIT_ADDR);
    word_reg!(ta_isp_limit, TA_ISP_LIMIT_ADDR);
    word_reg!(ta_next_opb, TA_NEXT_OPB_ADDR);
    word_reg!(ta_isp_current, TA_ISP_CURRENT_ADDR);
    word_reg!(ta_next_opb_init, TA_NEXT_OPB_INIT_ADDR);
    word_reg!(ta_yuv_tex_base, TA_YUV_TEX_BASE_ADDR);
    word_reg!(ta_yuv_tex_cnt, TA_YUV_TEX_CNT_ADDR);

    float_reg!(fpu_cull_val, FPU_CULL_VAL_ADDR);
    float_reg!(fpu_perp_val, FPU_PERP_VAL_ADDR);
    float_reg!(isp_backgnd_d, ISP_BACKGND_D_ADDR);

    typed_reg!(fb_r_ctrl, FB_R_CTRL_ADDR, FB_R_CTRL_type);
    typed_reg!(fb_r_size, FB_R_SIZE_ADDR, FB_R_SIZE_type);
    typed_reg!(fb_w_ctrl, FB_W_CTRL_ADDR, FB_W_CTRL_type);
    typed_reg!(fb_w_linestride, FB_W_LINESTRIDE_ADDR, FB_W_LINESTRIDE_type);
    typed_reg!(fb_x_clip, FB_X_CLIP_ADDR, FB_X_CLIP_type);
    typed_reg!(fb_y_clip, FB_Y_CLIP_ADDR, FB_Y_CLIP_type);
    typed_reg!(scaler_ctl, SCALER_CTL_ADDR, SCALER_CTL_type);
    typed_reg!(isp_backgnd_t, ISP_BACKGND_T_ADDR, ISP_BACKGND_T_type);
    typed_reg!(isp_feed_cfg, ISP_FEED_CFG_ADDR, ISP_FEED_CFG_type);
    typed_reg!(fpu_shad_scale, FPU_SHAD_SCALE_ADDR, FPU_SHAD_SCALE_type);
    typed_reg!(fpu_param_cfg, FPU_PARAM_CFG_ADDR, FPU_PARAM_CFG_type);
    typed_reg!(half_offset, HALF_OFFSET_ADDR, HALF_OFFSET_type);
    typed_reg!(spg_hblank_int, SPG_HBLANK_INT_ADDR, SPG_HBLANK_INT_type);
    typed_reg!(spg_vblank_int, SPG_VBLANK_INT_ADDR, SPG_VBLANK_INT_type);
    typed_reg!(spg_control, SPG_CONTROL_ADDR, SPG_CONTROL_type);
    typed_reg!(spg_load, SPG_LOAD_ADDR, SPG_LOAD_type);
    typed_reg!(spg_vblank, SPG_VBLANK_ADDR, SPG_VBLANK_type);
    typed_reg!(ta_glob_tile_clip, TA_GLOB_TILE_CLIP_ADDR, TA_GLOB_TILE_CLIP_type);
    typed_reg!(ta_alloc_ctrl, TA_ALLOC_CTRL_ADDR, TA_ALLOC_CTRL_type);
    typed_reg!(ta_yuv_tex_ctrl, TA_YUV_TEX_CTRL_ADDR, TA_YUV_TEX_CTRL_type);

    #[inline]
    pub fn pt_alpha_ref(&self) -> u8 {
        (self.read(PT_ALPHA_REF_ADDR) & 0xFF) as u8
    }

    #[inline]
    pub fn pal_ram_ctrl(&self) -> u32 {
        self.read(PAL_RAM_CTRL_ADDR) & 3
    }

    pub fn fog_table(&self) -> &[u32] {
        let start = (FOG_TABLE_START_ADDR / 4) as usize;
        &self.regs[start..start + FOG_TABLE_ENTRIES]
    }

    pub fn palette_ram(&self) -> &[u32] {
        let start = (PALETTE_RAM_START_ADDR / 4) as usize;
        &self.regs[start..start + PALETTE_ENTRIES]
    }

    pub fn palette_ram_mut(&mut self) -> &mut [u32] {
        let start = (PALETTE_RAM_START_ADDR / 4) as usize;
        &mut self.regs[start..start + PALETTE_ENTRIES]
    }
}
