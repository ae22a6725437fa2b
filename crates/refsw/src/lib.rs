/*
    This file is part of libswirl
*/
// #include "license/bsd"

pub mod types;
pub mod pvr_mem;
pub mod pvr_regs;
pub mod tex_utils;
pub mod texture;
pub mod blend;
pub mod isp;
pub mod lists_types;
pub mod lists;
pub mod tile;
pub mod fb;

pub use pvr_mem::Vram;
pub use pvr_regs::PvrRegs;
pub use tile::{RenderCore, RenderState, RenderStats};
