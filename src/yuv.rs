//! YUV macroblock converter. Planar YUV420 or YUV422 macroblocks written to
//! the YUV FIFO come out as a linear YUV422 texture at `TA_YUV_TEX_BASE`.

use refsw::pvr_regs::{PvrRegs, TA_YUV_TEX_CNT_ADDR};

use crate::asic::{Interrupt, InterruptSink};

pub const MACROBLOCK_420: usize = 384;
pub const MACROBLOCK_422: usize = 512;

/// Output bytes of one 16x16 macroblock
const BLOCK_BYTES: u32 = 16 * 16 * 2;

#[derive(Clone, Debug, Default)]
pub struct YuvConverter {
    buffer: Vec<u8>,
    block_x: u32,
    block_y: u32,
}

impl YuvConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewinds to the first macroblock, on reset and on `TA_YUV_TEX_BASE` writes
    pub fn reset(&mut self, regs: &mut PvrRegs) {
        self.buffer.clear();
        self.block_x = 0;
        self.block_y = 0;
        regs.write(TA_YUV_TEX_CNT_ADDR, 0);
    }

    /// Accepts FIFO bytes. Each complete macroblock is converted and handed to
    /// `sink` as (VRAM linear address, bytes) row fragments.
    pub fn feed(
        &mut self,
        data: &[u8],
        regs: &mut PvrRegs,
        irq: &mut dyn InterruptSink,
        mut sink: impl FnMut(u32, &[u8]),
    ) {
        let ctrl = regs.ta_yuv_tex_ctrl();
        let block_len = if ctrl.yuv_form() { MACROBLOCK_422 } else { MACROBLOCK_420 };

        self.buffer.extend_from_slice(data);
        while self.buffer.len() >= block_len {
            let block: Vec<u8> = self.buffer.drain(..block_len).collect();
            let pixels = if ctrl.yuv_form() { convert_422(&block) } else { convert_420(&block) };
            self.store(&pixels, regs, &mut sink);

            let cnt = regs.ta_yuv_tex_cnt() + 1;
            regs.write(TA_YUV_TEX_CNT_ADDR, cnt);

            let (w, h) = (ctrl.yuv_u_size() + 1, ctrl.yuv_v_size() + 1);
            self.block_x += 1;
            if self.block_x == w {
                self.block_x = 0;
                self.block_y += 1;
            }
            if self.block_y == h {
                log::debug!("yuv: {}x{} macroblocks converted", w, h);
                self.block_y = 0;
                irq.raise(Interrupt::YuvDone);
            }
        }
    }

    // 16 rows of 32 bytes each
    fn store(&self, pixels: &[u8], regs: &PvrRegs, sink: &mut impl FnMut(u32, &[u8])) {
        let ctrl = regs.ta_yuv_tex_ctrl();
        let base = regs.ta_yuv_tex_base() & 0x00FF_FFF8;
        let w = ctrl.yuv_u_size() + 1;

        if ctrl.yuv_tex() {
            // one 16x16 texture per macroblock
            let index = self.block_y * w + self.block_x;
            sink(base + index * BLOCK_BYTES, pixels);
            return;
        }

        let pitch = w * 16 * 2;
        for (row, line) in pixels.chunks_exact(32).enumerate() {
            let addr = base + (self.block_y * 16 + row as u32) * pitch + self.block_x * 32;
            sink(addr, line);
        }
    }
}

fn luma(block: &[u8], y_base: usize, x: usize, y: usize) -> u8 {
    let quadrant = (y / 8) * 2 + x / 8;
    block[y_base + quadrant * 64 + (y % 8) * 8 + x % 8]
}

fn convert(block: &[u8], chroma_rows: usize, y_base: usize) -> Vec<u8> {
    let (u_plane, v_plane) = (&block[..chroma_rows * 8], &block[chroma_rows * 8..chroma_rows * 16]);
    let mut out = Vec::with_capacity(BLOCK_BYTES as usize);

    for y in 0..16 {
        let cy = y * chroma_rows / 16;
        for x in (0..16).step_by(2) {
            let c = cy * 8 + x / 2;
            out.extend_from_slice(&[
                u_plane[c],
                luma(block, y_base, x, y),
                v_plane[c],
                luma(block, y_base, x + 1, y),
            ]);
        }
    }
    out
}

/// U 8x8, V 8x8, then four 8x8 Y blocks
pub fn convert_420(block: &[u8]) -> Vec<u8> {
    convert(block, 8, 128)
}

/// U 8x16, V 8x16, then four 8x8 Y blocks
pub fn convert_422(block: &[u8]) -> Vec<u8> {
    convert(block, 16, 256)
}

#[cfg(test)]
mod tests {
    use super::*;
    use refsw::pvr_regs::{TA_YUV_TEX_BASE_ADDR, TA_YUV_TEX_CTRL_ADDR};
    use refsw::Vram;

    fn block_420(u: u8, v: u8, y: [u8; 4]) -> Vec<u8> {
        let mut b = vec![u; 64];
        b.extend(std::iter::repeat_n(v, 64));
        for q in y {
            b.extend(std::iter::repeat_n(q, 64));
        }
        b
    }

    #[test]
    fn test_420_layout() {
        let px = convert_420(&block_420(0x10, 0x20, [1, 2, 3, 4]));
        assert_eq!(px.len(), 512);
        assert_eq!(&px[..4], &[0x10, 1, 0x20, 1]);
        // row 0, last pair is in the top right quadrant
        assert_eq!(&px[28..32], &[0x10, 2, 0x20, 2]);
        // row 15, first pair is bottom left
        assert_eq!(&px[15 * 32..15 * 32 + 4], &[0x10, 3, 0x20, 3]);
    }

    #[test]
    fn test_422_chroma_rows() {
        let mut b = vec![0u8; 512];
        // U row 1 only
        b[8..16].fill(0x55);
        let px = convert_422(&b);
        assert_eq!(px[0], 0);
        assert_eq!(px[32], 0x55);
    }

    #[test]
    fn test_converts_into_texture_and_signals_done() {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut regs = PvrRegs::new();
        let mut vram = Vram::new();
        let mut irqs: Vec<Interrupt> = Vec::new();
        // 2x1 macroblocks, YUV420, single texture
        regs.write(TA_YUV_TEX_CTRL_ADDR, 1);
        regs.write(TA_YUV_TEX_BASE_ADDR, 0x10_0000);

        let mut yuv = YuvConverter::new();
        yuv.reset(&mut regs);

        let data = block_420(0x80, 0x80, [0x40; 4]);
        yuv.feed(&data[..200], &mut regs, &mut irqs, |a, d| vram.write_linear(a, d));
        assert_eq!(regs.ta_yuv_tex_cnt(), 0);
        yuv.feed(&data[200..], &mut regs, &mut irqs, |a, d| vram.write_linear(a, d));
        assert_eq!(regs.ta_yuv_tex_cnt(), 1);
        assert!(irqs.is_empty());

        let second = block_420(0x80, 0x80, [0xC0; 4]);
        yuv.feed(&second, &mut regs, &mut irqs, |a, d| vram.write_linear(a, d));
        assert_eq!(irqs, vec![Interrupt::YuvDone]);
        assert_eq!(regs.ta_yuv_tex_cnt(), 2);

        // row 1 of the 32 pixel wide texture: first block then second
        let pitch = 64;
        assert_eq!(vram.read8_64(0x10_0000 + pitch + 1), 0x40);
        assert_eq!(vram.read8_64(0x10_0000 + pitch + 33), 0xC0);
    }
}
