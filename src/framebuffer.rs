//! Frame buffer read-back in the display format selected by `FB_R_CTRL`.

use refsw::fb::{unpack_pixel, ReadDepth};
use refsw::{PvrRegs, Vram};

/// A decoded frame, ARGB8888 rows top to bottom
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
}

impl FrameImage {
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.pixels[(y * self.width + x) as usize]
    }
}

/// Reads the visible frame from VRAM. Interlaced frames weave the two fields
/// starting at `FB_R_SOF1` and `FB_R_SOF2`. Returns `None` while read-back is disabled.
pub fn read_back(vram: &Vram, regs: &PvrRegs) -> Option<FrameImage> {
    let ctrl = regs.fb_r_ctrl();
    if !ctrl.fb_enable() {
        return None;
    }

    let size = regs.fb_r_size();
    let depth = ReadDepth::from_bits(ctrl.fb_depth());
    let bpp = depth.bytes_per_pixel();
    let line_words = size.fb_x_size() + 1;
    let width = line_words * 4 / bpp;
    let lines = size.fb_y_size() + 1;
    // modulus counts from the last word of a line to the first of the next
    let stride = (line_words + size.fb_modulus().saturating_sub(1)) * 4;

    let fields = if regs.spg_control().interlace() {
        vec![regs.fb_r_sof1(), regs.fb_r_sof2()]
    } else {
        vec![regs.fb_r_sof1()]
    };
    let repeat = if ctrl.fb_line_double() { 2 } else { 1 };
    let nfields = fields.len() as u32;
    let height = lines * nfields * repeat;

    log::trace!(
        "fb: read-back {}x{} {:?}, sof {:X?}, stride {}",
        width,
        height,
        depth,
        fields,
        stride
    );

    let mut pixels = vec![0u32; (width * height) as usize];
    for (field, &sof) in fields.iter().enumerate() {
        for line in 0..lines {
            let row = sof.wrapping_add(line * stride);
            for r in 0..repeat {
                let y = ((line * nfields + field as u32) * repeat) + r;
                let out = &mut pixels[(y * width) as usize..((y + 1) * width) as usize];
                for (x, px) in out.iter_mut().enumerate() {
                    *px = unpack_pixel(vram, row + x as u32 * bpp, depth, ctrl.fb_concat()).to_raw();
                }
            }
        }
    }

    Some(FrameImage { width, height, pixels })
}
